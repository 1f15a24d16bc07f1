// THEORY:
// The telemetry layer is how the robot's control loop hears about targets.
// It is a hierarchical key/value namespace: `/`-separated paths whose leaves hold
// numbers, strings or string arrays. The processing loop only ever sees it through
// the `TelemetryPublisher` trait, which is write-only and fire-and-forget.
//
// Key architectural principles:
// 1.  **Single Writer Per Key**: The core is the sole producer of the target keys.
//     Readers (the HTTP endpoint, the robot) only observe.
// 2.  **Last Write Wins**: Publishing the same key twice in one cycle simply keeps
//     the later value. Nothing waits for acknowledgement.
// 3.  **Values Persist**: An entry keeps its last value until it is overwritten.
//     There is no expiry and no liveness signal.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Output-only numeric channel the processing loop writes target positions to.
pub trait TelemetryPublisher {
    fn publish(&mut self, name: &str, value: f64);
}

impl<P: TelemetryPublisher + ?Sized> TelemetryPublisher for &mut P {
    fn publish(&mut self, name: &str, value: f64) {
        (**self).publish(name, value);
    }
}

impl<P: TelemetryPublisher + ?Sized> TelemetryPublisher for Box<P> {
    fn publish(&mut self, name: &str, value: f64) {
        (**self).publish(name, value);
    }
}

/// A leaf value in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValue {
    Number(f64),
    String(String),
    StringArray(Vec<String>),
}

/// A single write, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub key: String,
    pub value: TableValue,
}

/// Normalizes a table path to `/a/b` form. The root is the empty string.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.push_str(segment);
            acc
        })
}

fn join(prefix: &str, key: &str) -> String {
    normalize_path(&format!("{prefix}/{key}"))
}

/// The in-process table store. Clones share the same entries.
#[derive(Clone)]
pub struct NetworkTable {
    entries: Arc<RwLock<BTreeMap<String, TableValue>>>,
    updates: broadcast::Sender<EntryUpdate>,
}

impl Default for NetworkTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NetworkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkTable")
            .field("entries", &self.snapshot().len())
            .finish()
    }
}

impl NetworkTable {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            updates,
        }
    }

    pub fn sub_table(&self, path: &str) -> SubTable {
        SubTable {
            table: self.clone(),
            path: normalize_path(path),
        }
    }

    pub fn put(&self, key: &str, value: TableValue) {
        let key = normalize_path(key);
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.insert(key.clone(), value.clone());
        }
        // No subscribers is the normal case.
        let _ = self.updates.send(EntryUpdate { key, value });
    }

    pub fn put_number(&self, key: &str, value: f64) {
        self.put(key, TableValue::Number(value));
    }

    pub fn put_string(&self, key: &str, value: impl Into<String>) {
        self.put(key, TableValue::String(value.into()));
    }

    pub fn put_string_array(&self, key: &str, values: Vec<String>) {
        self.put(key, TableValue::StringArray(values));
    }

    pub fn get(&self, key: &str) -> Option<TableValue> {
        let key = normalize_path(key);
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            TableValue::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            TableValue::StringArray(values) => Some(values),
            _ => None,
        }
    }

    /// Names of the direct child tables of `path`.
    pub fn sub_tables(&self, path: &str) -> Vec<String> {
        let prefix = normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let names: BTreeSet<String> = entries
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?.strip_prefix('/')?;
                let (child, _) = rest.split_once('/')?;
                Some(child.to_string())
            })
            .collect();
        names.into_iter().collect()
    }

    /// Names of the direct entries of `path`.
    pub fn keys(&self, path: &str) -> Vec<String> {
        let prefix = normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?.strip_prefix('/')?;
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    pub fn contains_sub_table(&self, path: &str) -> bool {
        let prefix = format!("{}/", normalize_path(path));
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    /// Every entry under `path`, keyed by full path.
    pub fn entries_under(&self, path: &str) -> BTreeMap<String, TableValue> {
        let prefix = normalize_path(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|(key, _)| {
                prefix.is_empty()
                    || key.as_str() == prefix
                    || key
                        .strip_prefix(&prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, TableValue> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntryUpdate> {
        self.updates.subscribe()
    }
}

/// A view of one table path. Writes land in the shared `NetworkTable`.
#[derive(Clone, Debug)]
pub struct SubTable {
    table: NetworkTable,
    path: String,
}

impl SubTable {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sub_table(&self, name: &str) -> SubTable {
        self.table.sub_table(&join(&self.path, name))
    }

    pub fn put_number(&self, key: &str, value: f64) {
        self.table.put_number(&join(&self.path, key), value);
    }

    pub fn put_string_array(&self, key: &str, values: Vec<String>) {
        self.table.put_string_array(&join(&self.path, key), values);
    }

    pub fn get(&self, key: &str) -> Option<TableValue> {
        self.table.get(&join(&self.path, key))
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.table.get_number(&join(&self.path, key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.table.keys(&self.path)
    }
}

impl TelemetryPublisher for SubTable {
    fn publish(&mut self, name: &str, value: f64) {
        self.put_number(name, value);
    }
}
