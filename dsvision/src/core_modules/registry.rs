// THEORY:
// Camera discovery runs once, before the processing loop starts. The robot
// advertises its cameras in the telemetry table under
// `CameraPublisher/<camera name>/streams`, but it may power on long after the
// coprocessor does. Discovery therefore has two parts:
//
// 1.  **Waiting**: `retry_fixed_interval` polls until anything is registered.
//     The attempt cap is an explicit `RetryPolicy` field; the default policy is
//     unbounded and uses a fixed interval with no backoff growth.
// 2.  **Resolving**: The `CameraRegistry` capability looks the camera up by name.
//     Only `mjpg`-prefixed stream entries are usable; their scheme token is
//     stripped. Anything short of a usable URL list falls back to a fixed URL.
//
// The registry is injected, never reached through a global, so discovery can be
// driven against a scripted registry in tests.

use crate::core_modules::telemetry::NetworkTable;
use std::time::Duration;

/// Root table cameras publish themselves under.
pub const CAMERA_PUBLISHER_TABLE: &str = "CameraPublisher";
/// Per-camera string array of stream URLs.
pub const STREAMS_KEY: &str = "streams";
const MJPG_PREFIX: &str = "mjpg";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("camera '{0}' is not registered")]
    NotFound(String),
    #[error("camera '{0}' has no mjpg streams")]
    NoStreams(String),
}

/// Lookup capability over the registered camera sources.
pub trait CameraRegistry {
    /// Whether any camera has registered yet.
    fn has_sources(&self) -> bool;

    /// Usable stream URLs for `name`.
    fn resolve_source(&self, name: &str) -> Result<Vec<String>, RegistryError>;
}

impl<R: CameraRegistry + ?Sized> CameraRegistry for &R {
    fn has_sources(&self) -> bool {
        (**self).has_sources()
    }

    fn resolve_source(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        (**self).resolve_source(name)
    }
}

/// Keeps `mjpg` entries with their scheme token stripped, dropping all others.
///
/// `mjpg:http://host/video` becomes `http://host/video`.
pub fn rewrite_stream_urls<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|entry| entry.starts_with(MJPG_PREFIX))
        .filter_map(|entry| entry.split_once(':').map(|(_, url)| url.to_string()))
        .collect()
}

impl CameraRegistry for NetworkTable {
    fn has_sources(&self) -> bool {
        !self.sub_tables(CAMERA_PUBLISHER_TABLE).is_empty()
    }

    fn resolve_source(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let camera = format!("{CAMERA_PUBLISHER_TABLE}/{name}");
        if !self.contains_sub_table(&camera) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let entries = self
            .get_string_array(&format!("{camera}/{STREAMS_KEY}"))
            .ok_or_else(|| RegistryError::NoStreams(name.to_string()))?;
        let urls = rewrite_stream_urls(entries.iter().map(String::as_str));
        if urls.is_empty() {
            return Err(RegistryError::NoStreams(name.to_string()));
        }
        Ok(urls)
    }
}

/// Fixed-interval retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_millis(500))
    }
}

impl RetryPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: usize) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Calls `attempt` with the 1-based attempt number until it yields a value,
/// sleeping `policy.interval` between calls. Never fails under an unbounded policy.
pub fn retry_fixed_interval<T>(
    policy: RetryPolicy,
    mut attempt: impl FnMut(usize) -> Option<T>,
) -> Result<T, RetryError> {
    let mut attempts = 0;
    loop {
        if let Some(limit) = policy.max_attempts {
            if attempts >= limit {
                return Err(RetryError::Exhausted { attempts });
            }
        }
        attempts += 1;
        if let Some(value) = attempt(attempts) {
            return Ok(value);
        }
        let more_to_come = policy.max_attempts.is_none_or(|limit| attempts < limit);
        if more_to_come {
            std::thread::sleep(policy.interval);
        }
    }
}

/// Blocks until the registry reports at least one camera.
pub fn wait_for_registrations(
    registry: &impl CameraRegistry,
    policy: RetryPolicy,
) -> Result<usize, RetryError> {
    retry_fixed_interval(policy, |attempt| {
        if registry.has_sources() {
            Some(attempt)
        } else {
            tracing::debug!(attempt, "no cameras registered yet");
            None
        }
    })
}

/// Where the frame source should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEndpoint {
    /// URLs advertised by the camera itself.
    Registered(Vec<String>),
    /// The configured fixed camera URL.
    Fallback(String),
}

impl CameraEndpoint {
    pub fn urls(&self) -> Vec<String> {
        match self {
            CameraEndpoint::Registered(urls) => urls.clone(),
            CameraEndpoint::Fallback(url) => vec![url.clone()],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CameraEndpoint::Fallback(_))
    }
}

/// Waits for registrations, then resolves `name`, falling back to `fallback_url`.
pub fn discover_camera(
    registry: &impl CameraRegistry,
    name: &str,
    fallback_url: &str,
    policy: RetryPolicy,
) -> Result<CameraEndpoint, RetryError> {
    let attempts = wait_for_registrations(registry, policy)?;
    tracing::info!(attempts, "camera registry is populated");

    match registry.resolve_source(name) {
        Ok(urls) => {
            tracing::info!(camera = name, ?urls, "using registered camera streams");
            Ok(CameraEndpoint::Registered(urls))
        }
        Err(err) => {
            tracing::warn!(%err, fallback = fallback_url, "falling back to fixed camera url");
            Ok(CameraEndpoint::Fallback(fallback_url.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn registered(name: &str, streams: &[&str]) -> NetworkTable {
        let table = NetworkTable::new();
        table.put_string_array(
            &format!("{CAMERA_PUBLISHER_TABLE}/{name}/{STREAMS_KEY}"),
            streams.iter().map(|s| s.to_string()).collect(),
        );
        table
    }

    #[test]
    fn mjpg_entries_are_rewritten_and_others_dropped() {
        let urls = rewrite_stream_urls([
            "mjpg:http://10.59.57.2:1181/?action=stream",
            "usb:/dev/video0",
            "mjpg:http://roborio-5957-frc.local:1181/?action=stream",
        ]);
        assert_eq!(
            urls,
            vec![
                "http://10.59.57.2:1181/?action=stream",
                "http://roborio-5957-frc.local:1181/?action=stream",
            ]
        );
    }

    #[test]
    fn resolves_registered_camera() {
        let table = registered("Axis 5957", &["mjpg:http://axis/video"]);
        assert!(table.has_sources());
        assert_eq!(
            table.resolve_source("Axis 5957"),
            Ok(vec!["http://axis/video".to_string()])
        );
    }

    #[test]
    fn unknown_camera_is_not_found() {
        let table = registered("USB Camera 0", &["mjpg:http://usb/video"]);
        assert_eq!(
            table.resolve_source("Axis 5957"),
            Err(RegistryError::NotFound("Axis 5957".into()))
        );
    }

    #[test]
    fn camera_without_mjpg_streams_has_no_streams() {
        let table = registered("Axis 5957", &["usb:/dev/video0"]);
        assert_eq!(
            table.resolve_source("Axis 5957"),
            Err(RegistryError::NoStreams("Axis 5957".into()))
        );
    }

    #[test]
    fn empty_table_has_no_sources() {
        assert!(!NetworkTable::new().has_sources());
    }

    #[test]
    fn retry_returns_first_success() {
        let calls = Cell::new(0);
        let result = retry_fixed_interval(RetryPolicy::unbounded(Duration::ZERO), |attempt| {
            calls.set(attempt);
            (attempt == 4).then_some("ready")
        });
        assert_eq!(result, Ok("ready"));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn bounded_retry_is_exhausted() {
        let result: Result<(), _> =
            retry_fixed_interval(RetryPolicy::bounded(Duration::ZERO, 3), |_| None);
        assert_eq!(result, Err(RetryError::Exhausted { attempts: 3 }));
    }

    #[test]
    fn default_policy_is_unbounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.interval, Duration::from_millis(500));
    }

    #[test]
    fn discovery_falls_back_when_camera_is_missing() {
        let table = registered("USB Camera 0", &["mjpg:http://usb/video"]);
        let endpoint = discover_camera(
            &table,
            "Axis 5957",
            "http://10.59.57.19/axis-cgi/mjpg/video.cgi",
            RetryPolicy::bounded(Duration::ZERO, 1),
        )
        .unwrap();
        assert_eq!(
            endpoint,
            CameraEndpoint::Fallback("http://10.59.57.19/axis-cgi/mjpg/video.cgi".into())
        );
        assert!(endpoint.is_fallback());
    }

    #[test]
    fn discovery_waits_until_a_camera_registers() {
        struct LateRegistry {
            polls: Cell<usize>,
        }
        impl CameraRegistry for LateRegistry {
            fn has_sources(&self) -> bool {
                self.polls.set(self.polls.get() + 1);
                self.polls.get() > 5
            }
            fn resolve_source(&self, _name: &str) -> Result<Vec<String>, RegistryError> {
                Ok(vec!["http://late/video".into()])
            }
        }

        let registry = LateRegistry { polls: Cell::new(0) };
        let endpoint =
            discover_camera(&registry, "Axis 5957", "http://fallback", RetryPolicy::unbounded(Duration::ZERO))
                .unwrap();
        assert_eq!(endpoint.urls(), vec!["http://late/video".to_string()]);
        assert_eq!(registry.polls.get(), 6);
    }
}
