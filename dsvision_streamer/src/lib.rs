//! Network boundaries of the vision coprocessor: MJPEG re-streaming and the
//! telemetry table endpoint.
//!
//! The processing loop is the sole producer on every bus. Clients that fall
//! behind skip frames; they never slow the producer down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, watch};

pub mod mjpeg;
pub mod sink;
pub mod table;

pub use mjpeg::start_mjpeg_server;
pub use sink::MjpegSink;
pub use table::start_table_server;

/// One encoded JPEG frame as it travels to stream clients.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub seq: u64,
    pub ts_millis: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// Fan-out of encoded frames to any number of HTTP clients.
#[derive(Clone)]
pub struct FrameBus {
    frames_tx: broadcast::Sender<FramePacket>,
    latest_tx: Arc<watch::Sender<Option<FramePacket>>>,
    seq: Arc<AtomicU64>,
}

impl FrameBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel::<FramePacket>(capacity.max(1));
        let (latest_tx, _) = watch::channel(None);
        Self {
            frames_tx,
            latest_tx: Arc::new(latest_tx),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes a JPEG. Never blocks; with no clients connected only the latest
    /// frame is kept.
    pub fn publish(&self, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> FramePacket {
        let packet = FramePacket {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            ts_millis: now_millis(),
            width,
            height,
            data: data.into(),
        };
        self.latest_tx.send_replace(Some(packet.clone()));
        let _ = self.frames_tx.send(packet.clone());
        packet
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FramePacket> {
        self.frames_tx.subscribe()
    }

    pub fn latest(&self) -> Option<FramePacket> {
        self.latest_tx.borrow().clone()
    }

    /// Number of connected stream clients.
    pub fn client_count(&self) -> usize {
        self.frames_tx.receiver_count()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
