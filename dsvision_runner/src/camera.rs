//! MJPEG-over-HTTP frame source.
//!
//! A reader thread pulls the camera's multipart stream, cuts it into JPEGs at
//! the SOI/EOI markers, relays each JPEG untouched to the raw stream bus and
//! hands it to the processing loop through a small bounded channel. The loop
//! decodes only the newest JPEG it finds.

use std::io::{Cursor, Read};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use dsvision::{Acquire, Frame, FrameSource, decode_jpeg_into};
use dsvision_streamer::FrameBus;
use reqwest::blocking::{Client, Response};

const CHUNK_SIZE: usize = 64 * 1024;
const START_OF_IMAGE: [u8; 2] = [0xFF, 0xD8];
const END_OF_IMAGE: [u8; 2] = [0xFF, 0xD9];
/// JPEGs buffered between the reader thread and the loop.
const HANDOFF_CAPACITY: usize = 2;

#[derive(Debug, Clone)]
pub struct MjpegCameraConfig {
    pub urls: Vec<String>,
    pub frame_interval: Duration,
    pub reopen_delay: Duration,
    /// Longest silence tolerated on an open stream before reconnecting.
    pub stall_timeout: Duration,
}

pub struct MjpegCamera {
    frames: Receiver<Vec<u8>>,
    frame_interval: Duration,
    decode_failures: u64,
}

impl MjpegCamera {
    /// Starts the reader thread. Connection problems are retried on that thread;
    /// only failing to create it is an error here.
    pub fn spawn(config: MjpegCameraConfig, relay: FrameBus) -> anyhow::Result<Self> {
        anyhow::ensure!(!config.urls.is_empty(), "no camera urls to read from");
        let (tx, rx) = bounded(HANDOFF_CAPACITY);
        let frame_interval = config.frame_interval;
        spawn_reader(config, tx, relay)?;
        Ok(Self {
            frames: rx,
            frame_interval,
            decode_failures: 0,
        })
    }

    fn newest(&self) -> Option<Vec<u8>> {
        let mut newest = match self.frames.recv_timeout(self.frame_interval) {
            Ok(jpeg) => jpeg,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::trace!("camera reader is gone");
                return None;
            }
        };
        while let Ok(newer) = self.frames.try_recv() {
            newest = newer;
        }
        Some(newest)
    }
}

impl FrameSource for MjpegCamera {
    fn acquire(&mut self, frame: &mut Frame) -> Acquire {
        let Some(jpeg) = self.newest() else {
            return Acquire::Empty;
        };
        match decode_jpeg_into(&jpeg, frame) {
            Ok(()) => Acquire::Frame,
            Err(err) => {
                self.decode_failures += 1;
                tracing::debug!(
                    failures = self.decode_failures,
                    bytes = jpeg.len(),
                    "undecodable camera frame: {err}"
                );
                Acquire::Empty
            }
        }
    }
}

fn spawn_reader(
    config: MjpegCameraConfig,
    tx: Sender<Vec<u8>>,
    relay: FrameBus,
) -> anyhow::Result<thread::JoinHandle<()>> {
    // The blocking client applies `timeout` to each body read, so a camera that
    // goes quiet surfaces as a read error instead of parking the thread.
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .timeout(config.stall_timeout)
        .build()
        .context("building camera http client")?;
    thread::Builder::new()
        .name("mjpeg-camera-reader".into())
        .spawn(move || run_reader(client, config, tx, relay))
        .context("spawning camera reader thread")
}

fn run_reader(client: Client, config: MjpegCameraConfig, tx: Sender<Vec<u8>>, relay: FrameBus) {
    for url in config.urls.iter().cycle() {
        match client.get(url).send() {
            Ok(response) if response.status().is_success() => {
                tracing::info!(%url, "connected to camera stream");
                if !stream_from_http(response, &tx, &relay) {
                    return;
                }
                tracing::info!(%url, "camera stream ended, reconnecting");
            }
            Ok(response) => {
                tracing::warn!(%url, status = %response.status(), "camera refused stream");
            }
            Err(err) => {
                tracing::warn!(%url, "waiting for camera stream: {err}");
            }
        }
        thread::sleep(config.reopen_delay);
    }
}

/// Pumps one connection. Returns false once the processing side has gone away.
fn stream_from_http(response: Response, tx: &Sender<Vec<u8>>, relay: &FrameBus) -> bool {
    stream_from_reader(response, |jpeg| {
        let (width, height) = jpeg_dimensions(&jpeg);
        relay.publish(width, height, jpeg.as_slice());
        match tx.try_send(jpeg) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    })
}

/// Reads the size from the JPEG header without decoding pixels. (0, 0) when unreadable.
fn jpeg_dimensions(jpeg: &[u8]) -> (u32, u32) {
    image::ImageReader::with_format(Cursor::new(jpeg), image::ImageFormat::Jpeg)
        .into_dimensions()
        .unwrap_or_default()
}

/// Reads until EOF or error, calling `on_frame` per JPEG. Returns false when
/// `on_frame` asked to stop.
fn stream_from_reader<R: Read>(mut reader: R, mut on_frame: impl FnMut(Vec<u8>) -> bool) -> bool {
    let mut buffer = Vec::with_capacity(CHUNK_SIZE * 2);
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return true,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(frame) = extract_frame(&mut buffer) {
                    if !on_frame(frame) {
                        return false;
                    }
                }
            }
            Err(err) => {
                tracing::warn!("camera read error: {err}");
                return true;
            }
        }
    }
}

/// Cuts the first complete JPEG out of `buffer`, dropping anything before it.
fn extract_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let Some(start) = find_marker(buffer, &START_OF_IMAGE) else {
        // Keep a trailing 0xFF: it may be the first half of a marker.
        let keep = usize::from(buffer.last() == Some(&0xFF));
        buffer.drain(..buffer.len() - keep);
        return None;
    };
    if start > 0 {
        buffer.drain(..start);
    }

    let end = find_marker(&buffer[START_OF_IMAGE.len()..], &END_OF_IMAGE)? + START_OF_IMAGE.len();
    let frame_end = end + END_OF_IMAGE.len();
    Some(buffer.drain(..frame_end).collect())
}

fn find_marker(buffer: &[u8], marker: &[u8]) -> Option<usize> {
    buffer
        .windows(marker.len())
        .position(|window| window == marker)
}
