//! MJPEG-over-HTTP server for one `FrameBus`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_stream::stream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::{FrameBus, FramePacket};

pub const BOUNDARY: &str = "frame";

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

pub fn router(bus: FrameBus) -> Router {
    Router::new()
        .route("/", get(stream_handler))
        .route("/stream.mjpg", get(stream_handler))
        .route("/frame.jpg", get(frame_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(bus)
}

/// Binds `addr` and serves `bus` until the runtime shuts down.
/// Returns the bound address, which differs from `addr` when port 0 was asked for.
pub async fn start_mjpeg_server(
    bus: FrameBus,
    addr: SocketAddr,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding mjpeg stream on {addr}"))?;
    let local = listener.local_addr()?;
    let app = router(bus);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%local, "mjpeg server stopped: {err}");
        }
    });
    tracing::info!(%local, "mjpeg stream listening");
    Ok((local, handle))
}

/// Logs the end of a client stream when the response body is dropped.
struct ClientGuard(u64);

impl Drop for ClientGuard {
    fn drop(&mut self) {
        tracing::debug!(client = self.0, "mjpeg client disconnected");
    }
}

fn multipart_chunk(packet: &FramePacket) -> Bytes {
    let mut payload = Vec::with_capacity(packet.data.len() + 96);
    payload.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    payload.extend_from_slice(format!("Content-Length: {}\r\n", packet.data.len()).as_bytes());
    payload.extend_from_slice(format!("X-Sequence: {}\r\n\r\n", packet.seq).as_bytes());
    payload.extend_from_slice(&packet.data);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

async fn stream_handler(State(bus): State<FrameBus>) -> Response {
    let mut rx = bus.subscribe();
    let initial = bus.latest();
    let guard = ClientGuard(NEXT_CLIENT.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(client = guard.0, clients = bus.client_count(), "mjpeg client connected");

    let body = stream! {
        let _guard = guard;
        if let Some(packet) = initial {
            yield Ok::<Bytes, Infallible>(multipart_chunk(&packet));
        }
        loop {
            match rx.recv().await {
                Ok(packet) => yield Ok(multipart_chunk(&packet)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::trace!(skipped, "mjpeg client lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

async fn frame_handler(State(bus): State<FrameBus>) -> Response {
    match bus.latest() {
        Some(packet) => (
            [(header::CONTENT_TYPE, "image/jpeg")],
            Bytes::copy_from_slice(&packet.data),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
