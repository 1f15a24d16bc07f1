//! HTTP/JSON view of the telemetry table.
//!
//! `GET /tables` returns every entry. `GET /tables/<path>` returns one value,
//! or every entry below `<path>` when it names a table. `PUT /tables/<path>`
//! stores a JSON value; this is how the robot registers camera streams.
//! `GET /events` streams every write as a server-sent event.

use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Context;
use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dsvision::core_modules::telemetry::{NetworkTable, TableValue};
use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub fn router(table: NetworkTable) -> Router {
    Router::new()
        .route("/tables", get(snapshot_handler))
        .route("/tables/*path", get(get_handler).put(put_handler))
        .route("/events", get(events_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(table)
}

pub async fn start_table_server(
    table: NetworkTable,
    addr: SocketAddr,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding telemetry table on {addr}"))?;
    let local = listener.local_addr()?;
    let app = router(table);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%local, "table server stopped: {err}");
        }
    });
    tracing::info!(%local, "telemetry table listening");
    Ok((local, handle))
}

async fn snapshot_handler(State(table): State<NetworkTable>) -> Response {
    Json(table.snapshot()).into_response()
}

async fn get_handler(State(table): State<NetworkTable>, Path(path): Path<String>) -> Response {
    if let Some(value) = table.get(&path) {
        return Json(value).into_response();
    }
    let entries = table.entries_under(&path);
    if entries.is_empty() {
        StatusCode::NOT_FOUND.into_response()
    } else {
        Json(entries).into_response()
    }
}

async fn put_handler(
    State(table): State<NetworkTable>,
    Path(path): Path<String>,
    Json(value): Json<TableValue>,
) -> StatusCode {
    tracing::debug!(key = %path, ?value, "table write");
    table.put(&path, value);
    StatusCode::NO_CONTENT
}

async fn events_handler(
    State(table): State<NetworkTable>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = table.subscribe();
    let events = stream! {
        loop {
            match rx.recv().await {
                Ok(update) => match Event::default().event("update").json_data(&update) {
                    Ok(event) => yield Ok(event),
                    Err(err) => tracing::warn!("dropping unserializable update: {err}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "table event client lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default())
}
