use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use signal_proto::{
    MonitorLinkRequest, OpenCameraRequest, OpenMonitorRequest, SendEventRequest, SEND_EVENT_ACK,
};
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::RelayError;
use crate::metrics;
use crate::relay::{OpenedStream, Role, SignalingRelay};
use crate::state::AppState;

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    uptime_secs: u64,
    live_streams: usize,
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        live_streams: state.relay().live_streams(),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

/// Removes the registry entry once axum drops the response stream, which is
/// how a client disconnect surfaces.
struct DisconnectGuard {
    relay: Arc<SignalingRelay>,
    id: String,
    serial: u64,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.relay.disconnect(&self.id, self.serial);
    }
}

fn event_stream(
    state: &AppState,
    opened: OpenedStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guard = DisconnectGuard {
        relay: state.relay().clone(),
        id: opened.id,
        serial: opened.stream.serial(),
    };
    let events = UnboundedReceiverStream::new(opened.receiver).map(move |envelope| {
        let _guard = &guard;
        Ok(Event::default().data(envelope.to_json()))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| RelayError::BadRequest(format!("invalid body: {err}")))
}

async fn open_camera(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let request: OpenCameraRequest = parse_body(&body)?;
    let opened = state
        .relay()
        .open_stream(Role::Camera, request.camera_id.as_deref())?;
    Ok(event_stream(&state, opened))
}

async fn open_monitor(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let request: OpenMonitorRequest = parse_body(&body)?;
    let opened = state
        .relay()
        .open_stream(Role::Monitor, request.monitor_id.as_deref())?;
    Ok(event_stream(&state, opened))
}

async fn request_monitor_link(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let request: MonitorLinkRequest = parse_body(&body)?;
    let opened = state
        .relay()
        .request_monitor_link(request.connect_id.as_deref())?;
    Ok(event_stream(&state, opened))
}

async fn send_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, RelayError> {
    let request: SendEventRequest = parse_body(&body)?;
    state.relay().send_event(
        request.id.as_deref(),
        request.kind.as_deref(),
        request.content,
    )?;
    Ok(SEND_EVENT_ACK)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(ready))
        .route("/metrics", get(metrics_handler))
        .route("/api/camera", post(open_camera))
        .route("/api/monitor", post(open_monitor))
        .route("/api/connect", post(request_monitor_link))
        .route("/api/sendEvent", post(send_event))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
