//! HTTP endpoints of the inspector server
//!
//! - `GET /events`: server-sent event stream, one `data:` message per event
//! - `GET /ping`: discovery handshake for peer instances
//! - `POST /broadcast`: events relayed by peer instances
//! - `GET /stats`: running token totals

use super::ServerState;
use crate::events::{ClassifiedEvent, TokenTotals};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{stream, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type EventSseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug)]
pub enum ApiError {
    Internal(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        tracing::debug!("Inspector API error: {} - {}", status, message);

        (status, message).into_response()
    }
}

/// Live event stream for the UI
pub async fn events(State(state): State<ServerState>) -> Sse<EventSseStream> {
    let stream: EventSseStream = match state.emitter.subscribe() {
        Some(receiver) => {
            tracing::debug!(
                subscribers = state.emitter.subscriber_count(),
                "Inspector UI connected"
            );
            Box::pin(BroadcastStream::new(receiver).filter_map(|item| async move {
                match item {
                    Ok(published) => Some(Ok(Event::default().data(published.json.as_str()))),
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Inspector UI fell behind, skipped events");
                        None
                    }
                }
            }))
        }
        // Forwarding instances never serve, but keep the handler total
        None => Box::pin(stream::empty()),
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// Discovery handshake
pub async fn ping() -> Json<Value> {
    Json(json!({
        "gemini_inspector": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Re-publish an event relayed by a peer instance
///
/// The body is read as raw bytes so peers need not set a content type.
pub async fn broadcast(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let event: ClassifiedEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;
    state.emitter.publish(event);
    Ok("OK")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub totals: TokenTotals,
    pub total_tokens: u64,
    pub subscribers: usize,
}

/// Token totals across every response seen so far
pub async fn stats(State(state): State<ServerState>) -> Result<Json<StatsResponse>, ApiError> {
    let totals = state
        .totals
        .lock()
        .map_err(|e| ApiError::Internal(format!("Failed to lock token totals: {}", e)))?
        .clone();

    Ok(Json(StatsResponse {
        total_tokens: totals.total_tokens(),
        totals,
        subscribers: state.emitter.subscriber_count(),
    }))
}
