//! Server-Sent Events (SSE) utilities
//!
//! Transport adapter between domain event streams and the wire. Producers
//! yield plain serializable values; this module owns the `data: {...}` framing
//! and keep-alive heartbeats.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

/// Heartbeat interval for long-lived streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Wrap a stream of serializable events as an SSE response
///
/// Each item becomes one `data: {json}` frame. Items that fail to serialize
/// are logged and sent as a comment so the stream stays open.
///
/// # Example
/// ```rust,ignore
/// pub async fn progress(State(state): State<AppState>) -> impl IntoResponse {
///     pulse_common::sse::json_event_stream(state.job.events())
/// }
/// ```
pub fn json_event_stream<S, T>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let stream = events.map(|event| match serde_json::to_string(&event) {
        Ok(json) => {
            debug!("SSE: sending {} bytes", json.len());
            Ok(Event::default().data(json))
        }
        Err(e) => {
            warn!("SSE: Failed to serialize event: {}", e);
            Ok(Event::default().comment("serialization error"))
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
