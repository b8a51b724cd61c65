// Server-Sent Events endpoint.
// Streams scheduler refreshes to connected clients as they happen.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use super::AppState;

/// Open an event stream: one `connected` event, then a `refresh` event per update.
///
/// A client that falls behind the broadcast buffer skips the missed updates.
/// The stream ends when the server begins shutting down.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.broadcaster.subscribe();
    debug!(
        subscribers = state.broadcaster.subscriber_count(),
        "SSE client connected"
    );

    let connected = Event::default().event("connected").data(
        json!({
            "message": "Connected to live updates",
            "org": &*state.org,
            "timestamp": Utc::now(),
        })
        .to_string(),
    );

    let updates = BroadcastStream::new(receiver).filter_map(|update| match update {
        Ok(update) => match Event::default().event("refresh").json_data(&update) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                warn!(error = %e, "Failed to encode live update");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "SSE client lagged, updates skipped");
            None
        }
    });

    let stream = tokio_stream::once(Ok::<_, Infallible>(connected)).chain(updates);
    let stream = futures::StreamExt::take_until(stream, state.shutdown.clone().cancelled_owned());
    Sse::new(stream).keep_alive(KeepAlive::default())
}
