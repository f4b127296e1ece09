//! Server-Sent Events for generation progress

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use qforge_common::sse::{default_keep_alive, HEARTBEAT_INTERVAL};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only forward events of this topic
    pub topic_id: Option<String>,
}

/// GET /events - connection status heartbeat
pub async fn event_stream(
    State(_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    qforge_common::sse::create_heartbeat_sse_stream("qforge-gen")
}

/// GET /generation/events - run lifecycle and progress events
///
/// Streams GenerationRunStarted, GenerationProgressUpdate,
/// GenerationRunCompleted, GenerationRunFailed and TopicContentCleared,
/// optionally narrowed to one topic with `?topic_id=`.
pub async fn generation_event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(topic_id = ?filter.topic_id, "New SSE client connected to generation events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let event = match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "SSE: Client lagging, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if let Some(topic_id) = &filter.topic_id {
                        if event.topic_id() != topic_id.as_str() {
                            continue;
                        }
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting generation event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(default_keep_alive())
}
