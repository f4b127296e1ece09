//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for qforge services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between heartbeat comments on every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Create a simple heartbeat-only SSE stream for connection status monitoring
///
/// Used by clients that only need to know whether the service is reachable.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(_state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     qforge_common::sse::create_heartbeat_sse_stream("qforge-gen")
/// }
/// ```
pub fn create_heartbeat_sse_stream(
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} general events", service_name);

    let stream = async_stream::stream! {
        info!("SSE: {} event stream started", service_name);

        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            debug!("SSE: Sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(default_keep_alive())
}

/// Keep-alive policy shared by every qforge SSE endpoint
pub fn default_keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}
