//! Event types for the qforge event system
//!
//! Provides shared event definitions and the EventBus used to fan progress
//! out to SSE clients and other observers.

mod generation_types;

pub use generation_types::KindCounts;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// qforge event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Observers are purely informational: no control flow depends on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QfEvent {
    /// Topic generation run started
    GenerationRunStarted {
        run_id: Uuid,
        topic_id: String,
        /// "OVERWRITE" or "ADD"
        mode: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress snapshot, emitted after every batch and at state transitions
    GenerationProgressUpdate {
        run_id: Uuid,
        topic_id: String,
        /// Controller state (e.g. "GENERATING_TESTS")
        state: String,
        /// Run status ("pending", "running", "completed", "error")
        status: String,
        /// 1-based attempt number
        attempt: u32,
        tests: KindCounts,
        flashcards: KindCounts,
        /// Issues recorded so far
        issue_count: usize,
        /// Most recent human-readable log line
        #[serde(default)]
        last_log: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run reached the completed state (possibly degraded)
    GenerationRunCompleted {
        run_id: Uuid,
        topic_id: String,
        tests_count: i64,
        flashcards_count: i64,
        /// Whether the final audit passed without issues
        audit_passed: bool,
        attempts: u32,
        duration_seconds: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run ended in the error status
    GenerationRunFailed {
        run_id: Uuid,
        topic_id: String,
        error_message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Topic content cleared (explicit clear or OVERWRITE mode)
    TopicContentCleared {
        topic_id: String,
        tests_deleted: usize,
        flashcards_deleted: usize,
        failures: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl QfEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            QfEvent::GenerationRunStarted { .. } => "GenerationRunStarted",
            QfEvent::GenerationProgressUpdate { .. } => "GenerationProgressUpdate",
            QfEvent::GenerationRunCompleted { .. } => "GenerationRunCompleted",
            QfEvent::GenerationRunFailed { .. } => "GenerationRunFailed",
            QfEvent::TopicContentCleared { .. } => "TopicContentCleared",
        }
    }

    /// Topic the event concerns
    pub fn topic_id(&self) -> &str {
        match self {
            QfEvent::GenerationRunStarted { topic_id, .. }
            | QfEvent::GenerationProgressUpdate { topic_id, .. }
            | QfEvent::GenerationRunCompleted { topic_id, .. }
            | QfEvent::GenerationRunFailed { topic_id, .. }
            | QfEvent::TopicContentCleared { topic_id, .. } => topic_id,
        }
    }
}

/// Broadcast channel for qforge events
///
/// Cloning is cheap: clones share the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QfEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow subscribers
    /// start missing the oldest ones.
    ///
    /// # Examples
    ///
    /// ```
    /// use qforge_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<QfEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: QfEvent) -> Result<usize, broadcast::error::SendError<QfEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress events use this: a run must never fail because nobody watches it.
    pub fn emit_lossy(&self, event: QfEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_event() -> QfEvent {
        QfEvent::GenerationRunStarted {
            run_id: Uuid::new_v4(),
            topic_id: "biology-cells".to_string(),
            mode: "ADD".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started_event()).is_err());
        // Lossy emit never panics
        bus.emit_lossy(started_event());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(started_event()).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "GenerationRunStarted");
        assert_eq!(event.topic_id(), "biology-cells");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(started_event()).unwrap();
        assert_eq!(json["type"], "GenerationRunStarted");
        assert_eq!(json["mode"], "ADD");
    }

    #[test]
    fn test_kind_counts_remaining_saturates() {
        let counts = KindCounts {
            target: 10,
            created: 12,
            skipped: 0,
            invalid: 0,
        };
        assert_eq!(counts.remaining(), 0);

        let counts = KindCounts {
            target: 10,
            created: 4,
            ..Default::default()
        };
        assert_eq!(counts.remaining(), 6);
    }
}
