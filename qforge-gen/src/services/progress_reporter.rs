//! Progress publishing
//!
//! Snapshots are persisted to `generation_runs` and broadcast on the event
//! bus. Both are best effort: a failed save is logged and the run goes on.

use qforge_common::events::{EventBus, QfEvent};
use sqlx::SqlitePool;

use crate::db::runs::save_run;
use crate::models::GenerationProgress;

#[derive(Clone)]
pub struct ProgressReporter {
    db: SqlitePool,
    event_bus: EventBus,
}

impl ProgressReporter {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Persist and broadcast a snapshot
    pub async fn publish(&self, progress: &GenerationProgress) {
        if let Err(e) = save_run(&self.db, progress).await {
            tracing::warn!(run_id = %progress.run_id, error = %e, "Failed to persist run progress");
        }
        self.event_bus.emit_lossy(progress.to_event());
    }

    pub fn emit(&self, event: QfEvent) {
        self.event_bus.emit_lossy(event);
    }
}
