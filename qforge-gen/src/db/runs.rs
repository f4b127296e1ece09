//! Generation run persistence
//!
//! Runs are stored for observability only; counts always come from the item
//! tables.

use qforge_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{GenerationProgress, RunStatus};
use crate::utils::{max_lock_wait_ms, retry_on_lock};

/// Upsert a run snapshot
pub async fn save_run(pool: &SqlitePool, progress: &GenerationProgress) -> Result<()> {
    // Serialize before touching the database
    let run_id = progress.run_id.to_string();
    let snapshot = serde_json::to_string(progress)
        .map_err(|e| Error::Internal(format!("Failed to serialize run: {}", e)))?;
    let started_at = progress.started_at.to_rfc3339();
    let ended_at = progress.ended_at.map(|dt| dt.to_rfc3339());

    let max_wait_ms = max_lock_wait_ms(pool).await;
    retry_on_lock("runs::save_run", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO generation_runs (
                run_id, topic_id, mode, state, status, attempt, progress, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                state = excluded.state,
                status = excluded.status,
                attempt = excluded.attempt,
                progress = excluded.progress,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&run_id)
        .bind(&progress.topic_id)
        .bind(progress.mode.as_str())
        .bind(progress.state.as_str())
        .bind(progress.status.as_str())
        .bind(progress.attempt as i64)
        .bind(&snapshot)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;
        Ok::<(), qforge_common::Error>(())
    })
    .await
}

pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<GenerationProgress>> {
    let snapshot: Option<String> =
        sqlx::query_scalar("SELECT progress FROM generation_runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(pool)
            .await?;

    snapshot.as_deref().map(parse_snapshot).transpose()
}

/// Most recent runs of a topic, newest first
pub async fn list_runs_for_topic(
    pool: &SqlitePool,
    topic_id: &str,
    limit: i64,
) -> Result<Vec<GenerationProgress>> {
    let snapshots: Vec<String> = sqlx::query_scalar(
        "SELECT progress FROM generation_runs WHERE topic_id = ? ORDER BY started_at DESC LIMIT ?",
    )
    .bind(topic_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    snapshots.iter().map(|s| parse_snapshot(s)).collect()
}

/// Fail runs a previous process left pending or running
///
/// Called once at startup, before any new run is spawned.
pub async fn mark_interrupted_runs(pool: &SqlitePool) -> Result<usize> {
    let snapshots: Vec<String> = sqlx::query_scalar(
        "SELECT progress FROM generation_runs WHERE status IN (?, ?)",
    )
    .bind(RunStatus::Pending.as_str())
    .bind(RunStatus::Running.as_str())
    .fetch_all(pool)
    .await?;

    let mut marked = 0;
    for snapshot in snapshots {
        let mut progress = parse_snapshot(&snapshot)?;
        progress.fail("interrupted by service shutdown");
        save_run(pool, &progress).await?;
        marked += 1;
    }
    Ok(marked)
}

fn parse_snapshot(snapshot: &str) -> Result<GenerationProgress> {
    serde_json::from_str(snapshot)
        .map_err(|e| Error::Internal(format!("Failed to parse run snapshot: {}", e)))
}
