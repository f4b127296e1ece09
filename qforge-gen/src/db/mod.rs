//! Database access for qforge-gen
//!
//! All tables live in the shared `qforge.db`; the schema itself is owned by
//! `qforge_common::db`.

pub mod counters;
pub mod hash_keys;
pub mod items;
pub mod runs;
pub mod settings;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the database and bring the schema up to date
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!(path = %db_path.display(), "Connecting to database");
    let pool = qforge_common::db::init_database(db_path).await?;

    let interrupted = runs::mark_interrupted_runs(&pool).await?;
    if interrupted > 0 {
        tracing::warn!(interrupted, "Marked runs left running by a previous process as failed");
    }

    Ok(pool)
}

/// Timestamp format stored in TEXT columns
pub(crate) fn parse_timestamp(value: &str) -> qforge_common::Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| qforge_common::Error::Internal(format!("Bad timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_uuid(value: &str) -> qforge_common::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| qforge_common::Error::Internal(format!("Bad uuid '{}': {}", value, e)))
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    qforge_common::db::create_schema(&pool).await.unwrap();
    pool
}
