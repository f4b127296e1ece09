//! Database initialization
//!
//! Creates the shared SQLite database on first run and brings every table
//! used by the generation pipeline into existence. All statements are
//! idempotent (`IF NOT EXISTS` / `INSERT OR IGNORE`) so startup can run them
//! unconditionally.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Per-connection wait on a locked database before SQLITE_BUSY surfaces
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
///
/// Pragmas are set through the connect options so every pooled connection
/// gets them, not only the first one.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL allows concurrent readers with one writer
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    // Concurrent topic runs each hold a connection while claiming, so the
    // pool is sized above the sqlx default of 10.
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    info!("Database busy timeout set to {} ms", BUSY_TIMEOUT_MS);

    Ok(pool)
}

/// Create every table (idempotent)
///
/// Exposed separately from [`init_database`] so tests can build the schema
/// on an in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_topics_table(pool).await?;
    create_topic_content_counters_table(pool).await?;
    create_test_items_table(pool).await?;
    create_flashcard_items_table(pool).await?;
    create_content_hash_keys_table(pool).await?;
    create_generation_runs_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Topics provide the narrative content candidates are grounded in
pub async fn create_topics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            topic_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            sections TEXT NOT NULL DEFAULT '[]',
            tier TEXT NOT NULL DEFAULT 'core' CHECK (tier IN ('core', 'supplementary')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Derived per-topic counts (materialized view, recomputed per run)
pub async fn create_topic_content_counters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_content_counters (
            topic_id TEXT PRIMARY KEY,
            tests_count INTEGER NOT NULL DEFAULT 0,
            flashcards_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_test_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_items (
            item_id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            stem TEXT NOT NULL,
            options TEXT NOT NULL,
            answer TEXT NOT NULL CHECK (answer IN ('A', 'B', 'C', 'D')),
            rationale TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT '',
            difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 1 AND 3),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_test_items_topic ON test_items(topic_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_flashcard_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flashcard_items (
            item_id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            front TEXT NOT NULL,
            back TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_flashcard_items_topic ON flashcard_items(topic_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Content-addressed dedup index
///
/// `key` is `topic_id:owner_collection:content_hash`; the UNIQUE constraint
/// enforces the same tuple for callers that insert by columns.
pub async fn create_content_hash_keys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_hash_keys (
            key TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            owner_collection TEXT NOT NULL CHECK (owner_collection IN ('tests', 'flashcards')),
            content_hash TEXT NOT NULL,
            item_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (topic_id, owner_collection, content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Observability record of each topic generation run
pub async fn create_generation_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation_runs (
            run_id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            state TEXT NOT NULL,
            status TEXT NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0,
            progress TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generation_runs_topic ON generation_runs(topic_id, started_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Only infrastructure settings are seeded here. Generation tuning keys
/// (`gen_batch_size_tests`, ...) are deliberately left absent so the TOML
/// file and compiled defaults stay effective until an operator sets them.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "gen_database_max_lock_wait_ms", "5000").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE: several services may initialize concurrently
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
