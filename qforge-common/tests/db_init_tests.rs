//! Database initialization on first run and on reopen

use qforge_common::db::init::init_database;
use tempfile::TempDir;

const TABLES: [&str; 7] = [
    "settings",
    "topics",
    "topic_content_counters",
    "test_items",
    "flashcard_items",
    "content_hash_keys",
    "generation_runs",
];

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sub").join("qforge.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists(), "Database file was not created");

    for table in TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("qforge.db");

    let first = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO topics (topic_id, title) VALUES ('t1', 'Topic')")
        .execute(&first)
        .await
        .unwrap();
    first.close().await;

    let second = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
        .fetch_one(&second)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("qforge.db")).await.unwrap();

    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'gen_database_max_lock_wait_ms'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("5000"));

    // Generation tuning keys stay absent so TOML and defaults apply
    let tuning: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'gen_batch_size_tests'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tuning, 0);
}

#[tokio::test]
async fn test_null_setting_is_reset_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("qforge.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'gen_database_max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'gen_database_max_lock_wait_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_hash_key_uniqueness_is_enforced_by_schema() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("qforge.db")).await.unwrap();

    let insert = "INSERT INTO content_hash_keys (key, topic_id, owner_collection, content_hash, item_id, created_at)
                  VALUES (?, 't', 'tests', 'abc', ?, '2026-01-01T00:00:00Z')";
    sqlx::query(insert)
        .bind("t:tests:abc")
        .bind("item-1")
        .execute(&pool)
        .await
        .unwrap();

    let duplicate = sqlx::query(insert).bind("t:tests:abc").bind("item-2").execute(&pool).await;
    assert!(duplicate.is_err());
}
