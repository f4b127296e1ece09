//! Topic content counters
//!
//! The counters row is a materialized view of the item tables. It is only
//! ever rewritten from fresh `COUNT(*)` values, never incremented.

use chrono::Utc;
use qforge_common::Result;
use sqlx::{Row, SqlitePool};

use super::items::count_items;
use super::parse_timestamp;
use crate::models::{ContentKind, TopicContentCounters};
use crate::utils::{max_lock_wait_ms, retry_on_lock};

/// Count both collections and upsert the counters row
pub async fn recompute_counters(pool: &SqlitePool, topic_id: &str) -> Result<TopicContentCounters> {
    let counters = TopicContentCounters {
        topic_id: topic_id.to_string(),
        tests_count: count_items(pool, topic_id, ContentKind::Tests).await?,
        flashcards_count: count_items(pool, topic_id, ContentKind::Flashcards).await?,
        updated_at: Utc::now(),
    };

    let updated_at = counters.updated_at.to_rfc3339();
    let max_wait_ms = max_lock_wait_ms(pool).await;
    retry_on_lock("counters::recompute", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO topic_content_counters (topic_id, tests_count, flashcards_count, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(topic_id) DO UPDATE SET
                tests_count = excluded.tests_count,
                flashcards_count = excluded.flashcards_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(topic_id)
        .bind(counters.tests_count)
        .bind(counters.flashcards_count)
        .bind(&updated_at)
        .execute(pool)
        .await?;
        Ok::<(), qforge_common::Error>(())
    })
    .await?;

    tracing::debug!(
        topic_id,
        tests = counters.tests_count,
        flashcards = counters.flashcards_count,
        "Counters recomputed"
    );

    Ok(counters)
}

/// Last recomputed counters, if the topic was ever counted
pub async fn load_counters(pool: &SqlitePool, topic_id: &str) -> Result<Option<TopicContentCounters>> {
    let row = sqlx::query(
        "SELECT tests_count, flashcards_count, updated_at FROM topic_content_counters WHERE topic_id = ?",
    )
    .bind(topic_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let updated_at: String = row.try_get("updated_at")?;
            Ok(Some(TopicContentCounters {
                topic_id: topic_id.to_string(),
                tests_count: row.try_get("tests_count")?,
                flashcards_count: row.try_get("flashcards_count")?,
                updated_at: parse_timestamp(&updated_at)?,
            }))
        }
        None => Ok(None),
    }
}
