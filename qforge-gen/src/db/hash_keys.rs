//! Content hash key store
//!
//! The `content_hash_keys` table is the only deduplication authority. A key
//! and its item are written by [`try_claim`] in one transaction, so a key
//! never exists without its item and a duplicate never overwrites anything.

use chrono::Utc;
use qforge_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{compose_key, Candidate, ContentHashKey, ContentKind};
use crate::utils::{begin_monitored, max_lock_wait_ms, retry_on_lock};

/// Result of an atomic claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// Key and item were written
    Claimed { item_id: Uuid },
    /// Another item already owns this content; nothing was written
    AlreadyExists { existing_item_id: Uuid },
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }
}

/// Everything one claim attempt writes
struct ClaimRequest<'a> {
    key: String,
    topic_id: &'a str,
    kind: ContentKind,
    content_hash: &'a str,
    item_id: Uuid,
    created_at: String,
    candidate: &'a Candidate,
}

/// Atomically claim `content_hash` for `candidate` within `topic_id`
///
/// The collection is taken from the candidate's kind. Repeating the call with
/// the same content returns `AlreadyExists` with the first item's id.
pub async fn try_claim(
    pool: &SqlitePool,
    topic_id: &str,
    content_hash: &str,
    candidate: &Candidate,
) -> Result<ClaimOutcome> {
    let kind = candidate.content_kind();
    let request = ClaimRequest {
        key: compose_key(topic_id, kind, content_hash),
        topic_id,
        kind,
        content_hash,
        item_id: Uuid::new_v4(),
        created_at: Utc::now().to_rfc3339(),
        candidate,
    };

    let max_wait_ms = max_lock_wait_ms(pool).await;
    retry_on_lock("hash_keys::try_claim", max_wait_ms, || claim_once(pool, &request)).await
}

async fn claim_once(pool: &SqlitePool, request: &ClaimRequest<'_>) -> Result<ClaimOutcome> {
    let mut tx = begin_monitored(pool, "hash_keys::try_claim").await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO content_hash_keys (key, topic_id, owner_collection, content_hash, item_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&request.key)
    .bind(request.topic_id)
    .bind(request.kind.as_str())
    .bind(request.content_hash)
    .bind(request.item_id.to_string())
    .bind(&request.created_at)
    .execute(tx.conn())
    .await?
    .rows_affected();

    if inserted == 0 {
        let existing: String =
            sqlx::query_scalar("SELECT item_id FROM content_hash_keys WHERE key = ?")
                .bind(&request.key)
                .fetch_one(tx.conn())
                .await?;
        tx.rollback().await?;

        tracing::debug!(key = %request.key, existing = %existing, "Content already claimed");
        return Ok(ClaimOutcome::AlreadyExists {
            existing_item_id: parse_uuid(&existing)?,
        });
    }

    insert_item(tx.conn(), request).await?;
    tx.commit().await?;

    tracing::debug!(key = %request.key, item_id = %request.item_id, "Claimed content");
    Ok(ClaimOutcome::Claimed {
        item_id: request.item_id,
    })
}

async fn insert_item(conn: &mut SqliteConnection, request: &ClaimRequest<'_>) -> Result<()> {
    match request.candidate {
        Candidate::Test(test) => {
            let options = to_json(&test.options)?;
            sqlx::query(
                r#"
                INSERT INTO test_items (
                    item_id, topic_id, content_hash, stem, options,
                    answer, rationale, section, difficulty, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(request.item_id.to_string())
            .bind(request.topic_id)
            .bind(request.content_hash)
            .bind(&test.stem)
            .bind(options)
            .bind(test.answer.as_str())
            .bind(&test.rationale)
            .bind(test.section.trim())
            .bind(u8::from(test.difficulty) as i64)
            .bind(&request.created_at)
            .execute(conn)
            .await?;
        }
        Candidate::Flashcard(card) => {
            let tags = to_json(&card.tags)?;
            sqlx::query(
                r#"
                INSERT INTO flashcard_items (item_id, topic_id, content_hash, front, back, tags, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(request.item_id.to_string())
            .bind(request.topic_id)
            .bind(request.content_hash)
            .bind(card.front.trim())
            .bind(card.back.trim())
            .bind(tags)
            .bind(&request.created_at)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}

fn to_json(values: &[String]) -> Result<String> {
    serde_json::to_string(values)
        .map_err(|e| Error::Internal(format!("Failed to serialize item field: {}", e)))
}

/// Per-item failure during a clear
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearFailure {
    pub item_id: Uuid,
    pub message: String,
}

/// Outcome of clearing one collection of a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearReport {
    pub kind: ContentKind,
    pub deleted: usize,
    pub failures: Vec<ClearFailure>,
    /// Keys whose item was already gone
    pub orphan_keys_removed: u64,
}

/// Delete every item of `kind` in `topic_id` together with its key
///
/// One transaction per item, key first. A failing item is recorded and the
/// rest continue; orphan keys are swept at the end.
pub async fn clear_topic_content(
    pool: &SqlitePool,
    topic_id: &str,
    kind: ContentKind,
) -> Result<ClearReport> {
    let item_ids = super::items::list_item_ids(pool, topic_id, kind).await?;
    let max_wait_ms = max_lock_wait_ms(pool).await;

    let mut report = ClearReport {
        kind,
        deleted: 0,
        failures: Vec::new(),
        orphan_keys_removed: 0,
    };

    for item_id in item_ids {
        let result = retry_on_lock("hash_keys::clear_item", max_wait_ms, || {
            delete_item(pool, topic_id, kind, item_id)
        })
        .await;

        match result {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                tracing::warn!(topic_id, kind = %kind, item_id = %item_id, error = %e, "Failed to delete item");
                report.failures.push(ClearFailure {
                    item_id,
                    message: e.to_string(),
                });
            }
        }
    }

    report.orphan_keys_removed = retry_on_lock("hash_keys::sweep_orphans", max_wait_ms, || {
        sweep_orphan_keys(pool, topic_id, kind)
    })
    .await?;

    tracing::info!(
        topic_id,
        kind = %kind,
        deleted = report.deleted,
        failures = report.failures.len(),
        orphan_keys = report.orphan_keys_removed,
        "Cleared topic content"
    );

    Ok(report)
}

async fn delete_item(
    pool: &SqlitePool,
    topic_id: &str,
    kind: ContentKind,
    item_id: Uuid,
) -> Result<()> {
    let mut tx = begin_monitored(pool, "hash_keys::clear_item").await?;

    sqlx::query(
        "DELETE FROM content_hash_keys WHERE topic_id = ? AND owner_collection = ? AND item_id = ?",
    )
    .bind(topic_id)
    .bind(kind.as_str())
    .bind(item_id.to_string())
    .execute(tx.conn())
    .await?;

    let sql = format!("DELETE FROM {} WHERE item_id = ?", kind.table());
    sqlx::query(&sql)
        .bind(item_id.to_string())
        .execute(tx.conn())
        .await?;

    tx.commit().await
}

async fn sweep_orphan_keys(pool: &SqlitePool, topic_id: &str, kind: ContentKind) -> Result<u64> {
    let sql = format!(
        "DELETE FROM content_hash_keys \
         WHERE topic_id = ? AND owner_collection = ? \
         AND item_id NOT IN (SELECT item_id FROM {})",
        kind.table()
    );
    let removed = sqlx::query(&sql)
        .bind(topic_id)
        .bind(kind.as_str())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(removed)
}

/// Look up the key owning `content_hash`, if any
pub async fn find_claim(
    pool: &SqlitePool,
    topic_id: &str,
    kind: ContentKind,
    content_hash: &str,
) -> Result<Option<ContentHashKey>> {
    let row = sqlx::query(
        "SELECT topic_id, content_hash, item_id, created_at FROM content_hash_keys WHERE key = ?",
    )
    .bind(compose_key(topic_id, kind, content_hash))
    .fetch_optional(pool)
    .await?;

    row.map(|row| -> Result<ContentHashKey> {
        let item_id: String = row.try_get("item_id")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(ContentHashKey {
            topic_id: row.try_get("topic_id")?,
            owner_collection: kind,
            content_hash: row.try_get("content_hash")?,
            item_id: parse_uuid(&item_id)?,
            created_at: parse_timestamp(&created_at)?,
        })
    })
    .transpose()
}

/// Number of keys held by one collection of a topic
pub async fn count_keys(pool: &SqlitePool, topic_id: &str, kind: ContentKind) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM content_hash_keys WHERE topic_id = ? AND owner_collection = ?",
    )
    .bind(topic_id)
    .bind(kind.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count)
}
