//! Item store reads
//!
//! Items are only ever written by `hash_keys::try_claim` and deleted by
//! `hash_keys::clear_topic_content`; this module reads them back.

use qforge_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{AnswerLetter, ContentKind, Difficulty, StoredFlashcard, StoredTest};

/// `COUNT(*)` of one collection for a topic
pub async fn count_items(pool: &SqlitePool, topic_id: &str, kind: ContentKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE topic_id = ?", kind.table());
    let count: i64 = sqlx::query_scalar(&sql).bind(topic_id).fetch_one(pool).await?;
    Ok(count)
}

/// Ids of every item in one collection of a topic
pub async fn list_item_ids(pool: &SqlitePool, topic_id: &str, kind: ContentKind) -> Result<Vec<Uuid>> {
    let sql = format!(
        "SELECT item_id FROM {} WHERE topic_id = ? ORDER BY created_at",
        kind.table()
    );
    let ids: Vec<String> = sqlx::query_scalar(&sql).bind(topic_id).fetch_all(pool).await?;
    ids.iter().map(|id| parse_uuid(id)).collect()
}

pub async fn load_tests(pool: &SqlitePool, topic_id: &str) -> Result<Vec<StoredTest>> {
    let rows = sqlx::query(
        r#"
        SELECT item_id, topic_id, content_hash, stem, options, answer,
               rationale, section, difficulty, created_at
        FROM test_items
        WHERE topic_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(topic_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(test_from_row).collect()
}

pub async fn load_flashcards(pool: &SqlitePool, topic_id: &str) -> Result<Vec<StoredFlashcard>> {
    let rows = sqlx::query(
        r#"
        SELECT item_id, topic_id, content_hash, front, back, tags, created_at
        FROM flashcard_items
        WHERE topic_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(topic_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(flashcard_from_row).collect()
}

fn test_from_row(row: &SqliteRow) -> Result<StoredTest> {
    let item_id: String = row.try_get("item_id")?;
    let options: String = row.try_get("options")?;
    let answer: String = row.try_get("answer")?;
    let difficulty: i64 = row.try_get("difficulty")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StoredTest {
        item_id: parse_uuid(&item_id)?,
        topic_id: row.try_get("topic_id")?,
        content_hash: row.try_get("content_hash")?,
        stem: row.try_get("stem")?,
        options: from_json(&options)?,
        answer: AnswerLetter::parse(&answer)
            .ok_or_else(|| Error::Internal(format!("Bad answer letter '{}'", answer)))?,
        rationale: row.try_get("rationale")?,
        section: row.try_get("section")?,
        difficulty: u8::try_from(difficulty)
            .map_err(|e| e.to_string())
            .and_then(Difficulty::try_from)
            .map_err(Error::Internal)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn flashcard_from_row(row: &SqliteRow) -> Result<StoredFlashcard> {
    let item_id: String = row.try_get("item_id")?;
    let tags: String = row.try_get("tags")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StoredFlashcard {
        item_id: parse_uuid(&item_id)?,
        topic_id: row.try_get("topic_id")?,
        content_hash: row.try_get("content_hash")?,
        front: row.try_get("front")?,
        back: row.try_get("back")?,
        tags: from_json(&tags)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn from_json(value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse item field: {}", e)))
}
