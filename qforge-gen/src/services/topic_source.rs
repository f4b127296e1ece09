//! Topic content source
//!
//! The controller re-reads the topic through [`TopicSource`] at the start of
//! every attempt, so edits to the topic between attempts are picked up.

use async_trait::async_trait;
use qforge_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use crate::models::{ContentTier, TopicContent};

#[async_trait]
pub trait TopicSource: Send + Sync {
    /// `Ok(None)` when the topic doesn't exist
    async fn load_topic(&self, topic_id: &str) -> Result<Option<TopicContent>>;
}

/// Reads the `topics` table
#[derive(Clone)]
pub struct SqliteTopicSource {
    db: SqlitePool,
}

impl SqliteTopicSource {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TopicSource for SqliteTopicSource {
    async fn load_topic(&self, topic_id: &str) -> Result<Option<TopicContent>> {
        let row = sqlx::query("SELECT title, body, sections, tier FROM topics WHERE topic_id = ?")
            .bind(topic_id)
            .fetch_optional(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sections: String = row.try_get("sections")?;
        let tier: String = row.try_get("tier")?;

        Ok(Some(TopicContent {
            topic_id: topic_id.to_string(),
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            sections: serde_json::from_str(&sections)
                .map_err(|e| Error::Internal(format!("Bad sections for topic {}: {}", topic_id, e)))?,
            tier: ContentTier::parse(&tier)
                .ok_or_else(|| Error::Internal(format!("Bad tier '{}' for topic {}", tier, topic_id)))?,
        }))
    }
}

/// Insert or replace a topic row
pub async fn upsert_topic(pool: &SqlitePool, topic: &TopicContent) -> Result<()> {
    let sections = serde_json::to_string(&topic.sections)
        .map_err(|e| Error::Internal(format!("Failed to serialize sections: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO topics (topic_id, title, body, sections, tier)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(topic_id) DO UPDATE SET
            title = excluded.title,
            body = excluded.body,
            sections = excluded.sections,
            tier = excluded.tier,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&topic.topic_id)
    .bind(&topic.title)
    .bind(&topic.body)
    .bind(sections)
    .bind(topic.tier.as_str())
    .execute(pool)
    .await?;

    Ok(())
}
