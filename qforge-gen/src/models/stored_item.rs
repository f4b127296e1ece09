//! Persisted items, hash keys and counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::{AnswerLetter, ContentKind, Difficulty};

/// Accepted multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTest {
    pub item_id: Uuid,
    pub topic_id: String,
    pub content_hash: String,
    pub stem: String,
    pub options: Vec<String>,
    pub answer: AnswerLetter,
    pub rationale: String,
    pub section: String,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

/// Accepted flashcard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFlashcard {
    pub item_id: Uuid,
    pub topic_id: String,
    pub content_hash: String,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Dedup index entry: `(topic_id, owner_collection, content_hash) → item_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashKey {
    pub topic_id: String,
    pub owner_collection: ContentKind,
    pub content_hash: String,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ContentHashKey {
    /// Composite primary key `topic_id:kind:content_hash`
    pub fn key(&self) -> String {
        compose_key(&self.topic_id, self.owner_collection, &self.content_hash)
    }
}

/// Build the composite hash key string
pub fn compose_key(topic_id: &str, kind: ContentKind, content_hash: &str) -> String {
    format!("{}:{}:{}", topic_id, kind.as_str(), content_hash)
}

/// Derived per-topic item counts
///
/// A materialized view of `COUNT(*)` over the item tables; recomputed once per
/// run attempt, never incremented in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicContentCounters {
    pub topic_id: String,
    pub tests_count: i64,
    pub flashcards_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl TopicContentCounters {
    pub fn count_for(&self, kind: ContentKind) -> i64 {
        match kind {
            ContentKind::Tests => self.tests_count,
            ContentKind::Flashcards => self.flashcards_count,
        }
    }
}
