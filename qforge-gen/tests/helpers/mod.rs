//! Test Helper Utilities
//!
//! Shared fixtures for qforge-gen integration tests: file-backed databases,
//! topics and a scripted candidate generator.

#![allow(dead_code)]

use async_trait::async_trait;
use qforge_gen::models::{
    AnswerLetter, Candidate, ContentKind, ContentTier, Difficulty, FlashcardCandidate,
    GenerationConfig, TestCandidate, TopicContent,
};
use qforge_gen::services::{
    upsert_topic, CandidateGenerator, GeneratedBatch, GenerationRequest, GeneratorError,
};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Create a temporary database with the full schema
///
/// The TempDir must be kept alive for the duration of the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_qforge.db");
    let pool = qforge_gen::db::init_database_pool(&db_path).await.unwrap();
    (temp_dir, pool)
}

/// Small targets and no pacing delays
pub fn fast_config() -> GenerationConfig {
    GenerationConfig {
        batch_size_tests: 4,
        batch_size_flashcards: 3,
        tests_per_topic: 8,
        flashcards_per_topic: 6,
        section_diversity_min_tests: 8,
        min_distinct_sections: 2,
        generator_timeout_ms: 2_000,
        ..GenerationConfig::default().without_delays()
    }
}

pub fn topic(topic_id: &str, tier: ContentTier) -> TopicContent {
    TopicContent {
        topic_id: topic_id.to_string(),
        title: format!("Topic {}", topic_id),
        body: "Cells divide by mitosis and meiosis.".to_string(),
        sections: vec!["Mitosis".to_string(), "Meiosis".to_string(), "Cell cycle".to_string()],
        tier,
    }
}

pub async fn seed_topic(pool: &SqlitePool, topic_id: &str, tier: ContentTier) -> TopicContent {
    let topic = topic(topic_id, tier);
    upsert_topic(pool, &topic).await.unwrap();
    topic
}

pub fn test_candidate(stem: &str, section: &str) -> Candidate {
    Candidate::Test(TestCandidate {
        stem: stem.to_string(),
        options: vec![
            "Prophase".to_string(),
            "Metaphase".to_string(),
            "Anaphase".to_string(),
            "Telophase".to_string(),
        ],
        answer: AnswerLetter::B,
        rationale: "Chromosomes align at the plate.".to_string(),
        section: section.to_string(),
        difficulty: Difficulty::Medium,
    })
}

pub fn numbered_test(i: usize) -> Candidate {
    let sections = ["Mitosis", "Meiosis", "Cell cycle"];
    test_candidate(
        &format!("Which phase comes first in scenario number {}?", i),
        sections[i % sections.len()],
    )
}

pub fn flashcard_candidate(front: &str, back: &str) -> Candidate {
    Candidate::Flashcard(FlashcardCandidate {
        front: front.to_string(),
        back: back.to_string(),
        tags: vec!["biology".to_string()],
    })
}

pub fn numbered_flashcard(i: usize) -> Candidate {
    flashcard_candidate(&format!("Term number {}", i), &format!("Definition number {}", i))
}

pub fn batch(candidates: Vec<Candidate>) -> GeneratedBatch {
    GeneratedBatch::from(candidates)
}

/// What the generator does once its script for a kind runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Fresh, valid, never-repeating candidates of the requested count
    Fresh,
    /// Empty batches
    Empty,
}

/// Generator replaying queued responses per kind
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<ContentKind, VecDeque<Result<GeneratedBatch, GeneratorError>>>>,
    fallback: Fallback,
    next_id: AtomicUsize,
    requests: Mutex<Vec<(ContentKind, usize)>>,
}

impl ScriptedGenerator {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            next_id: AtomicUsize::new(10_000),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fresh() -> Self {
        Self::new(Fallback::Fresh)
    }

    pub fn empty() -> Self {
        Self::new(Fallback::Empty)
    }

    /// Queue a response for the next call of `kind`
    pub fn push(&self, kind: ContentKind, response: Result<GeneratedBatch, GeneratorError>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(response);
        self
    }

    /// Requested counts of every call of `kind`, in order
    pub fn requests_for(&self, kind: ContentKind) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, count)| *count)
            .collect()
    }

    fn fresh_batch(&self, kind: ContentKind, count: usize) -> GeneratedBatch {
        let candidates = (0..count)
            .map(|_| {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                match kind {
                    ContentKind::Tests => numbered_test(id),
                    ContentKind::Flashcards => numbered_flashcard(id),
                }
            })
            .collect::<Vec<_>>();
        batch(candidates)
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedBatch, GeneratorError> {
        self.requests.lock().unwrap().push((request.kind, request.count));

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.kind)
            .and_then(|queue| queue.pop_front());

        match (scripted, self.fallback) {
            (Some(response), _) => response,
            (None, Fallback::Fresh) => Ok(self.fresh_batch(request.kind, request.count)),
            (None, Fallback::Empty) => Ok(GeneratedBatch::default()),
        }
    }
}
