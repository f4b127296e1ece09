//! Generated candidate items
//!
//! A candidate is whatever the external generator produced for one item. It is
//! a closed sum type so downstream code never inspects untyped fields; it is
//! never persisted directly (see `db::hash_keys::try_claim`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owning collection of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Multiple-choice exam questions
    Tests,
    /// Front/back study cards
    Flashcards,
}

impl ContentKind {
    /// Collection name used in hash keys and API paths
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Tests => "tests",
            ContentKind::Flashcards => "flashcards",
        }
    }

    /// Backing table for stored items of this kind
    pub(crate) fn table(&self) -> &'static str {
        match self {
            ContentKind::Tests => "test_items",
            ContentKind::Flashcards => "flashcard_items",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correct option of a test question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

impl AnswerLetter {
    /// Zero-based option index
    pub fn index(&self) -> usize {
        match self {
            AnswerLetter::A => 0,
            AnswerLetter::B => 1,
            AnswerLetter::C => 2,
            AnswerLetter::D => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
            AnswerLetter::D => "D",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "A" | "a" => Some(AnswerLetter::A),
            "B" | "b" => Some(AnswerLetter::B),
            "C" | "c" => Some(AnswerLetter::C),
            "D" | "d" => Some(AnswerLetter::D),
            _ => None,
        }
    }
}

/// Question difficulty, 1 (easy) through 3 (hard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    Easy = 1,
    Medium = 2,
    Hard = 3,
}

impl TryFrom<u8> for Difficulty {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Difficulty::Easy),
            2 => Ok(Difficulty::Medium),
            3 => Ok(Difficulty::Hard),
            other => Err(format!("difficulty must be 1, 2 or 3 (got {})", other)),
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value as u8
    }
}

/// Candidate multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCandidate {
    pub stem: String,
    /// Kept as a list so a wrong option count is a validation verdict
    pub options: Vec<String>,
    pub answer: AnswerLetter,
    pub rationale: String,
    #[serde(default)]
    pub section: String,
    pub difficulty: Difficulty,
}

/// Candidate flashcard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardCandidate {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One generated item, not yet validated or persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Candidate {
    Test(TestCandidate),
    Flashcard(FlashcardCandidate),
}

impl Candidate {
    /// Collection this candidate would be stored in
    pub fn content_kind(&self) -> ContentKind {
        match self {
            Candidate::Test(_) => ContentKind::Tests,
            Candidate::Flashcard(_) => ContentKind::Flashcards,
        }
    }

    /// Short human-readable label for logs and issue messages
    pub fn label(&self) -> String {
        let text = match self {
            Candidate::Test(t) => t.stem.as_str(),
            Candidate::Flashcard(f) => f.front.as_str(),
        };
        let mut label: String = text.chars().take(48).collect();
        if text.chars().count() > 48 {
            label.push('…');
        }
        label
    }
}
