//! Data models for qforge-gen
//!
//! - Candidates as produced by the external generator
//! - Stored items, hash keys and counters
//! - Generation run state machine and issues
//! - Audit reports and tuning parameters

pub mod audit;
pub mod candidate;
pub mod generation_run;
pub mod parameters;
pub mod stored_item;
pub mod topic;

pub use audit::{AuditCheck, AuditFinding, AuditReport};
pub use candidate::{
    AnswerLetter, Candidate, ContentKind, Difficulty, FlashcardCandidate, TestCandidate,
};
pub use generation_run::{
    GenerationIssue, GenerationMode, GenerationProgress, GenerationState, IssueKind, RunStatus,
    StateTransition,
};
pub use parameters::{GenerationConfig, HashAlgorithm};
pub use stored_item::{
    compose_key, ContentHashKey, StoredFlashcard, StoredTest, TopicContentCounters,
};
pub use topic::{ContentTier, TopicContent};
