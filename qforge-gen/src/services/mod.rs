//! Generation pipeline services

pub mod batch_orchestrator;
pub mod candidate_validator;
pub mod content_hasher;
pub mod generator_client;
pub mod progress_reporter;
pub mod quality_auditor;
pub mod topic_controller;
pub mod topic_source;

pub use batch_orchestrator::{BatchOrchestrator, FillOutcome};
pub use candidate_validator::{validate, Verdict};
pub use content_hasher::{normalize, ContentHasher};
pub use generator_client::{
    CandidateGenerator, GeneratedBatch, GenerationRequest, GeneratorError, HttpCandidateGenerator,
    UnconfiguredGenerator,
};
pub use progress_reporter::ProgressReporter;
pub use quality_auditor::{grade_uniqueness, uniqueness_ratio, QualityAuditor, UniquenessGrade};
pub use topic_controller::{clear_topic, RunRequest, TopicClearReport, TopicGenerationController};
pub use topic_source::{upsert_topic, SqliteTopicSource, TopicSource};
