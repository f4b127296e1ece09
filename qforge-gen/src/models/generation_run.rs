//! Topic generation run state machine
//!
//! A run progresses PENDING → GENERATING_TESTS → GENERATING_FLASHCARDS →
//! AUDITING → COMPLETED, looping AUDITING → GENERATING_TESTS on a critical
//! audit until the attempt bound is reached.

use chrono::{DateTime, Utc};
use qforge_common::events::{KindCounts, QfEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::AuditReport;
use super::candidate::ContentKind;
use super::stored_item::TopicContentCounters;

/// Replace or append topic content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenerationMode {
    /// Clear existing tests and flashcards before generating
    Overwrite,
    /// Keep existing content; dedup keeps appends safe to repeat
    Add,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Overwrite => "OVERWRITE",
            GenerationMode::Add => "ADD",
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationState {
    Pending,
    GeneratingTests,
    GeneratingFlashcards,
    Auditing,
    Completed,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationState::Pending => "PENDING",
            GenerationState::GeneratingTests => "GENERATING_TESTS",
            GenerationState::GeneratingFlashcards => "GENERATING_FLASHCARDS",
            GenerationState::Auditing => "AUDITING",
            GenerationState::Completed => "COMPLETED",
        }
    }
}

/// Terminal/non-terminal status reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

/// Issue taxonomy
///
/// Duplicate content is not an issue: it is counted as `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    /// Structural defect in a candidate; candidate discarded
    ValidationFailure,
    /// Generator call failed or timed out; batch skipped
    GeneratorFailure,
    /// Storage write/claim failed for a non-duplicate reason
    PersistenceFailure,
    /// Post-hoc count/uniqueness/diversity shortfall
    QualityShortfall,
}

/// One recorded problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_kind: Option<ContentKind>,
    /// Zero-based batch index; `None` for run-level issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl GenerationIssue {
    pub fn new(kind: IssueKind, content_kind: Option<ContentKind>, message: impl Into<String>) -> Self {
        Self {
            kind,
            content_kind,
            batch: None,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Attach a batch index
    pub fn in_batch(mut self, batch: usize) -> Self {
        self.batch = Some(batch);
        self
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: GenerationState,
    pub new_state: GenerationState,
    pub transitioned_at: DateTime<Utc>,
}

/// Per-run progress (ephemeral; persisted only for observability)
///
/// Never a source of truth for item counts: those come from the item store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub run_id: Uuid,
    pub topic_id: String,
    pub mode: GenerationMode,
    pub state: GenerationState,
    pub status: RunStatus,
    /// 1-based attempt currently executing (0 before the first attempt)
    pub attempt: u32,
    pub tests: KindCounts,
    pub flashcards: KindCounts,
    pub issues: Vec<GenerationIssue>,
    /// Human-readable log lines
    pub log: Vec<String>,
    /// Counters recomputed at the end of the latest attempt
    #[serde(default)]
    pub counters: Option<TopicContentCounters>,
    /// Report of the latest audit
    #[serde(default)]
    pub audit: Option<AuditReport>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GenerationProgress {
    pub fn new(topic_id: impl Into<String>, mode: GenerationMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            topic_id: topic_id.into(),
            mode,
            state: GenerationState::Pending,
            status: RunStatus::Pending,
            attempt: 0,
            tests: KindCounts::default(),
            flashcards: KindCounts::default(),
            issues: Vec::new(),
            log: Vec::new(),
            counters: None,
            audit: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: GenerationState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state == GenerationState::Completed {
            self.status = RunStatus::Completed;
            self.ended_at = Some(Utc::now());
        } else if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
        }

        transition
    }

    /// End the run in the error status
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.push_log(format!("Run failed: {}", message));
        self.status = RunStatus::Error;
        self.ended_at = Some(Utc::now());
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    pub fn add_issue(&mut self, issue: GenerationIssue) {
        self.issues.push(issue);
    }

    pub fn counts(&self, kind: ContentKind) -> &KindCounts {
        match kind {
            ContentKind::Tests => &self.tests,
            ContentKind::Flashcards => &self.flashcards,
        }
    }

    pub fn counts_mut(&mut self, kind: ContentKind) -> &mut KindCounts {
        match kind {
            ContentKind::Tests => &mut self.tests,
            ContentKind::Flashcards => &mut self.flashcards,
        }
    }

    /// Issues of one kind
    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &GenerationIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    /// Snapshot for the event bus
    pub fn to_event(&self) -> QfEvent {
        QfEvent::GenerationProgressUpdate {
            run_id: self.run_id,
            topic_id: self.topic_id.clone(),
            state: self.state.as_str().to_string(),
            status: self.status.as_str().to_string(),
            attempt: self.attempt,
            tests: self.tests,
            flashcards: self.flashcards,
            issue_count: self.issues.len(),
            last_log: self.log.last().cloned(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_is_pending() {
        let progress = GenerationProgress::new("topic-1", GenerationMode::Add);
        assert_eq!(progress.state, GenerationState::Pending);
        assert_eq!(progress.status, RunStatus::Pending);
        assert_eq!(progress.attempt, 0);
        assert!(progress.ended_at.is_none());
    }

    #[test]
    fn test_transition_marks_running_then_completed() {
        let mut progress = GenerationProgress::new("topic-1", GenerationMode::Overwrite);

        let transition = progress.transition_to(GenerationState::GeneratingTests);
        assert_eq!(transition.old_state, GenerationState::Pending);
        assert_eq!(progress.status, RunStatus::Running);

        progress.transition_to(GenerationState::Completed);
        assert_eq!(progress.status, RunStatus::Completed);
        assert!(progress.status.is_terminal());
        assert!(progress.ended_at.is_some());
    }

    #[test]
    fn test_fail_sets_error_status() {
        let mut progress = GenerationProgress::new("topic-1", GenerationMode::Add);
        progress.fail("topic not found");
        assert_eq!(progress.status, RunStatus::Error);
        assert!(progress.log.last().unwrap().contains("topic not found"));
    }

    #[test]
    fn test_mode_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&GenerationMode::Overwrite).unwrap(), "\"OVERWRITE\"");
        assert_eq!(
            serde_json::to_string(&GenerationState::GeneratingFlashcards).unwrap(),
            "\"GENERATING_FLASHCARDS\""
        );
    }

    #[test]
    fn test_progress_event_snapshot() {
        let mut progress = GenerationProgress::new("topic-9", GenerationMode::Add);
        progress.tests.target = 20;
        progress.tests.created = 7;
        progress.push_log("batch 1 done");

        match progress.to_event() {
            QfEvent::GenerationProgressUpdate { tests, last_log, topic_id, .. } => {
                assert_eq!(tests.created, 7);
                assert_eq!(last_log.as_deref(), Some("batch 1 done"));
                assert_eq!(topic_id, "topic-9");
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }
}
