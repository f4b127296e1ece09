//! Topic generation controller
//!
//! **State progression:**
//! PENDING → GENERATING_TESTS → GENERATING_FLASHCARDS → AUDITING → COMPLETED
//!
//! A critical audit sends the run back to GENERATING_TESTS, up to
//! `max_topic_retries` attempts in total. Exhausting the attempts still ends
//! in COMPLETED, with the final audit's findings recorded as issues. Only an
//! unloadable topic, unusable storage or cancellation end in the error status.

use chrono::Utc;
use qforge_common::events::{EventBus, KindCounts, QfEvent};
use qforge_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::batch_orchestrator::BatchOrchestrator;
use super::generator_client::CandidateGenerator;
use super::progress_reporter::ProgressReporter;
use super::quality_auditor::QualityAuditor;
use super::topic_source::TopicSource;
use crate::db::counters::recompute_counters;
use crate::db::hash_keys::{clear_topic_content, ClearReport};
use crate::db::items::count_items;
use crate::models::{
    ContentKind, GenerationConfig, GenerationIssue, GenerationMode, GenerationProgress,
    GenerationState, IssueKind, TopicContent,
};
use crate::utils::RetryPolicy;

/// Parameters of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub topic_id: String,
    pub mode: GenerationMode,
    /// Overrides `tests_per_topic` for this run
    #[serde(default)]
    pub tests_target: Option<usize>,
    /// Overrides `flashcards_per_topic` for this run
    #[serde(default)]
    pub flashcards_target: Option<usize>,
}

impl RunRequest {
    pub fn new(topic_id: impl Into<String>, mode: GenerationMode) -> Self {
        Self {
            topic_id: topic_id.into(),
            mode,
            tests_target: None,
            flashcards_target: None,
        }
    }
}

/// Both collections cleared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicClearReport {
    pub tests: ClearReport,
    pub flashcards: ClearReport,
}

impl TopicClearReport {
    pub fn failures(&self) -> usize {
        self.tests.failures.len() + self.flashcards.failures.len()
    }
}

/// Clear tests then flashcards of a topic
pub async fn clear_topic(db: &SqlitePool, event_bus: &EventBus, topic_id: &str) -> Result<TopicClearReport> {
    let tests = clear_topic_content(db, topic_id, ContentKind::Tests).await?;
    let flashcards = clear_topic_content(db, topic_id, ContentKind::Flashcards).await?;
    let report = TopicClearReport { tests, flashcards };

    event_bus.emit_lossy(QfEvent::TopicContentCleared {
        topic_id: topic_id.to_string(),
        tests_deleted: report.tests.deleted,
        flashcards_deleted: report.flashcards.deleted,
        failures: report.failures(),
        timestamp: Utc::now(),
    });

    Ok(report)
}

/// Why a run stopped before completing
enum Abort {
    Cancelled,
    Failed(String),
}

pub struct TopicGenerationController {
    db: SqlitePool,
    event_bus: EventBus,
    topic_source: Arc<dyn TopicSource>,
    orchestrator: BatchOrchestrator,
    auditor: QualityAuditor,
    reporter: ProgressReporter,
    config: GenerationConfig,
}

impl TopicGenerationController {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        generator: Arc<dyn CandidateGenerator>,
        topic_source: Arc<dyn TopicSource>,
        config: GenerationConfig,
    ) -> Self {
        let reporter = ProgressReporter::new(db.clone(), event_bus.clone());
        Self {
            orchestrator: BatchOrchestrator::new(db.clone(), generator, config.clone(), reporter.clone()),
            auditor: QualityAuditor::new(db.clone(), config.clone()),
            db,
            event_bus,
            topic_source,
            reporter,
            config,
        }
    }

    /// Run generation for one topic to completion
    pub async fn run(&self, request: &RunRequest, cancel: CancellationToken) -> GenerationProgress {
        let progress = GenerationProgress::new(&request.topic_id, request.mode);
        self.run_with_progress(progress, request, cancel).await
    }

    /// Same as [`run`](Self::run) with a caller-created progress record
    ///
    /// Lets the caller hand out `run_id` before the run starts.
    pub async fn run_with_progress(
        &self,
        mut progress: GenerationProgress,
        request: &RunRequest,
        cancel: CancellationToken,
    ) -> GenerationProgress {
        tracing::info!(
            run_id = %progress.run_id,
            topic_id = %request.topic_id,
            mode = request.mode.as_str(),
            "Starting topic generation"
        );

        self.reporter.emit(QfEvent::GenerationRunStarted {
            run_id: progress.run_id,
            topic_id: request.topic_id.clone(),
            mode: request.mode.as_str().to_string(),
            timestamp: Utc::now(),
        });
        self.reporter.publish(&progress).await;

        match self.execute(&mut progress, request, &cancel).await {
            Ok(()) => self.complete(&mut progress).await,
            Err(Abort::Cancelled) => self.fail(&mut progress, "cancelled".to_string()).await,
            Err(Abort::Failed(message)) => self.fail(&mut progress, message).await,
        }

        progress
    }

    async fn execute(
        &self,
        progress: &mut GenerationProgress,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Abort> {
        let policy = RetryPolicy::new(
            self.config.max_topic_retries,
            Duration::from_millis(self.config.topic_retry_delay_ms),
        );
        let tests_goal = request.tests_target.unwrap_or(self.config.tests_per_topic);
        let flashcards_goal = request.flashcards_target.unwrap_or(self.config.flashcards_per_topic);

        let mut attempt = 0;
        loop {
            attempt += 1;
            progress.attempt = attempt;

            let delay = policy.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            let topic = self.load_topic(&request.topic_id).await?;

            if request.mode == GenerationMode::Overwrite {
                self.clear_for_overwrite(progress).await?;
            }

            let (tests_target, flashcards_target) = if attempt > 1 && request.mode == GenerationMode::Add {
                (
                    self.shortfall(&topic, ContentKind::Tests, tests_goal).await?,
                    self.shortfall(&topic, ContentKind::Flashcards, flashcards_goal).await?,
                )
            } else {
                (tests_goal, flashcards_goal)
            };

            progress.tests = KindCounts { target: tests_target, ..Default::default() };
            progress.flashcards = KindCounts { target: flashcards_target, ..Default::default() };
            progress.push_log(format!(
                "Attempt {}: targets {} tests, {} flashcards",
                attempt, tests_target, flashcards_target
            ));

            progress.transition_to(GenerationState::GeneratingTests);
            self.reporter.publish(progress).await;
            let outcome = self
                .orchestrator
                .fill(&topic, ContentKind::Tests, tests_target, progress, cancel)
                .await;
            if outcome.cancelled {
                return Err(Abort::Cancelled);
            }

            progress.transition_to(GenerationState::GeneratingFlashcards);
            self.reporter.publish(progress).await;
            let outcome = self
                .orchestrator
                .fill(&topic, ContentKind::Flashcards, flashcards_target, progress, cancel)
                .await;
            if outcome.cancelled {
                return Err(Abort::Cancelled);
            }

            let counters = recompute_counters(&self.db, &topic.topic_id)
                .await
                .map_err(|e| Abort::Failed(format!("counters could not be recomputed: {}", e)))?;
            progress.counters = Some(counters);

            progress.transition_to(GenerationState::Auditing);
            self.reporter.publish(progress).await;
            let report = self
                .auditor
                .audit_against(&topic, tests_goal, flashcards_goal)
                .await
                .map_err(|e| Abort::Failed(format!("audit failed: {}", e)))?;

            let critical = report.critical;
            progress.push_log(format!(
                "Attempt {} audit: {} ({} issues)",
                attempt,
                if report.passed { "passed" } else if critical { "critical" } else { "issues" },
                report.issues.len()
            ));
            progress.audit = Some(report);

            if !critical {
                break;
            }
            if !policy.should_retry(attempt) {
                tracing::warn!(
                    run_id = %progress.run_id,
                    topic_id = %topic.topic_id,
                    attempts = attempt,
                    "Critical audit after final attempt, completing degraded"
                );
                break;
            }

            tracing::warn!(
                run_id = %progress.run_id,
                topic_id = %topic.topic_id,
                attempt,
                "Critical audit, retrying topic"
            );
        }

        if let Some(report) = &progress.audit {
            let findings: Vec<GenerationIssue> = report
                .issues
                .iter()
                .map(|f| GenerationIssue::new(IssueKind::QualityShortfall, None, f.message.clone()))
                .collect();
            for issue in findings {
                progress.add_issue(issue);
            }
        }

        Ok(())
    }

    async fn load_topic(&self, topic_id: &str) -> std::result::Result<TopicContent, Abort> {
        match self.topic_source.load_topic(topic_id).await {
            Ok(Some(topic)) => Ok(topic),
            Ok(None) => Err(Abort::Failed(format!("topic {} not found", topic_id))),
            Err(e) => Err(Abort::Failed(format!("topic {} could not be loaded: {}", topic_id, e))),
        }
    }

    async fn clear_for_overwrite(&self, progress: &mut GenerationProgress) -> std::result::Result<(), Abort> {
        let report = clear_topic(&self.db, &self.event_bus, &progress.topic_id)
            .await
            .map_err(|e| Abort::Failed(format!("clear failed: {}", e)))?;

        for failure in report.tests.failures.iter().chain(&report.flashcards.failures) {
            progress.add_issue(GenerationIssue::new(
                IssueKind::PersistenceFailure,
                None,
                format!("could not delete item {}: {}", failure.item_id, failure.message),
            ));
        }
        progress.push_log(format!(
            "Cleared {} tests, {} flashcards",
            report.tests.deleted, report.flashcards.deleted
        ));
        Ok(())
    }

    /// Items still missing against `goal`
    async fn shortfall(
        &self,
        topic: &TopicContent,
        kind: ContentKind,
        goal: usize,
    ) -> std::result::Result<usize, Abort> {
        let stored = count_items(&self.db, &topic.topic_id, kind)
            .await
            .map_err(|e| Abort::Failed(format!("count failed: {}", e)))?;
        Ok(goal.saturating_sub(stored.max(0) as usize))
    }

    async fn complete(&self, progress: &mut GenerationProgress) {
        progress.transition_to(GenerationState::Completed);
        self.reporter.publish(progress).await;

        let (tests_count, flashcards_count) = progress
            .counters
            .as_ref()
            .map(|c| (c.tests_count, c.flashcards_count))
            .unwrap_or_default();
        let audit_passed = progress.audit.as_ref().is_some_and(|a| a.passed);

        tracing::info!(
            run_id = %progress.run_id,
            topic_id = %progress.topic_id,
            tests = tests_count,
            flashcards = flashcards_count,
            audit_passed,
            attempts = progress.attempt,
            issues = progress.issues.len(),
            "Topic generation completed"
        );

        self.reporter.emit(QfEvent::GenerationRunCompleted {
            run_id: progress.run_id,
            topic_id: progress.topic_id.clone(),
            tests_count,
            flashcards_count,
            audit_passed,
            attempts: progress.attempt,
            duration_seconds: progress.elapsed_seconds(),
            timestamp: Utc::now(),
        });
    }

    async fn fail(&self, progress: &mut GenerationProgress, message: String) {
        tracing::error!(
            run_id = %progress.run_id,
            topic_id = %progress.topic_id,
            error = %message,
            "Topic generation failed"
        );
        progress.fail(message.clone());
        self.reporter.publish(progress).await;

        self.reporter.emit(QfEvent::GenerationRunFailed {
            run_id: progress.run_id,
            topic_id: progress.topic_id.clone(),
            error_message: message,
            timestamp: Utc::now(),
        });
    }
}
