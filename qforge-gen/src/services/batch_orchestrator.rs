//! Batch orchestrator
//!
//! Fills one content kind of a topic up to a target:
//! 1. Planned batches of `batch_size` request `min(batch_size, target - requested)`
//! 2. Each candidate is validated, hashed and claimed
//! 3. One top-up batch of `topup_multiplier × shortfall` if still short
//!
//! Batches are strictly sequential. No candidate or batch failure aborts the
//! fill; failures become issues on the run.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::candidate_validator::{validate, Verdict};
use super::content_hasher::ContentHasher;
use super::generator_client::{CandidateGenerator, GeneratedBatch, GenerationRequest, GeneratorError};
use super::progress_reporter::ProgressReporter;
use crate::db::hash_keys::{try_claim, ClaimOutcome};
use crate::models::{
    ContentKind, GenerationConfig, GenerationIssue, GenerationProgress, IssueKind, TopicContent,
};
use crate::utils::RetryPolicy;

/// Result of one fill
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub kind: ContentKind,
    pub target: usize,
    pub created: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub issues: Vec<GenerationIssue>,
    /// Generator calls made, top-up included
    pub batches: usize,
    /// Stopped early at a batch boundary
    pub cancelled: bool,
}

impl FillOutcome {
    fn new(kind: ContentKind, target: usize) -> Self {
        Self {
            kind,
            target,
            created: 0,
            skipped: 0,
            invalid: 0,
            issues: Vec::new(),
            batches: 0,
            cancelled: false,
        }
    }

    pub fn shortfall(&self) -> usize {
        self.target.saturating_sub(self.created)
    }
}

pub struct BatchOrchestrator {
    db: SqlitePool,
    generator: Arc<dyn CandidateGenerator>,
    config: GenerationConfig,
    hasher: ContentHasher,
    reporter: ProgressReporter,
}

impl BatchOrchestrator {
    pub fn new(
        db: SqlitePool,
        generator: Arc<dyn CandidateGenerator>,
        config: GenerationConfig,
        reporter: ProgressReporter,
    ) -> Self {
        let hasher = ContentHasher::new(config.hash_algorithm);
        Self {
            db,
            generator,
            config,
            hasher,
            reporter,
        }
    }

    /// Generate until `target` new items of `kind` are stored or the top-up is spent
    ///
    /// Counts are added onto `progress.counts_mut(kind)`; the caller sets the
    /// target there. A snapshot is published after every batch.
    pub async fn fill(
        &self,
        topic: &TopicContent,
        kind: ContentKind,
        target: usize,
        progress: &mut GenerationProgress,
        cancel: &CancellationToken,
    ) -> FillOutcome {
        let mut outcome = FillOutcome::new(kind, target);
        let base = *progress.counts(kind);
        let batch_size = self.config.batch_size(kind).max(1);
        let delay = Duration::from_millis(self.config.inter_batch_delay_ms);

        tracing::info!(
            topic_id = %topic.topic_id,
            kind = %kind,
            target,
            batch_size,
            "Filling topic content"
        );

        let mut requested = 0;
        while requested < target {
            if outcome.batches > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let count = batch_size.min(target - requested);
            requested += count;
            self.run_batch(topic, kind, count, None, &mut outcome, progress).await;
            self.sync_counts(progress, base, &outcome);
            self.reporter.publish(progress).await;
        }

        if !outcome.cancelled && outcome.created < target {
            self.top_up(topic, kind, delay, base, &mut outcome, progress, cancel).await;
        }

        if !outcome.cancelled && outcome.created < target {
            let issue = GenerationIssue::new(
                IssueKind::QualityShortfall,
                Some(kind),
                format!(
                    "{} short: created {} of {} after top-up",
                    kind, outcome.created, target
                ),
            );
            tracing::warn!(topic_id = %topic.topic_id, kind = %kind, created = outcome.created, target, "Fill ended short");
            record(&mut outcome, progress, issue);
        }

        progress.push_log(format!(
            "{}: created {}, skipped {}, invalid {} (target {})",
            kind, outcome.created, outcome.skipped, outcome.invalid, target
        ));

        outcome
    }

    /// Single top-up batch, accepting only up to the target
    #[allow(clippy::too_many_arguments)]
    async fn top_up(
        &self,
        topic: &TopicContent,
        kind: ContentKind,
        delay: Duration,
        base: qforge_common::events::KindCounts,
        outcome: &mut FillOutcome,
        progress: &mut GenerationProgress,
        cancel: &CancellationToken,
    ) {
        let policy = RetryPolicy::once(delay);
        let mut attempts = 0;

        while policy.should_retry(attempts) && outcome.created < outcome.target {
            attempts += 1;
            if outcome.batches > 0 {
                policy.pause().await;
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return;
            }

            let shortfall = outcome.shortfall();
            let count = shortfall * self.config.topup_multiplier.max(1);
            tracing::debug!(topic_id = %topic.topic_id, kind = %kind, shortfall, count, "Top-up batch");
            progress.push_log(format!("{}: top-up requesting {} for shortfall {}", kind, count, shortfall));

            let cap = outcome.target;
            self.run_batch(topic, kind, count, Some(cap), outcome, progress).await;
            self.sync_counts(progress, base, outcome);
            self.reporter.publish(progress).await;
        }
    }

    /// One generator call plus validate/claim of its output
    async fn run_batch(
        &self,
        topic: &TopicContent,
        kind: ContentKind,
        count: usize,
        accept_cap: Option<usize>,
        outcome: &mut FillOutcome,
        progress: &mut GenerationProgress,
    ) {
        let batch_index = outcome.batches;
        outcome.batches += 1;

        let request = GenerationRequest {
            topic_id: topic.topic_id.clone(),
            topic_title: topic.title.clone(),
            topic_content: topic.body.clone(),
            section_hints: topic.sections.clone(),
            kind,
            count,
        };

        let batch = match self.call_generator(&request).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(
                    topic_id = %topic.topic_id,
                    kind = %kind,
                    batch = batch_index,
                    error = %e,
                    "Generator call failed, skipping batch"
                );
                let issue = GenerationIssue::new(IssueKind::GeneratorFailure, Some(kind), e.to_string())
                    .in_batch(batch_index);
                record(outcome, progress, issue);
                return;
            }
        };

        let GeneratedBatch {
            mut candidates,
            mut rejected,
        } = batch;
        if candidates.len() + rejected.len() > count {
            tracing::debug!(
                batch = batch_index,
                returned = candidates.len() + rejected.len(),
                requested = count,
                "Truncating generator output"
            );
        }
        candidates.truncate(count);
        rejected.truncate(count - candidates.len());

        for message in rejected {
            outcome.invalid += 1;
            let issue = GenerationIssue::new(
                IssueKind::ValidationFailure,
                Some(kind),
                format!("malformed candidate: {}", message),
            )
            .in_batch(batch_index);
            record(outcome, progress, issue);
        }

        for candidate in candidates {
            if accept_cap.is_some_and(|cap| outcome.created >= cap) {
                break;
            }

            if candidate.content_kind() != kind {
                outcome.invalid += 1;
                let issue = GenerationIssue::new(
                    IssueKind::ValidationFailure,
                    Some(kind),
                    format!("expected {} candidate, got {}", kind, candidate.content_kind()),
                )
                .in_batch(batch_index);
                record(outcome, progress, issue);
                continue;
            }

            if let Verdict::Invalid(reason) = validate(&candidate) {
                outcome.invalid += 1;
                let issue = GenerationIssue::new(
                    IssueKind::ValidationFailure,
                    Some(kind),
                    format!("\"{}\": {}", candidate.label(), reason),
                )
                .in_batch(batch_index);
                record(outcome, progress, issue);
                continue;
            }

            let content_hash = self.hasher.hash_candidate(&candidate);
            match try_claim(&self.db, &topic.topic_id, &content_hash, &candidate).await {
                Ok(ClaimOutcome::Claimed { .. }) => outcome.created += 1,
                Ok(ClaimOutcome::AlreadyExists { .. }) => outcome.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        topic_id = %topic.topic_id,
                        kind = %kind,
                        error = %e,
                        "Claim failed"
                    );
                    let issue = GenerationIssue::new(
                        IssueKind::PersistenceFailure,
                        Some(kind),
                        format!("\"{}\": {}", candidate.label(), e),
                    )
                    .in_batch(batch_index);
                    record(outcome, progress, issue);
                }
            }
        }

        tracing::debug!(
            topic_id = %topic.topic_id,
            kind = %kind,
            batch = batch_index,
            created = outcome.created,
            skipped = outcome.skipped,
            invalid = outcome.invalid,
            "Batch done"
        );
    }

    async fn call_generator(&self, request: &GenerationRequest) -> Result<GeneratedBatch, GeneratorError> {
        self.generator.wait_ready().await;

        let timeout_ms = self.config.generator_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(GeneratorError::Timeout(timeout_ms)),
        }
    }

    fn sync_counts(
        &self,
        progress: &mut GenerationProgress,
        base: qforge_common::events::KindCounts,
        outcome: &FillOutcome,
    ) {
        let counts = progress.counts_mut(outcome.kind);
        counts.created = base.created + outcome.created;
        counts.skipped = base.skipped + outcome.skipped;
        counts.invalid = base.invalid + outcome.invalid;
    }
}

fn record(outcome: &mut FillOutcome, progress: &mut GenerationProgress, issue: GenerationIssue) {
    progress.add_issue(issue.clone());
    outcome.issues.push(issue);
}
