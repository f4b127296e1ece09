//! Corpus-level quality gates
//!
//! Runs over what is actually stored for a topic, not over run counters.
//! Checks, in order: tests count against the tier target, flashcards
//! minimum, per-kind uniqueness, section diversity.

use qforge_common::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;

use super::content_hasher::{canonical_flashcard, canonical_test};
use crate::db::items::{load_flashcards, load_tests};
use crate::models::{AuditCheck, AuditReport, ContentTier, GenerationConfig, TopicContent};

/// How a uniqueness ratio grades against the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniquenessGrade {
    Pass,
    Issue,
    Critical,
}

/// `distinct / total` over canonical forms; `None` for an empty corpus
pub fn uniqueness_ratio<I, S>(canonical_forms: I) -> Option<f64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut total = 0usize;
    let mut distinct = HashSet::new();
    for form in canonical_forms {
        total += 1;
        distinct.insert(form.as_ref().to_string());
    }

    if total == 0 {
        None
    } else {
        Some(distinct.len() as f64 / total as f64)
    }
}

/// Grade a ratio; a ratio equal to a threshold passes that threshold
pub fn grade_uniqueness(ratio: f64, threshold: f64, critical_threshold: f64) -> UniquenessGrade {
    if ratio < critical_threshold {
        UniquenessGrade::Critical
    } else if ratio < threshold {
        UniquenessGrade::Issue
    } else {
        UniquenessGrade::Pass
    }
}

pub struct QualityAuditor {
    db: SqlitePool,
    config: GenerationConfig,
}

impl QualityAuditor {
    pub fn new(db: SqlitePool, config: GenerationConfig) -> Self {
        Self { db, config }
    }

    /// Audit against the configured per-topic targets
    pub async fn audit(&self, topic: &TopicContent) -> Result<AuditReport> {
        self.audit_against(topic, self.config.tests_per_topic, self.config.flashcards_per_topic)
            .await
    }

    /// Audit against explicit count targets, e.g. a run's own goals
    pub async fn audit_against(
        &self,
        topic: &TopicContent,
        tests_target: usize,
        cards_target: usize,
    ) -> Result<AuditReport> {
        let tests = load_tests(&self.db, &topic.topic_id).await?;
        let flashcards = load_flashcards(&self.db, &topic.topic_id).await?;

        let mut report = AuditReport::new(&topic.topic_id, tests.len() as i64, flashcards.len() as i64);
        let config = &self.config;

        // (a) tests count against the tier target
        let tests_count = tests.len();
        match topic.tier {
            ContentTier::Core if tests_count < tests_target => report.record(
                AuditCheck::TestsCount,
                true,
                format!("{} of {} required tests", tests_count, tests_target),
            ),
            ContentTier::Core if tests_count > tests_target => report.record(
                AuditCheck::TestsCount,
                false,
                format!("{} tests exceed the target of {}", tests_count, tests_target),
            ),
            ContentTier::Supplementary if tests_count < tests_target => report.record(
                AuditCheck::TestsCount,
                false,
                format!("{} of at least {} tests", tests_count, tests_target),
            ),
            _ => {}
        }

        // (b) flashcards minimum
        let cards_count = flashcards.len();
        if cards_count < cards_target {
            let critical = (cards_count as f64) < cards_target as f64 * config.flashcard_critical_ratio;
            report.record(
                AuditCheck::FlashcardsCount,
                critical,
                format!("{} of at least {} flashcards", cards_count, cards_target),
            );
        }

        // (c) uniqueness per kind
        report.tests_uniqueness = uniqueness_ratio(tests.iter().map(|t| canonical_test(&t.stem)));
        report.flashcards_uniqueness =
            uniqueness_ratio(flashcards.iter().map(|c| canonical_flashcard(&c.front, &c.back)));

        for (check, label, ratio) in [
            (AuditCheck::TestsUniqueness, "tests", report.tests_uniqueness),
            (AuditCheck::FlashcardsUniqueness, "flashcards", report.flashcards_uniqueness),
        ] {
            let Some(ratio) = ratio else { continue };
            let grade = grade_uniqueness(
                ratio,
                config.uniqueness_threshold,
                config.critical_uniqueness_threshold,
            );
            if grade != UniquenessGrade::Pass {
                report.record(
                    check,
                    grade == UniquenessGrade::Critical,
                    format!(
                        "{} uniqueness {:.3} below {:.2}",
                        label, ratio, config.uniqueness_threshold
                    ),
                );
            }
        }

        // (d) section diversity
        let sections: HashSet<String> = tests
            .iter()
            .map(|t| t.section.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        report.distinct_sections = sections.len();
        if tests_count >= config.section_diversity_min_tests
            && sections.len() < config.min_distinct_sections
        {
            report.record(
                AuditCheck::SectionDiversity,
                false,
                format!(
                    "tests cover {} distinct sections, need {}",
                    sections.len(),
                    config.min_distinct_sections
                ),
            );
        }

        tracing::info!(
            topic_id = %topic.topic_id,
            passed = report.passed,
            critical = report.critical,
            issues = report.issues.len(),
            tests = report.tests_count,
            flashcards = report.flashcards_count,
            "Audit complete"
        );

        Ok(report)
    }
}
