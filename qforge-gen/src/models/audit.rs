//! Quality audit report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Corpus-level gate that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCheck {
    TestsCount,
    FlashcardsCount,
    TestsUniqueness,
    FlashcardsUniqueness,
    SectionDiversity,
}

/// One failed gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub check: AuditCheck,
    /// Critical findings make the controller retry the whole topic
    pub critical: bool,
    pub message: String,
}

/// Result of auditing a topic's stored corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub topic_id: String,
    /// True only when no finding was recorded
    pub passed: bool,
    /// True when at least one finding is critical
    pub critical: bool,
    pub issues: Vec<AuditFinding>,
    pub tests_count: i64,
    pub flashcards_count: i64,
    /// `None` when the topic has no tests
    pub tests_uniqueness: Option<f64>,
    /// `None` when the topic has no flashcards
    pub flashcards_uniqueness: Option<f64>,
    pub distinct_sections: usize,
    pub audited_at: DateTime<Utc>,
}

impl AuditReport {
    /// Report with the given counts and no findings yet
    pub fn new(topic_id: impl Into<String>, tests_count: i64, flashcards_count: i64) -> Self {
        Self {
            topic_id: topic_id.into(),
            passed: true,
            critical: false,
            issues: Vec::new(),
            tests_count,
            flashcards_count,
            tests_uniqueness: None,
            flashcards_uniqueness: None,
            distinct_sections: 0,
            audited_at: Utc::now(),
        }
    }

    pub fn record(&mut self, check: AuditCheck, critical: bool, message: impl Into<String>) {
        self.issues.push(AuditFinding {
            check,
            critical,
            message: message.into(),
        });
        self.passed = false;
        self.critical |= critical;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates_flags() {
        let mut report = AuditReport::new("t", 20, 20);
        assert!(report.passed);

        report.record(AuditCheck::SectionDiversity, false, "only 2 sections");
        assert!(!report.passed);
        assert!(!report.critical);

        report.record(AuditCheck::TestsCount, true, "12 of 20 tests");
        assert!(report.critical);
        assert_eq!(report.issues.len(), 2);
    }
}
