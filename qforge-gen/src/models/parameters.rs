//! Generation tuning parameters
//!
//! Every threshold and pacing constant of the pipeline lives here. Values are
//! resolved per key from the database `settings` table (`gen_<field>`), then
//! the TOML `[generation]` table, then the defaults below
//! (see `crate::config::resolve_generation_config`).

use serde::{Deserialize, Serialize};

/// Algorithm used to fingerprint normalized content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256, 64 lowercase hex chars
    #[default]
    Sha256,
    /// 32-bit polynomial rolling hash, 8 lowercase hex chars
    Rolling32,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Rolling32 => "rolling32",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sha256" => Some(HashAlgorithm::Sha256),
            "rolling32" => Some(HashAlgorithm::Rolling32),
            _ => None,
        }
    }
}

/// Generation pipeline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Tests requested per generator call (default: 10)
    #[serde(default = "default_batch_size_tests")]
    pub batch_size_tests: usize,

    /// Flashcards requested per generator call (default: 5)
    #[serde(default = "default_batch_size_flashcards")]
    pub batch_size_flashcards: usize,

    /// Pause between generator calls (default: 1500ms)
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    /// Uniqueness ratio below which the audit records an issue (default: 0.95)
    #[serde(default = "default_uniqueness_threshold")]
    pub uniqueness_threshold: f64,

    /// Uniqueness ratio below which the issue is critical (default: 0.80)
    #[serde(default = "default_critical_uniqueness_threshold")]
    pub critical_uniqueness_threshold: f64,

    /// Total attempts per topic, first included (default: 3)
    #[serde(default = "default_max_topic_retries")]
    pub max_topic_retries: u32,

    /// Pause before a whole-topic retry (default: 2000ms)
    #[serde(default = "default_topic_retry_delay_ms")]
    pub topic_retry_delay_ms: u64,

    /// Top-up batch requests this multiple of the shortfall (default: 2)
    #[serde(default = "default_topup_multiplier")]
    pub topup_multiplier: usize,

    /// Per generator call timeout (default: 90000ms)
    #[serde(default = "default_generator_timeout_ms")]
    pub generator_timeout_ms: u64,

    /// Tests target per topic (default: 20)
    #[serde(default = "default_tests_per_topic")]
    pub tests_per_topic: usize,

    /// Flashcards minimum per topic (default: 20)
    #[serde(default = "default_flashcards_per_topic")]
    pub flashcards_per_topic: usize,

    /// Flashcard shortfall is critical below this fraction of the target (default: 0.5)
    #[serde(default = "default_flashcard_critical_ratio")]
    pub flashcard_critical_ratio: f64,

    /// Distinct sections required once section diversity applies (default: 3)
    #[serde(default = "default_min_distinct_sections")]
    pub min_distinct_sections: usize,

    /// Tests count from which section diversity is checked (default: 10)
    #[serde(default = "default_section_diversity_min_tests")]
    pub section_diversity_min_tests: usize,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

fn default_batch_size_tests() -> usize {
    10
}

fn default_batch_size_flashcards() -> usize {
    5
}

fn default_inter_batch_delay_ms() -> u64 {
    1500
}

fn default_uniqueness_threshold() -> f64 {
    0.95
}

fn default_critical_uniqueness_threshold() -> f64 {
    0.80
}

fn default_max_topic_retries() -> u32 {
    3
}

fn default_topic_retry_delay_ms() -> u64 {
    2000
}

fn default_topup_multiplier() -> usize {
    2
}

fn default_generator_timeout_ms() -> u64 {
    90_000
}

fn default_tests_per_topic() -> usize {
    20
}

fn default_flashcards_per_topic() -> usize {
    20
}

fn default_flashcard_critical_ratio() -> f64 {
    0.5
}

fn default_min_distinct_sections() -> usize {
    3
}

fn default_section_diversity_min_tests() -> usize {
    10
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size_tests: default_batch_size_tests(),
            batch_size_flashcards: default_batch_size_flashcards(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            uniqueness_threshold: default_uniqueness_threshold(),
            critical_uniqueness_threshold: default_critical_uniqueness_threshold(),
            max_topic_retries: default_max_topic_retries(),
            topic_retry_delay_ms: default_topic_retry_delay_ms(),
            topup_multiplier: default_topup_multiplier(),
            generator_timeout_ms: default_generator_timeout_ms(),
            tests_per_topic: default_tests_per_topic(),
            flashcards_per_topic: default_flashcards_per_topic(),
            flashcard_critical_ratio: default_flashcard_critical_ratio(),
            min_distinct_sections: default_min_distinct_sections(),
            section_diversity_min_tests: default_section_diversity_min_tests(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

impl GenerationConfig {
    /// Names of every tunable field, as used for `gen_<field>` settings keys
    pub const FIELDS: [&'static str; 15] = [
        "batch_size_tests",
        "batch_size_flashcards",
        "inter_batch_delay_ms",
        "uniqueness_threshold",
        "critical_uniqueness_threshold",
        "max_topic_retries",
        "topic_retry_delay_ms",
        "topup_multiplier",
        "generator_timeout_ms",
        "tests_per_topic",
        "flashcards_per_topic",
        "flashcard_critical_ratio",
        "min_distinct_sections",
        "section_diversity_min_tests",
        "hash_algorithm",
    ];

    /// Batch size for a content kind
    pub fn batch_size(&self, kind: super::ContentKind) -> usize {
        match kind {
            super::ContentKind::Tests => self.batch_size_tests,
            super::ContentKind::Flashcards => self.batch_size_flashcards,
        }
    }

    /// Tier target for a content kind
    pub fn target_for(&self, kind: super::ContentKind) -> usize {
        match kind {
            super::ContentKind::Tests => self.tests_per_topic,
            super::ContentKind::Flashcards => self.flashcards_per_topic,
        }
    }

    /// Zero delays, for tests and scripted runs
    pub fn without_delays(mut self) -> Self {
        self.inter_batch_delay_ms = 0;
        self.topic_retry_delay_ms = 0;
        self
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size_tests == 0 || self.batch_size_flashcards == 0 {
            return Err("batch sizes must be at least 1".to_string());
        }
        if self.max_topic_retries == 0 {
            return Err("max_topic_retries must be at least 1".to_string());
        }
        if self.topup_multiplier == 0 {
            return Err("topup_multiplier must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.uniqueness_threshold)
            || !(0.0..=1.0).contains(&self.critical_uniqueness_threshold)
        {
            return Err("uniqueness thresholds must be within 0.0..=1.0".to_string());
        }
        if self.critical_uniqueness_threshold > self.uniqueness_threshold {
            return Err(
                "critical_uniqueness_threshold must not exceed uniqueness_threshold".to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.flashcard_critical_ratio) {
            return Err("flashcard_critical_ratio must be within 0.0..=1.0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.batch_size_tests, 10);
        assert_eq!(config.batch_size_flashcards, 5);
        assert_eq!(config.inter_batch_delay_ms, 1500);
        assert_eq!(config.max_topic_retries, 3);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GenerationConfig = toml::from_str(
            r#"
            batch_size_tests = 4
            hash_algorithm = "rolling32"
            "#,
        )
        .unwrap();

        assert_eq!(config.batch_size_tests, 4);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Rolling32);
        assert_eq!(config.tests_per_topic, 20);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let config = GenerationConfig {
            uniqueness_threshold: 0.7,
            critical_uniqueness_threshold: 0.8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
