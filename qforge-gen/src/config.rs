//! Configuration resolution for qforge-gen
//!
//! Generation parameters resolve per key: database `gen_<field>` → TOML
//! `[generation]` → compiled default. The generator endpoint resolves
//! database → environment → TOML.

use qforge_common::config::{GeneratorEndpointConfig, TomlConfig};
use qforge_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::settings;
use crate::models::GenerationConfig;
use crate::services::{CandidateGenerator, HttpCandidateGenerator, UnconfiguredGenerator};

/// Environment override for the generator base URL
pub const GENERATOR_URL_ENV: &str = "QFORGE_GENERATOR_URL";

/// Environment override for the generator API key
pub const GENERATOR_API_KEY_ENV: &str = "QFORGE_GENERATOR_API_KEY";

/// Settings key prefix for generation parameters
pub const GENERATION_SETTING_PREFIX: &str = "gen_";

/// Generator calls allowed per minute
pub const GENERATOR_REQUESTS_PER_MINUTE: u32 = 30;

/// Resolve [`GenerationConfig`] from database, TOML and defaults
pub async fn resolve_generation_config(db: &SqlitePool, toml_config: &TomlConfig) -> Result<GenerationConfig> {
    let mut table = toml_config.generation.clone();

    for field in GenerationConfig::FIELDS {
        let key = format!("{}{}", GENERATION_SETTING_PREFIX, field);
        if let Some(raw) = settings::get_raw_setting(db, &key).await? {
            if table.contains_key(field) {
                debug!(field, "Database setting overrides TOML value");
            }
            table.insert(field.to_string(), setting_value(&raw));
        }
    }

    let config: GenerationConfig = toml::Value::Table(table)
        .try_into()
        .map_err(|e| Error::Config(format!("Invalid generation parameters: {}", e)))?;

    config
        .validate()
        .map_err(|msg| Error::Config(format!("Invalid generation parameters: {}", msg)))?;

    info!(
        batch_size_tests = config.batch_size_tests,
        batch_size_flashcards = config.batch_size_flashcards,
        tests_per_topic = config.tests_per_topic,
        flashcards_per_topic = config.flashcards_per_topic,
        max_topic_retries = config.max_topic_retries,
        hash_algorithm = config.hash_algorithm.as_str(),
        "Generation parameters resolved"
    );

    Ok(config)
}

/// Settings rows are text; numbers are typed so serde sees what TOML would give
fn setting_value(raw: &str) -> toml::Value {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        toml::Value::Integer(int)
    } else if let Ok(float) = trimmed.parse::<f64>() {
        toml::Value::Float(float)
    } else {
        toml::Value::String(trimmed.to_string())
    }
}

/// Resolve the generator endpoint
///
/// **Priority:** Database → ENV → TOML, per field
pub async fn resolve_generator_endpoint(
    db: &SqlitePool,
    toml_config: &TomlConfig,
) -> Result<GeneratorEndpointConfig> {
    let url = pick(
        "generator URL",
        settings::get_generator_url(db).await?,
        std::env::var(GENERATOR_URL_ENV).ok(),
        toml_config.generator.url.clone(),
        false,
    );

    let api_key = pick(
        "generator API key",
        settings::get_generator_api_key(db).await?,
        std::env::var(GENERATOR_API_KEY_ENV).ok(),
        toml_config.generator.api_key.clone(),
        true,
    );

    Ok(GeneratorEndpointConfig { url, api_key })
}

fn pick(
    what: &str,
    db_value: Option<String>,
    env_value: Option<String>,
    toml_value: Option<String>,
    warn_on_multiple: bool,
) -> Option<String> {
    let candidates = [
        ("database", db_value),
        ("environment", env_value),
        ("TOML", toml_value),
    ];
    let present: Vec<(&str, String)> = candidates
        .into_iter()
        .filter_map(|(source, value)| value.filter(|v| is_valid_value(v)).map(|v| (source, v)))
        .collect();

    if warn_on_multiple && present.len() > 1 {
        let sources: Vec<&str> = present.iter().map(|(source, _)| *source).collect();
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            what,
            sources.join(", "),
            sources[0]
        );
    }

    present.into_iter().next().map(|(source, value)| {
        info!("{} loaded from {}", what, source);
        value.trim().to_string()
    })
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Generator for the resolved endpoint; without a URL every call fails
pub fn build_generator(
    endpoint: &GeneratorEndpointConfig,
    config: &GenerationConfig,
) -> Result<Arc<dyn CandidateGenerator>> {
    match &endpoint.url {
        Some(url) => {
            let generator = HttpCandidateGenerator::new(
                url.clone(),
                endpoint.api_key.clone(),
                Duration::from_millis(config.generator_timeout_ms),
                GENERATOR_REQUESTS_PER_MINUTE,
            )
            .map_err(|e| Error::Config(format!("Generator client: {}", e)))?;
            info!(endpoint = %generator.endpoint(), "Candidate generator configured");
            Ok(Arc::new(generator))
        }
        None => {
            warn!(
                "No generator URL configured (set {} or [generator] url); runs will record generator failures",
                GENERATOR_URL_ENV
            );
            Ok(Arc::new(UnconfiguredGenerator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::HashAlgorithm;
    use serial_test::serial;

    fn toml_with_generation(text: &str) -> TomlConfig {
        TomlConfig {
            generation: toml::from_str(text).unwrap(),
            ..TomlConfig::default()
        }
    }

    #[tokio::test]
    async fn test_defaults_without_sources() {
        let pool = memory_pool().await;
        let config = resolve_generation_config(&pool, &TomlConfig::default()).await.unwrap();
        assert_eq!(config, GenerationConfig::default());
    }

    #[tokio::test]
    async fn test_database_overrides_toml_per_key() {
        let pool = memory_pool().await;
        settings::set_setting(&pool, "gen_batch_size_tests", 7).await.unwrap();
        settings::set_setting(&pool, "gen_uniqueness_threshold", "0.9").await.unwrap();
        settings::set_setting(&pool, "gen_hash_algorithm", "rolling32").await.unwrap();

        let toml_config = toml_with_generation(
            r#"
            batch_size_tests = 3
            batch_size_flashcards = 2
            "#,
        );
        let config = resolve_generation_config(&pool, &toml_config).await.unwrap();

        assert_eq!(config.batch_size_tests, 7);
        assert_eq!(config.batch_size_flashcards, 2);
        assert_eq!(config.uniqueness_threshold, 0.9);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Rolling32);
        assert_eq!(config.tests_per_topic, 20);
    }

    #[tokio::test]
    async fn test_invalid_values_are_config_errors() {
        let pool = memory_pool().await;
        settings::set_setting(&pool, "gen_max_topic_retries", 0).await.unwrap();
        let result = resolve_generation_config(&pool, &TomlConfig::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));

        settings::set_setting(&pool, "gen_max_topic_retries", "many").await.unwrap();
        let result = resolve_generation_config(&pool, &TomlConfig::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_setting_value_typing() {
        assert_eq!(setting_value(" 12 "), toml::Value::Integer(12));
        assert_eq!(setting_value("0.5"), toml::Value::Float(0.5));
        assert_eq!(setting_value("sha256"), toml::Value::String("sha256".into()));
    }

    #[tokio::test]
    #[serial]
    async fn test_endpoint_priority() {
        let pool = memory_pool().await;
        std::env::remove_var(GENERATOR_URL_ENV);
        std::env::set_var(GENERATOR_API_KEY_ENV, "env-key");

        let toml_config = TomlConfig {
            generator: GeneratorEndpointConfig {
                url: Some("http://toml:9000".to_string()),
                api_key: Some("toml-key".to_string()),
            },
            ..TomlConfig::default()
        };

        let endpoint = resolve_generator_endpoint(&pool, &toml_config).await.unwrap();
        assert_eq!(endpoint.url.as_deref(), Some("http://toml:9000"));
        assert_eq!(endpoint.api_key.as_deref(), Some("env-key"));

        settings::set_generator_api_key(&pool, "db-key".to_string()).await.unwrap();
        let endpoint = resolve_generator_endpoint(&pool, &toml_config).await.unwrap();
        assert_eq!(endpoint.api_key.as_deref(), Some("db-key"));

        std::env::remove_var(GENERATOR_API_KEY_ENV);
    }

    #[tokio::test]
    #[serial]
    async fn test_blank_values_are_ignored() {
        let pool = memory_pool().await;
        std::env::set_var(GENERATOR_URL_ENV, "   ");
        std::env::remove_var(GENERATOR_API_KEY_ENV);

        let endpoint = resolve_generator_endpoint(&pool, &TomlConfig::default()).await.unwrap();
        assert_eq!(endpoint, GeneratorEndpointConfig::default());

        std::env::remove_var(GENERATOR_URL_ENV);
    }

    #[test]
    fn test_build_generator_without_url() {
        let generator = build_generator(&GeneratorEndpointConfig::default(), &GenerationConfig::default());
        assert!(generator.is_ok());
    }
}
