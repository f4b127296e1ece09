//! Configuration loading and root folder resolution
//!
//! Tests touching QFORGE_ROOT_FOLDER are marked #[serial] so they never run
//! in parallel with each other.

use qforge_common::config::{
    default_root_folder, load_toml_config, resolve_root_folder, write_toml_config,
    GeneratorEndpointConfig, LoggingConfig, RootFolderInitializer, RootFolderResolver, TomlConfig,
    DATABASE_FILE_NAME, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-service").resolve(None, None);

    assert_eq!(root_folder, default_root_folder());
    assert!(root_folder.ends_with("qforge") || root_folder.ends_with("qforge_data"));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/qforge-env-root");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/qforge-toml-root")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(Some("/tmp/qforge-cli-root"), ROOT_FOLDER_ENV, Some(&toml));
    assert_eq!(root, PathBuf::from("/tmp/qforge-cli-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_wins_over_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/qforge-env-root");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/qforge-toml-root")),
        ..TomlConfig::default()
    };

    let root = RootFolderResolver::new("test-service").resolve(None, Some(&toml));
    assert_eq!(root, PathBuf::from("/tmp/qforge-env-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_blank_env_falls_through_to_toml() {
    env::set_var(ROOT_FOLDER_ENV, "  ");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/qforge-toml-root")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&toml));
    assert_eq!(root, PathBuf::from("/tmp/qforge-toml-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_missing_toml_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
fn test_write_then_load_keeps_every_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("qforge-gen.toml");

    let mut generation = toml::Table::new();
    generation.insert("batch_size_tests".to_string(), toml::Value::Integer(4));
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/qforge")),
        logging: LoggingConfig {
            level: "qforge_gen=debug".to_string(),
        },
        generator: GeneratorEndpointConfig {
            url: Some("http://127.0.0.1:9100".to_string()),
            api_key: Some("secret".to_string()),
        },
        generation,
    };

    write_toml_config(&config, &path).unwrap();
    assert!(!path.with_extension("toml.tmp").exists(), "temp file must be renamed away");

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_toml_defaults_other_sections() {
    let config: TomlConfig = toml::from_str(
        r#"
        [generator]
        url = "http://gen.local"
        "#,
    )
    .unwrap();

    assert_eq!(config.generator.url.as_deref(), Some("http://gen.local"));
    assert!(config.generator.api_key.is_none());
    assert!(config.root_folder.is_none());
    assert!(config.generation.is_empty());
}

#[test]
fn test_initializer_creates_root_folder() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("a").join("b");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join(DATABASE_FILE_NAME));
    assert_eq!(initializer.root_folder(), root.as_path());
}
