//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "QFORGE_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "qforge.db";

/// Logging section of a service TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (e.g. "info", "qforge_gen=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// External candidate generator endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratorEndpointConfig {
    /// Base URL of the generator service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token sent with every generator request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Per-service TOML configuration file
///
/// Every section is optional so a missing or partial file still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub generator: GeneratorEndpointConfig,

    /// Service-specific tuning table, parsed by the owning service
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub generation: toml::Table,
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(root_folder) = toml_config.and_then(|c| c.root_folder.clone()) {
        return root_folder;
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        // ~/Library/Application Support/qforge
        dirs::data_dir()
            .map(|d| d.join("qforge"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/qforge"))
    } else {
        // ~/.local/share/qforge, %LOCALAPPDATA%\qforge
        dirs::data_local_dir()
            .map(|d| d.join("qforge"))
            .unwrap_or_else(|| PathBuf::from("./qforge_data"))
    }
}

/// Default TOML path for a service: `<config_dir>/qforge/<service>.toml`
pub fn default_config_path(service_name: &str) -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("qforge").join(format!("{}.toml", service_name)))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load a TOML config file
///
/// A missing file yields the default config; a malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;

    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Resolves the root folder for one service
pub struct RootFolderResolver {
    service_name: String,
}

impl RootFolderResolver {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolve using CLI argument → env → TOML → default
    pub fn resolve(&self, cli_arg: Option<&str>, toml_config: Option<&TomlConfig>) -> PathBuf {
        let root = resolve_root_folder(cli_arg, ROOT_FOLDER_ENV, toml_config);
        tracing::debug!(
            service = %self.service_name,
            root_folder = %root.display(),
            "Resolved root folder"
        );
        root
    }
}

/// Prepares a resolved root folder for use
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!(root_folder = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    /// Path of the shared SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}
