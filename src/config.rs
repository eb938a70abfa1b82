//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use drawbridge_core::SessionSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Local storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the local storage file
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageConfig {
    /// Resolved path of the local storage file
    pub fn resolve_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("drawbridge")
                .join("local-storage.json"),
        }
    }
}

/// Session defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
    #[serde(default = "default_cache_namespace")]
    pub cache_namespace: String,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub dark_mode: bool,
}

fn default_autosave_interval_secs() -> u64 {
    SessionSettings::default().autosave_interval_secs
}

fn default_cache_namespace() -> String {
    SessionSettings::default().cache_namespace
}

fn default_height() -> u32 {
    600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave_interval_secs(),
            cache_namespace: default_cache_namespace(),
            height: default_height(),
            dark_mode: false,
        }
    }
}

impl SessionConfig {
    /// Settings handed to the host bridge
    pub fn settings(&self) -> SessionSettings {
        SessionSettings::default()
            .with_autosave_interval_secs(self.autosave_interval_secs)
            .with_cache_namespace(self.cache_namespace.clone())
    }
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        // prefix_separator("_") makes DRAWBRIDGE_SESSION__HEIGHT work with a single
        // underscore after the prefix.
        .add_source(
            Environment::with_prefix("DRAWBRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let app_config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    app_config
        .session
        .settings()
        .validate()
        .context("Invalid session configuration")?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.session.autosave_interval_secs, 10);
        assert_eq!(config.session.cache_namespace, "excalidraw");
        assert_eq!(config.session.height, 600);
        assert!(!config.session.dark_mode);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_storage_path_override() {
        let storage = StorageConfig {
            path: Some("/tmp/scenes.json".to_string()),
        };
        assert_eq!(storage.resolve_path(), PathBuf::from("/tmp/scenes.json"));

        let default = StorageConfig::default().resolve_path();
        assert!(default.ends_with("drawbridge/local-storage.json"));
    }

    #[test]
    fn test_session_settings_mapping() {
        let session = SessionConfig {
            autosave_interval_secs: 3,
            cache_namespace: "board".to_string(),
            ..SessionConfig::default()
        };
        let settings = session.settings();
        assert_eq!(settings.autosave_interval_secs, 3);
        assert_eq!(settings.cache_namespace, "board");
    }
}
