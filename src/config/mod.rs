pub mod paths;
pub mod types;

pub use paths::{ConfigPathResolver, PathResolver};
pub use types::*;

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Download defaults
    #[serde(default)]
    pub stream: StreamConfig,
    /// Encode defaults
    #[serde(default)]
    pub encode: EncodeConfig,
    /// Queue limits
    #[serde(default)]
    pub queue: QueueConfig,
    /// Explicit executable paths, keyed by tool name
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load configuration from TOML file, or create default if not found
    pub fn load() -> Self {
        let config_path = Self::config_path();

        if config_path.exists() {
            match Self::load_from_file(&config_path) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config: {}. Using defaults.", e);
                    return Self::default();
                }
            }
        }

        info!("Could not read config file, creating new...");
        let config = Self::default();
        if let Err(e) = config.save_to(&config_path) {
            warn!("Failed to save default config: {}", e);
        }
        config
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("twitch-dl")
            .join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> AppResult<()> {
        if self.queue.max_downloads == 0 {
            return Err(AppError::Config(
                "queue.max_downloads must be at least 1".to_string(),
            ));
        }
        if self.queue.max_encodes == 0 {
            return Err(AppError::Config(
                "queue.max_encodes must be at least 1".to_string(),
            ));
        }
        if self.encode.plugin.trim().is_empty() {
            return Err(AppError::Config("encode.plugin must be set".to_string()));
        }
        if let Some(key) = self.encode.params.keys().find(|k| k.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "encode.params contains an empty key ({:?})",
                key
            )));
        }
        Ok(())
    }
}
