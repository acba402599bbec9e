//! Plugin-wide settings loaded from TOML files.
//!
//! This module handles the configuration stored in TOML format in the XDG
//! config directory (`~/.config/cardview/config.toml`). The `[cards]` table
//! is kept as a raw [`SettingsLayer`] because it shares its keys with block
//! settings and takes part in the same cascade.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::block::SettingsLayer;

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# cardview configuration file
# Located at: ~/.config/cardview/config.toml
#
# The [cards] table holds plugin-wide defaults. Any key accepted in a block's
# settings section can be set here; blocks override these key by key.

[cards]
preset = "grid"
dynamicColumns = false
imageProperty = "cover"
showLabels = true
lazyLoad = false
dateFormat = "YYYY-MM-DD"
# mobilePreset = "compact"
# mobileImageHeight = 120
# mobileColumns = 1

[refresh]
debounce_ms = 1000

[logging]
level = "info"
debug = false
"#;

/// Settings loaded from the TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Plugin-wide card settings (second cascade layer)
    #[serde(default)]
    pub cards: SettingsLayer,

    /// Index-change refresh coalescing
    #[serde(default)]
    pub refresh: RefreshSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Refresh coalescing settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshSettings {
    /// Quiet window (ms) that index-change notifications must respect before
    /// a refresh fires
    #[serde(default = "default_refresh_debounce_ms")]
    pub debounce_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit render diagnostics for every block, regardless of block settings
    #[serde(default)]
    pub debug: bool,
}

fn default_refresh_debounce_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_refresh_debounce_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            debug: false,
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// `CARDVIEW_CONFIG_DIR` wins over the XDG config directory.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("CARDVIEW_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("cardview");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &PathBuf) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Save settings to the default configuration file path.
    pub fn save(&self) -> Result<(), SettingsError> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &PathBuf) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}
