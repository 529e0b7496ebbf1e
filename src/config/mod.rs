//! Configuration module for Outrig
//!
//! This module handles application configuration:
//! - The persistent config file (`outrig.toml`)
//! - Component settings sections (listener, detection, logging, dispatch)
//! - Platform data directory resolution
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.outrig.outrig/`
//! - **macOS**: `~/Library/Application Support/dev.outrig.outrig/`
//! - **Windows**: `%APPDATA%\dev.outrig.outrig\`
//!
//! # Files
//!
//! - `outrig.toml` - Application configuration
//! - `profiles/` - Game profile documents (read-only, user managed)
//! - `logs/` - Daily rolling log files when file logging is enabled
//!
//! # Example
//!
//! ```ignore
//! use outrig::config::AppConfig;
//!
//! // Load or create the config
//! let config = AppConfig::load_or_default();
//!
//! // Profiles live next to the config unless overridden
//! let profiles_dir = config.effective_profiles_dir();
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{OutrigError, Result};
use crate::types::DEFAULT_POLL_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.outrig.outrig";

/// Config filename
pub const CONFIG_FILE: &str = "outrig.toml";

/// Profiles directory name under the app data directory
pub const PROFILES_DIR: &str = "profiles";

/// Log directory name under the app data directory
pub const LOGS_DIR: &str = "logs";

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_metrics_interval_ms() -> u64 {
    500
}

// ==================== App Data Directory ====================

/// Get the application data directory
///
/// Returns None when the platform data directory cannot be determined.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|dir| dir.join(APP_ID))
}

/// Get the application data directory, creating it if needed
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir()
        .ok_or_else(|| OutrigError::Config("Could not determine app data directory".to_string()))?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| OutrigError::Config(format!("Failed to create app data directory: {}", e)))?;
    Ok(dir)
}

/// Default location of the config file
pub fn config_file_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

// ==================== Application Config ====================

/// Persistent application configuration
///
/// Loaded once at startup from `outrig.toml`. Every field carries a
/// serde default so an empty or partial file still produces a working
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Poll interval for memory sampling in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often poll metrics snapshots are emitted in milliseconds
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,

    /// Profiles directory override (None = profiles under app data)
    #[serde(default)]
    pub profiles_dir: Option<PathBuf>,

    /// Run against a simulated process instead of a live one
    #[serde(default)]
    pub demo: bool,

    /// Network listener section
    #[serde(default)]
    pub listener: ListenerSettings,

    /// Game detection section
    #[serde(default)]
    pub detection: DetectionSettings,

    /// Logging section
    #[serde(default)]
    pub log: LogSettings,

    /// Device dispatch section
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            metrics_interval_ms: default_metrics_interval_ms(),
            profiles_dir: None,
            demo: false,
            listener: ListenerSettings::default(),
            detection: DetectionSettings::default(),
            log: LogSettings::default(),
            dispatch: DispatchSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load the config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| OutrigError::Config(format!("Failed to read config {:?}: {}", path, e)))?;
        toml::from_str(&content)
            .map_err(|e| OutrigError::Config(format!("Failed to parse config {:?}: {}", path, e)))
    }

    /// Load the config from the default location, falling back to defaults
    ///
    /// A missing file is normal on first run. A file that exists but
    /// fails to parse is reported and the defaults are used, so a typo
    /// never prevents startup.
    pub fn load_or_default() -> Self {
        let Some(path) = config_file_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Save the config as pretty TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| OutrigError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OutrigError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| OutrigError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Metrics cadence as a [`Duration`]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms.max(1))
    }

    /// The directory profiles are loaded from
    ///
    /// The configured override wins; otherwise profiles live under the
    /// app data directory. Falls back to `./profiles` when no platform
    /// data directory exists.
    pub fn effective_profiles_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.profiles_dir {
            return dir.clone();
        }
        app_data_dir()
            .map(|dir| dir.join(PROFILES_DIR))
            .unwrap_or_else(|| PathBuf::from(PROFILES_DIR))
    }

    /// The directory log files are written to
    pub fn effective_log_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.log.dir {
            return dir.clone();
        }
        app_data_dir()
            .map(|dir| dir.join(LOGS_DIR))
            .unwrap_or_else(|| PathBuf::from(LOGS_DIR))
    }
}
