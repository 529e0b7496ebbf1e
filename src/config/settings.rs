//! Component settings grouped by concern
//!
//! These structs make up the sections of the application config file.
//! Each carries serde defaults so a partially written config file still
//! loads, with the missing sections falling back to sensible values.
//!
//! # Main Types
//!
//! - [`ListenerSettings`] - Network listener for emulator output lines
//! - [`DetectionSettings`] - Game detection handshake tuning
//! - [`LogSettings`] - Log level and file logging destination
//! - [`DispatchSettings`] - Device I/O timeouts

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_listener_bind() -> String {
    "127.0.0.1:8100".to_string()
}

fn default_true() -> bool {
    true
}

fn default_detection_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info,outrig=debug".to_string()
}

fn default_http_timeout_ms() -> u64 {
    500
}

fn default_serial_timeout_ms() -> u64 {
    100
}

/// Network listener accepting emulator output lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Whether the listener is started at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind, host:port
    #[serde(default = "default_listener_bind")]
    pub bind: String,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_listener_bind(),
        }
    }
}

/// Game detection handshake tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// How long to wait for a game name after a start announcement
    #[serde(default = "default_detection_timeout_secs")]
    pub timeout_secs: u64,
}

impl DetectionSettings {
    /// The timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_detection_timeout_secs(),
        }
    }
}

/// Log level and file logging destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default log filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to also write logs to a daily rolling file
    #[serde(default = "default_true")]
    pub file_logging: bool,

    /// Log directory override (None = logs under the app data directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_logging: true,
            dir: None,
        }
    }
}

/// Device I/O timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Timeout for LED controller HTTP requests in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Timeout for serial port writes in milliseconds
    #[serde(default = "default_serial_timeout_ms")]
    pub serial_timeout_ms: u64,
}

impl DispatchSettings {
    /// HTTP timeout as a [`Duration`]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Serial write timeout as a [`Duration`]
    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_http_timeout_ms(),
            serial_timeout_ms: default_serial_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_defaults() {
        let settings = ListenerSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.bind, "127.0.0.1:8100");
    }

    #[test]
    fn test_detection_timeout_duration() {
        let settings = DetectionSettings { timeout_secs: 3 };
        assert_eq!(settings.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let settings: LogSettings = toml::from_str("level = \"debug\"").unwrap();
        assert_eq!(settings.level, "debug");
        assert!(settings.file_logging);
        assert!(settings.dir.is_none());
    }

    #[test]
    fn test_dispatch_timeouts() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.http_timeout(), Duration::from_millis(500));
        assert_eq!(settings.serial_timeout(), Duration::from_millis(100));
    }
}
