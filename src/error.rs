//! Error handling for the Outrig application
//!
//! This module defines custom error types and a Result alias for use
//! throughout the application.

use thiserror::Error;

/// Main error type for Outrig operations
#[derive(Error, Debug)]
pub enum OutrigError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to profile loading and validation
    #[error("Profile error: {0}")]
    Profile(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors related to process access
    #[error("Process error: {0}")]
    Process(String),

    /// Errors related to memory access
    #[error("Memory access error at address 0x{address:08X}: {message}")]
    MemoryAccess { address: u64, message: String },

    /// Errors related to transform expression compilation
    #[error("Expression error: {0}")]
    Expression(String),

    /// Errors related to output devices
    #[error("Device error: {0}")]
    Device(String),

    /// HTTP errors from LED controllers
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// USB HID errors from relay boards
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<OutrigError>,
    },
}

impl OutrigError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        OutrigError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for Outrig operations
pub type Result<T> = std::result::Result<T, OutrigError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
