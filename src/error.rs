//! Error handling for the telemetry core
//!
//! This module defines the crate-wide error type and a Result alias. Codec
//! specific failures live in [`crate::codec::DecodeError`] and
//! [`crate::codec::EncodeError`] and convert into [`TelemetryError`].

use crate::codec::{DecodeError, EncodeError};
use thiserror::Error;

/// Main error type for telemetry operations
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The UDP socket could not be bound to the requested port
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A datagram could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A record could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A consumer is already registered under this subsystem id
    #[error("Subsystem already registered: {0}")]
    DuplicateRegistration(String),

    /// Port outside the accepted range
    #[error("Invalid port {0}: must be between 1024 and 65535")]
    InvalidPort(u16),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TelemetryError>,
    },
}

impl TelemetryError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TelemetryError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

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
