// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the plclink binary.

use plclink_ua::UaError;
use thiserror::Error;

/// Result type alias for plclink-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the plclink binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Could not reach or keep the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// The binary was built without a protocol backend.
    #[error("No OPC UA backend compiled in; rebuild with `--features opcua`")]
    UnsupportedBackend,

    /// Config loading error.
    #[error("Config error: {0}")]
    Config(#[from] plclink_config::ConfigError),

    /// Connection manager error.
    #[error("{0}")]
    Ua(#[from] UaError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Creates an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Connection(_) => 2,
            Self::Runtime(_) => 3,
            Self::Io(_) => 4,
            Self::UnsupportedBackend => 5,
            Self::Ua(e) => match e {
                UaError::Config(_) => 1,
                UaError::Connection(_) | UaError::Session(_) => 2,
                UaError::State(_) => 3,
                UaError::Resource(_) | UaError::Operation(_) => 6,
            },
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(format!("{err:#}"))
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with appropriate formatting.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }

    if let BinError::Ua(ua) = error {
        for hint in ua.recovery_hints() {
            eprintln!("  Hint: {}", hint);
        }
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BinError::config("no endpoint");
        assert_eq!(err.to_string(), "Configuration error: no endpoint");
    }

    #[test]
    fn test_error_with_context() {
        let err = BinError::connection("refused").with_context("status");
        assert_eq!(err.to_string(), "status: Connection error: refused");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("test").exit_code(), 1);
        assert_eq!(BinError::connection("test").exit_code(), 2);
        assert_eq!(BinError::runtime("test").exit_code(), 3);
        assert_eq!(BinError::io("test").exit_code(), 4);
        assert_eq!(BinError::UnsupportedBackend.exit_code(), 5);
        assert_eq!(BinError::from(UaError::not_connected()).exit_code(), 3);
        assert_eq!(
            BinError::from(UaError::subscription_not_found("sub-1")).exit_code(),
            6
        );
    }

    #[test]
    fn test_from_anyhow() {
        let err: BinError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "Runtime error: outer: inner");
    }
}
