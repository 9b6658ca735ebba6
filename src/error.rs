//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Sqlizer.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `MalformedInput`: A connection URL matched none of the dialect grammars
//! - `TransportFailure`: The backend could not be reached
//! - `BackendError`: The backend answered with `ok: false` or a non-2xx status
//! - `StaleResponse`: A response arrived for a target that is no longer active
//! - `StorageCorruption`: Persisted state could not be decoded
//! - `InvalidInput`: Missing or contradictory arguments
//! - `NotReady`: Chat was requested before schema and model were ready
//! - `ConfigError`: Configuration file or directory problems
//!
//! None of these is fatal. Callers degrade to a safe default state and let the
//! user retry the connect flow.

use thiserror::Error;

/// Main error type for Sqlizer operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlizerError {
    /// Connection URL matched no known grammar
    #[error("Malformed connection string: {0}")]
    MalformedInput(String),

    /// Backend unreachable (connection refused, timeout, TLS failure)
    #[error("Backend unreachable: {0}")]
    TransportFailure(String),

    /// Structured failure reported by the backend
    #[error("{detail}")]
    BackendError { status: Option<u16>, detail: String },

    /// Response for an abandoned target, never shown to the user
    #[error("Discarded response for inactive target {0}")]
    StaleResponse(String),

    /// Persisted data could not be decoded
    #[error("Stored state is unreadable: {0}")]
    StorageCorruption(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Chat requested before the readiness pipeline finished
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Configuration error (unwritable directory, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlizerError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MALFORMED_INPUT",
            Self::TransportFailure(_) => "TRANSPORT_FAILURE",
            Self::BackendError { .. } => "BACKEND_ERROR",
            Self::StaleResponse(_) => "STALE_RESPONSE",
            Self::StorageCorruption(_) => "STORAGE_CORRUPTION",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotReady(_) => "NOT_READY",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message (no credentials)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the failure happened before any backend answered
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }

    /// Create a malformed input error
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    /// Create a transport failure error
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::TransportFailure(message.into())
    }

    /// Create a backend error, optionally tagged with the HTTP status
    pub fn backend_error(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::BackendError { status, detail: detail.into() }
    }

    /// Create a stale response error
    pub fn stale_response(identity: impl Into<String>) -> Self {
        Self::StaleResponse(identity.into())
    }

    /// Create a storage corruption error
    pub fn storage_corruption(message: impl Into<String>) -> Self {
        Self::StorageCorruption(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not-ready error
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for Sqlizer operations
pub type Result<T> = std::result::Result<T, SqlizerError>;
