//! JSON Output Envelopes
//!
//! Every CLI command prints exactly one envelope on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`

use serde::{Deserialize, Serialize};

use crate::error::SqlizerError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true
    pub ok: bool,

    /// Command that was executed
    pub command: String,

    /// Command-specific data
    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false
    pub ok: bool,

    /// Command that was attempted
    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }

    /// Envelope for a crate error, using its stable code
    pub fn from_error(command: impl Into<String>, err: &SqlizerError) -> Self {
        Self::new(command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. `MALFORMED_INPUT`, `BACKEND_ERROR`)
    pub code: String,

    /// Human-readable message; never contains a password
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Wall-clock time in milliseconds
    pub execution_ms: u64,

    /// Number of listed items, for list-shaped data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, items: None }
    }

    pub fn with_items(execution_ms: u64, items: usize) -> Self {
        Self { execution_ms, items: Some(items) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let envelope = SuccessEnvelope::new("recent", json!([1, 2]), Metadata::with_items(3, 2));
        insta::assert_json_snapshot!(envelope, @r###"
        {
          "ok": true,
          "command": "recent",
          "data": [
            1,
            2
          ],
          "meta": {
            "execution_ms": 3,
            "items": 2
          }
        }
        "###);
    }

    #[test]
    fn test_items_omitted_when_absent() {
        let json = serde_json::to_string(&Metadata::new(100)).unwrap();
        assert!(json.contains(r#""execution_ms":100"#));
        assert!(!json.contains("items"));
    }

    #[test]
    fn test_error_envelope_from_error() {
        let err = SqlizerError::backend_error(Some(400), "Could not connect: password authentication failed");
        let envelope = ErrorEnvelope::from_error("connect", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.command, "connect");
        assert_eq!(envelope.error.code, "BACKEND_ERROR");
        assert_eq!(envelope.error.message, "Could not connect: password authentication failed");
    }
}
