use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode recording '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no recording stored under key '{key}'")]
    NotFound { key: String },

    #[error("invalid recording key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("storing '{key}' needs {needed} bytes but only {available} of {limit} remain")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
        limit: usize,
    },

    #[error("invalid recording file: {reason}")]
    ImportValidation { reason: String },
}

impl RecordingStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            key: key.into(),
            source,
        }
    }

    #[must_use]
    pub fn import(reason: impl Into<String>) -> Self {
        Self::ImportValidation {
            reason: reason.into(),
        }
    }

    /// Returns true for failures of the backing storage itself (as opposed to
    /// malformed input or unknown keys).
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::QuotaExceeded { .. })
    }
}

/// A persisted payload envelope that cannot be turned back into a wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadDecodeError {
    #[error("unknown payload type '{tag}'")]
    UnknownTag { tag: String },

    #[error("buffer payload must be an array of bytes")]
    NotAnArray,

    #[error("buffer payload element {index} is not an unsigned 8-bit integer")]
    InvalidByte { index: usize },

    #[error("string payload value must be a JSON string")]
    NotAString,
}
