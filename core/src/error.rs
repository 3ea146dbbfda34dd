//! Error types for STATESTASH

use thiserror::Error;

/// Main error type for STATESTASH
#[derive(Error, Debug)]
pub enum PersistError {
    // ============ Codec Errors ============
    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    // ============ Transform Errors ============
    #[error("Transform failed for key {key}: {reason}")]
    TransformFailed { key: String, reason: String },

    #[error("Checksum mismatch for key {key}: expected {expected}, got {got}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        got: String,
    },

    // ============ Storage Errors ============
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Write task for key {0} did not complete")]
    WriteAborted(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    // ============ General Errors ============
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PersistError {
    /// Build a transform failure for `key`
    pub fn transform(key: &str, reason: impl ToString) -> Self {
        PersistError::TransformFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            PersistError::DeserializationError(err.to_string())
        } else {
            PersistError::SerializationError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_syntax_error_maps_to_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PersistError = err.into();
        assert!(matches!(err, PersistError::DeserializationError(_)));
    }

    #[test]
    fn test_transform_error_message() {
        let err = PersistError::transform("session", "bad padding");
        assert_eq!(err.to_string(), "Transform failed for key session: bad padding");
    }
}
