//! Error types for the knowledge-base assistant.
//!
//! This module defines a unified error enum covering the store taxonomy
//! (not found, validation, conflict, upstream, internal) as well as the
//! ambient configuration, I/O and serialization failures.

use thiserror::Error;

/// Unified error type for the knowledge-base assistant.
///
/// All fallible functions return `Result<T, AppError>`. Collaborator errors
/// (SQLite, HTTP clients, timeouts) are mapped into one of these variants at
/// the boundary where they occur.
#[derive(Error, Debug)]
pub enum AppError {
    /// The requested entity id has no matching row
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input: bad cursor, missing field, out-of-range value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reserved for write conflicts
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Embedding provider or vector index call failed or timed out
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Relational store failure or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, AppError::UpstreamUnavailable(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(AppError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            AppError::UpstreamUnavailable("x".into()).code(),
            "UPSTREAM_UNAVAILABLE"
        );
        assert_eq!(AppError::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_display_includes_message() {
        let err = AppError::NotFound("Q&A pair 123".to_string());
        assert_eq!(err.to_string(), "Not found: Q&A pair 123");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }
}
