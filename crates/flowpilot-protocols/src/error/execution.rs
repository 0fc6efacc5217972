//! Execution error taxonomy shared by every component of the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    ExecutionError,
    TimeoutError,
    CancelledError,
    ConfigurationError,
    UnknownError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ValidationError => "ValidationError",
            Self::ExecutionError => "ExecutionError",
            Self::TimeoutError => "TimeoutError",
            Self::CancelledError => "CancelledError",
            Self::ConfigurationError => "ConfigurationError",
            Self::UnknownError => "UnknownError",
        };
        f.write_str(name)
    }
}

/// An expected failure flowing through a call boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Unknown(String),
}

impl ExecutionError {
    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a validation error with a single message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    /// The taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Execution(_) => ErrorKind::ExecutionError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
            Self::Cancelled(_) => ErrorKind::CancelledError,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::Unknown(_) => ErrorKind::UnknownError,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled(_) => "CANCELLED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// The message without the category prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(errors) => errors.join("; "),
            Self::Execution(m)
            | Self::Timeout(m)
            | Self::Cancelled(m)
            | Self::Configuration(m)
            | Self::Unknown(m) => m.clone(),
        }
    }

    /// Validation messages, empty for other kinds.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Validation(errors) => errors.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ExecutionError::validation("x").kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            ExecutionError::execution("x").kind(),
            ErrorKind::ExecutionError
        );
        assert_eq!(
            ExecutionError::Timeout("x".into()).kind(),
            ErrorKind::TimeoutError
        );
        assert_eq!(
            ExecutionError::Cancelled("x".into()).kind(),
            ErrorKind::CancelledError
        );
        assert_eq!(
            ExecutionError::configuration("x").kind(),
            ErrorKind::ConfigurationError
        );
        assert_eq!(
            ExecutionError::Unknown("x".into()).kind(),
            ErrorKind::UnknownError
        );
    }

    #[test]
    fn test_validation_display_joins_messages() {
        let err = ExecutionError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Validation failed: a; b");
        assert_eq!(err.details(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_message_strips_prefix() {
        let err = ExecutionError::execution("tool exploded");
        assert_eq!(err.message(), "tool exploded");
        assert!(err.to_string().starts_with("Execution failed"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ExecutionError::validation("x").code(),
            ExecutionError::execution("x").code(),
            ExecutionError::Timeout("x".into()).code(),
            ExecutionError::Cancelled("x".into()).code(),
            ExecutionError::configuration("x").code(),
            ExecutionError::Unknown("x".into()).code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::TimeoutError).unwrap();
        assert_eq!(json, "\"TimeoutError\"");
        assert_eq!(ErrorKind::CancelledError.to_string(), "CancelledError");
    }
}
