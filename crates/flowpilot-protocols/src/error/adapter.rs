//! Adapter errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter not found: {0}")]
    NotFound(String),

    #[error("Adapter '{adapter}' does not support {operation}")]
    Unsupported { adapter: String, operation: String },

    #[error("Invalid adapter configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Adapter operation failed: {0}")]
    OperationFailed(String),

    #[error("Adapter operation was cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
