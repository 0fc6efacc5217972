//! Inference backend errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Backend request failed: {0}")]
    RequestFailed(String),
}
