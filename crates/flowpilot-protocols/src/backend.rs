//! Model-inference backend capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// How a backend is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A daemon on this machine; there is no fallback if it is down.
    LocalDaemon,
    /// A hosted service.
    Remote,
}

/// Backend and model an orchestration request needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTarget {
    pub backend_id: String,
    pub model_id: String,
}

impl BackendTarget {
    pub fn new(backend_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// Readiness operations of an inference backend.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> BackendKind;

    async fn check_running(&self) -> Result<bool, BackendError>;

    /// Attempt to start the backend, returning success and a message.
    async fn start(&self) -> (bool, String);

    async fn warm_up_model(&self, model_id: &str) -> Result<(), BackendError>;

    async fn list_running_models(&self) -> Result<Vec<String>, BackendError>;
}
