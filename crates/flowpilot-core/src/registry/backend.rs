//! Inference backend registry.

use std::sync::Arc;

use flowpilot_protocols::backend::InferenceBackend;
use flowpilot_protocols::error::RegistryError;

use super::base::{BaseRegistry, Registerable};

impl Registerable for dyn InferenceBackend {
    fn registry_id(&self) -> &str {
        self.id()
    }
}

/// Registry of inference backends by id.
#[derive(Default)]
pub struct BackendRegistry {
    inner: BaseRegistry<dyn InferenceBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, backend: Arc<dyn InferenceBackend>) -> Result<(), RegistryError> {
        self.inner.register(backend)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn InferenceBackend>> {
        self.inner.get(id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.inner.list_ids()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
