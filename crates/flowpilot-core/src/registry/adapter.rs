//! Adapter registry.

use std::sync::Arc;

use flowpilot_protocols::adapter::{Adapter, AdapterDefinition};
use flowpilot_protocols::error::RegistryError;

use super::base::{BaseRegistry, Registerable};
use super::init::OneTimeInit;

impl Registerable for dyn Adapter {
    fn registry_id(&self) -> &str {
        &self.definition().id
    }
}

/// Registry for input/output adapters.
pub struct AdapterRegistry {
    inner: BaseRegistry<dyn Adapter>,
    init: OneTimeInit,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            inner: BaseRegistry::new(),
            init: OneTimeInit::new(),
        }
    }

    /// Populate the registry once; later calls are no-ops.
    pub fn initialize_with(
        &self,
        populate: impl FnOnce(&Self) -> Result<(), RegistryError>,
    ) -> Result<bool, RegistryError> {
        self.init.call(|| populate(self))
    }

    pub fn register(&self, adapter: Arc<dyn Adapter>) -> Result<(), RegistryError> {
        self.inner.register(adapter)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Adapter>> {
        self.inner.get(id)
    }

    pub fn list_enabled(&self) -> Vec<AdapterDefinition> {
        self.inner
            .iter()
            .filter(|a| a.definition().enabled)
            .map(|a| a.definition().clone())
            .collect()
    }

    pub fn list_by_category(&self, category: &str) -> Vec<AdapterDefinition> {
        self.list_enabled()
            .into_iter()
            .filter(|d| d.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
