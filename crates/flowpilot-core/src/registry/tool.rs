//! Tool registry for managing available tools.

use std::sync::Arc;

use flowpilot_protocols::error::RegistryError;
use flowpilot_protocols::tool::{Tool, ToolDefinition};

use super::base::{BaseRegistry, Registerable};
use super::init::OneTimeInit;

impl Registerable for dyn Tool {
    fn registry_id(&self) -> &str {
        &self.definition().id
    }
}

/// Registry for managing tools.
pub struct ToolRegistry {
    inner: BaseRegistry<dyn Tool>,
    init: OneTimeInit,
}

impl ToolRegistry {
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

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        self.inner.register(tool)
    }

    pub fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        self.inner.unregister(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.inner.get(id)
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.inner.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn list_enabled(&self) -> Vec<ToolDefinition> {
        self.inner
            .iter()
            .filter(|t| t.definition().enabled)
            .map(|t| t.definition().clone())
            .collect()
    }

    /// Enabled tools in `category`, compared case-insensitively.
    pub fn list_by_category(&self, category: &str) -> Vec<ToolDefinition> {
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

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
