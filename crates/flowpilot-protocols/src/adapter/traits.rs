//! Adapter trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AdapterDefinition, AdapterOutput};
use crate::error::AdapterError;
use crate::types::ConfigMap;

/// A pluggable input/output connector.
///
/// Adapters implement whichever of `read`/`write` their direction declares;
/// the defaults report the operation as unsupported.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns the adapter definition.
    fn definition(&self) -> &AdapterDefinition;

    /// Read data in.
    async fn read(
        &self,
        config: &ConfigMap,
        cancel: CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        let _ = (config, cancel);
        Err(AdapterError::Unsupported {
            adapter: self.definition().id.clone(),
            operation: "read".to_string(),
        })
    }

    /// Write data out.
    async fn write(
        &self,
        data: serde_json::Value,
        config: &ConfigMap,
        cancel: CancellationToken,
    ) -> Result<AdapterOutput, AdapterError> {
        let _ = (data, config, cancel);
        Err(AdapterError::Unsupported {
            adapter: self.definition().id.clone(),
            operation: "write".to_string(),
        })
    }

    /// Check a configuration without running the adapter.
    async fn validate_configuration(&self, config: &ConfigMap) -> Result<(), AdapterError> {
        let _ = config;
        Ok(())
    }
}
