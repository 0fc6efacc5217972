//! Tool execution port backed by the tool registry.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use flowpilot_core::ToolRegistry;
use flowpilot_protocols::error::ToolError;
use flowpilot_protocols::tool::{ToolContext, ToolExecutor, ToolResult};
use flowpilot_protocols::types::ConfigMap;

/// Resolves tools by id in a [`ToolRegistry`] and invokes them.
///
/// Lookup and tool errors become failed results; a duration is attached when
/// the tool did not report one.
pub struct RegistryToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl RegistryToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ToolExecutor for RegistryToolExecutor {
    async fn execute(&self, tool_id: &str, params: ConfigMap, ctx: ToolContext) -> ToolResult {
        let Some(tool) = self.registry.get(tool_id) else {
            warn!(tool_id = %tool_id, "Tool not registered");
            return ToolResult::error(ToolError::NotFound(tool_id.to_string()).to_string());
        };
        if !tool.definition().enabled {
            return ToolResult::error(ToolError::Disabled(tool_id.to_string()).to_string());
        }
        if ctx.is_cancelled() {
            return ToolResult::error(ToolError::Cancelled.to_string());
        }

        let clock = Instant::now();
        let outcome = tool.execute(params, ctx).await;
        let elapsed_ms = clock.elapsed().as_secs_f64() * 1000.0;
        debug!(tool_id = %tool_id, duration_ms = elapsed_ms, "Tool returned");

        match outcome {
            Ok(result) if result.metrics.duration_ms > 0.0 => result,
            Ok(result) => result.with_duration_ms(elapsed_ms),
            Err(e) => ToolResult::error(e.to_string()).with_duration_ms(elapsed_ms),
        }
    }

    fn tool_name(&self, tool_id: &str) -> Option<String> {
        self.registry.get(tool_id).map(|t| t.definition().name.clone())
    }
}
