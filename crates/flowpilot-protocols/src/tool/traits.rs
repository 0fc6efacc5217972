//! Tool and tool-execution port traits.

use async_trait::async_trait;

use super::{ToolContext, ToolDefinition, ToolResult};
use crate::error::ToolError;
use crate::types::ConfigMap;

/// Core trait for tools.
///
/// Tools are executable units that workflow steps and agents invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: ConfigMap, ctx: ToolContext) -> Result<ToolResult, ToolError>;
}

/// Port through which the engine invokes tools by id.
///
/// Implementations never panic on unknown ids; they report a failed result
/// instead so callers can apply their retry policy uniformly.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Invoke `tool_id` with `params`. The invocation honours
    /// `ctx.cancellation` and `ctx.timeout`.
    async fn execute(&self, tool_id: &str, params: ConfigMap, ctx: ToolContext) -> ToolResult;

    /// Human-readable name of a tool, if known.
    fn tool_name(&self, tool_id: &str) -> Option<String> {
        let _ = tool_id;
        None
    }
}
