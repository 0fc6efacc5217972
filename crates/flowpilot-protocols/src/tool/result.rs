//! Tool execution result types.

use serde::{Deserialize, Serialize};

/// Timing information reported with a tool result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetrics {
    /// Wall-clock duration of the invocation in milliseconds.
    pub duration_ms: f64,

    /// Items handled by the tool, when it reports them.
    #[serde(default)]
    pub items_processed: u64,
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful.
    pub success: bool,

    /// Output payload.
    #[serde(default)]
    pub data: serde_json::Value,

    /// Error message if execution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution metrics.
    #[serde(default)]
    pub metrics: ToolMetrics,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metrics: ToolMetrics::default(),
        }
    }

    /// Create an error result.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            metrics: ToolMetrics::default(),
        }
    }

    /// Attach the measured duration.
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.metrics.duration_ms = duration_ms;
        self
    }
}
