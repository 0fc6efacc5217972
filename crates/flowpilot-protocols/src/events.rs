//! Lifecycle events raised by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LogLevel;

/// Grouping keys carried by every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScope {
    pub execution_id: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// A discrete lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkflowStarted {
        scope: EventScope,
        workflow_name: String,
        started_at: DateTime<Utc>,
    },
    StepStarted {
        scope: EventScope,
        step_id: String,
        step_name: String,
        tool_id: Option<String>,
    },
    StepCompleted {
        scope: EventScope,
        step_id: String,
        success: bool,
        duration_ms: f64,
    },
    WorkflowCompleted {
        scope: EventScope,
        duration_ms: f64,
    },
    WorkflowFailed {
        scope: EventScope,
        error: String,
    },
    WorkflowCancelled {
        scope: EventScope,
    },
    LogAppended {
        scope: EventScope,
        level: LogLevel,
        message: String,
    },
}

impl ExecutionEvent {
    pub fn scope(&self) -> &EventScope {
        match self {
            Self::WorkflowStarted { scope, .. }
            | Self::StepStarted { scope, .. }
            | Self::StepCompleted { scope, .. }
            | Self::WorkflowCompleted { scope, .. }
            | Self::WorkflowFailed { scope, .. }
            | Self::WorkflowCancelled { scope }
            | Self::LogAppended { scope, .. } => scope,
        }
    }
}

/// Fire-and-forget delivery of lifecycle events.
///
/// Implementations must not block and must swallow their own delivery
/// failures.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ExecutionEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: ExecutionEvent) {}
}
