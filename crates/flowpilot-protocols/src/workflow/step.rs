//! Workflow steps and per-step results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ConfigMap;

/// Default attempts for tool and process steps.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default per-attempt budget for tool and process steps.
pub const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 300;

/// Declared type of a step.
///
/// Parsing is case-insensitive; unrecognised names are kept verbatim so the
/// dispatcher can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Tool,
    Process,
    Decision,
    ParallelGateway,
    Unknown(String),
}

impl StepType {
    /// Whether the step invokes a tool.
    pub fn invokes_tool(&self) -> bool {
        matches!(self, Self::Tool | Self::Process)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tool => "tool",
            Self::Process => "process",
            Self::Decision => "decision",
            Self::ParallelGateway => "parallel-gateway",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for StepType {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "tool" => Self::Tool,
            "process" => Self::Process,
            "decision" => Self::Decision,
            "parallel-gateway" => Self::ParallelGateway,
            _ => Self::Unknown(value),
        }
    }
}

impl From<&str> for StepType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<StepType> for String {
    fn from(value: StepType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch targets of a decision step, keyed by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branches {
    #[serde(rename = "true", default)]
    pub on_true: Vec<String>,
    #[serde(rename = "false", default)]
    pub on_false: Vec<String>,
}

/// One node of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tool identifier for `tool` and `process` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Tool parameters; string values may be `{{name}}` references.
    #[serde(default)]
    pub configuration: ConfigMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Branches>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECONDS
}

impl WorkflowStep {
    /// Create a step of the given type with default retry and timeout.
    pub fn new(id: impl Into<String>, step_type: impl Into<StepType>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step_type: step_type.into(),
            description: None,
            tool: None,
            configuration: ConfigMap::new(),
            next: None,
            branches: None,
            condition: None,
            retry_count: DEFAULT_RETRY_COUNT,
            timeout_seconds: DEFAULT_STEP_TIMEOUT_SECONDS,
        }
    }

    /// A `tool` step invoking `tool`.
    pub fn tool(id: impl Into<String>, tool: impl Into<String>) -> Self {
        let mut step = Self::new(id, StepType::Tool);
        step.tool = Some(tool.into());
        step
    }

    /// A `decision` step evaluating `condition`.
    pub fn decision(
        id: impl Into<String>,
        condition: impl Into<String>,
        on_true: Vec<String>,
        on_false: Vec<String>,
    ) -> Self {
        let mut step = Self::new(id, StepType::Decision);
        step.condition = Some(condition.into());
        step.branches = Some(Branches { on_true, on_false });
        step
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }

    /// Attempts to make, never less than one.
    pub fn attempts(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// Every step id this step points at: `next` first, then true branches,
    /// then false branches.
    pub fn successors(&self) -> impl Iterator<Item = &str> {
        let branches = self.branches.as_ref();
        self.next
            .as_deref()
            .into_iter()
            .chain(branches.into_iter().flat_map(|b| b.on_true.iter().map(String::as_str)))
            .chain(branches.into_iter().flat_map(|b| b.on_false.iter().map(String::as_str)))
    }

    /// Display label used in messages: the name, or the id if unnamed.
    pub fn label(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// Trace entry for one dispatched step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub step_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: f64,
}

impl StepResult {
    /// Start a result for `step`; completion fields are filled by
    /// [`StepResult::succeed`] or [`StepResult::fail`].
    pub fn begin(step: &WorkflowStep) -> Self {
        let now = Utc::now();
        Self {
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            tool_id: step.tool.clone(),
            success: false,
            output: serde_json::Value::Null,
            error: None,
            started_at: now,
            completed_at: now,
            duration_ms: 0.0,
        }
    }

    pub fn succeed(mut self, output: serde_json::Value) -> Self {
        self.success = true;
        self.output = output;
        self.error = None;
        self.finish()
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.finish()
    }

    fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self.duration_ms = (self.completed_at - self.started_at)
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or_default();
        self
    }
}
