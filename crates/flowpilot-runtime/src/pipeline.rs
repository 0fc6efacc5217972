//! Orchestration pipeline template.
//!
//! Every orchestration runs through the same linear lifecycle:
//! `Pending → Validating → DependencyCheck → Executing → Succeeded | Failed | Cancelled`.
//! Validation failures skip execution entirely. Errors and panics raised by
//! the orchestration are folded into [`OrchestrationResult::error`]; metrics
//! are recorded once at start and once at completion whatever the outcome.

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowpilot_core::{ExecutionContext, ToolEvent};
use flowpilot_protocols::backend::BackendTarget;
use flowpilot_protocols::error::{ErrorKind, ExecutionError};
use flowpilot_protocols::metrics::{MetricsCollector, NoopMetrics};
use flowpilot_protocols::types::{LogLevel, Metadata};
use flowpilot_protocols::workflow::StepResult;

use crate::readiness::DependencyReadiness;

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Validating,
    DependencyCheck,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// One tool invocation observed during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub tool_id: String,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolUsage {
    /// Usage record for a completed tool event; `None` for start events.
    pub fn from_event(event: &ToolEvent) -> Option<Self> {
        match event {
            ToolEvent::Started { .. } => None,
            ToolEvent::Completed {
                tool_id,
                tool_name,
                success,
                duration,
                parameters,
                result,
                error,
                at,
            } => Some(Self {
                tool_id: tool_id.clone(),
                tool_name: tool_name.clone(),
                timestamp: *at,
                duration_ms: duration.as_secs_f64() * 1000.0,
                success: *success,
                parameters: parameters.clone(),
                result: result.clone(),
                error: error.clone(),
            }),
        }
    }
}

/// Timing split of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_duration_ms: f64,
    /// Sum of recorded tool-usage durations.
    pub tool_time_ms: f64,
    /// Total duration minus tool time.
    pub model_time_ms: f64,
    pub tool_calls: usize,
}

impl PerformanceMetrics {
    pub fn compute(total_duration_ms: f64, tool_usage: &[ToolUsage]) -> Self {
        let tool_time_ms: f64 = tool_usage.iter().map(|u| u.duration_ms).sum();
        Self {
            total_duration_ms,
            tool_time_ms,
            model_time_ms: (total_duration_ms - tool_time_ms).max(0.0),
            tool_calls: tool_usage.len(),
        }
    }
}

/// Structured error carried by a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationError {
    pub code: String,
    pub message: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl From<&ExecutionError> for OrchestrationError {
    fn from(error: &ExecutionError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.message(),
            kind: error.kind(),
            details: error.details(),
        }
    }
}

/// Coarse health of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of an orchestration health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub state: HealthState,
    pub message: String,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub details: Metadata,
}

impl HealthStatus {
    pub fn new(state: HealthState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            checked_at: Utc::now(),
            details: Metadata::new(),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthState::Healthy, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthState::Unhealthy, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }
}

/// What an orchestration supports, for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationCapabilities {
    pub supports_streaming: bool,
    pub supports_parallel_execution: bool,
    pub supports_cancel: bool,
    /// Zero means unbounded.
    pub max_concurrent_executions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub supported_tool_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub custom: Metadata,
}

impl Default for OrchestrationCapabilities {
    fn default() -> Self {
        Self {
            supports_streaming: false,
            supports_parallel_execution: false,
            supports_cancel: true,
            max_concurrent_executions: 0,
            default_timeout_seconds: None,
            supported_tool_categories: Vec::new(),
            custom: Metadata::new(),
        }
    }
}

/// Step results and tool usage an orchestration appends while it runs.
#[derive(Debug, Default)]
pub struct ExecutionTrace {
    pub step_results: Vec<StepResult>,
    pub tool_usage: Vec<ToolUsage>,
}

impl ExecutionTrace {
    pub fn add_step(&mut self, result: StepResult) {
        self.step_results.push(result);
    }

    pub fn add_tool_usage(&mut self, usage: ToolUsage) {
        self.tool_usage.push(usage);
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub execution_id: String,
    pub orchestration_id: String,
    pub success: bool,
    pub state: PipelineState,
    /// Every state the run passed through, in order.
    pub transitions: Vec<PipelineState>,
    #[serde(default)]
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OrchestrationError>,
    pub step_results: Vec<StepResult>,
    pub tool_usage: Vec<ToolUsage>,
    pub metrics: PerformanceMetrics,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Orchestration-specific logic plugged into the pipeline.
#[async_trait]
pub trait Orchestration: Send + Sync {
    type Request: Send + Sync;

    /// Identifier used for metrics and logs.
    fn id(&self) -> &str;

    /// Validation messages; an empty list means the request is valid.
    fn validate(&self, request: &Self::Request) -> Vec<String> {
        let _ = request;
        Vec::new()
    }

    /// Inference backend and model the request depends on, if any.
    fn backend_target(
        &self,
        request: &Self::Request,
        ctx: &ExecutionContext,
    ) -> Option<BackendTarget> {
        let _ = (request, ctx);
        None
    }

    fn capabilities(&self) -> OrchestrationCapabilities {
        OrchestrationCapabilities::default()
    }

    /// Health of the orchestration's own dependencies. Use
    /// [`ExecutionPipeline::health`] to have panics reported as unhealthy.
    async fn health(&self) -> HealthStatus {
        HealthStatus::healthy("Orchestration is healthy")
    }

    /// Core logic. Cancellation should be reported as `ExecutionError::Cancelled`.
    async fn execute(
        &self,
        request: &Self::Request,
        ctx: &ExecutionContext,
        trace: &mut ExecutionTrace,
        cancel: CancellationToken,
    ) -> Result<Value, ExecutionError>;
}

/// Runs orchestrations through validation, readiness, execution and recording.
pub struct ExecutionPipeline {
    readiness: Option<Arc<DependencyReadiness>>,
    metrics: Arc<dyn MetricsCollector>,
}

impl Default for ExecutionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionPipeline {
    pub fn new() -> Self {
        Self {
            readiness: None,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_readiness(mut self, readiness: Arc<DependencyReadiness>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run `orchestration` for `request`.
    pub async fn run<O>(
        &self,
        orchestration: &O,
        request: &O::Request,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> OrchestrationResult
    where
        O: Orchestration + ?Sized,
    {
        let orchestration_id = orchestration.id().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut transitions = vec![PipelineState::Pending];

        self.metrics
            .record_start(&orchestration_id, ctx.execution_id(), ctx.user_id())
            .await;
        ctx.add_breadcrumb(
            "Pipeline started",
            serde_json::json!({ "orchestration": orchestration_id }),
        );

        let observed = Arc::new(Mutex::new(Vec::<ToolUsage>::new()));
        let listener = {
            let observed = observed.clone();
            ctx.subscribe(Arc::new(move |event: &ToolEvent| {
                if let Some(usage) = ToolUsage::from_event(event) {
                    observed.lock().push(usage);
                }
            }))
        };

        let mut trace = ExecutionTrace::default();
        let outcome = self
            .drive(orchestration, request, ctx, cancel, &mut trace, &mut transitions)
            .await;
        ctx.unsubscribe(listener);

        let state = match &outcome {
            Ok(_) => PipelineState::Succeeded,
            Err(ExecutionError::Cancelled(_)) => PipelineState::Cancelled,
            Err(_) => PipelineState::Failed,
        };
        transitions.push(state);

        let mut tool_usage = trace.tool_usage;
        tool_usage.extend(observed.lock().drain(..));

        let elapsed = clock.elapsed();
        let metrics = PerformanceMetrics::compute(elapsed.as_secs_f64() * 1000.0, &tool_usage);
        let success = outcome.is_ok();

        let (output, error) = match outcome {
            Ok(output) => {
                info!(
                    orchestration = %orchestration_id,
                    execution_id = %ctx.execution_id(),
                    duration_ms = metrics.total_duration_ms,
                    "Orchestration succeeded"
                );
                (output, None)
            }
            Err(e) => {
                if state == PipelineState::Cancelled {
                    warn!(
                        orchestration = %orchestration_id,
                        execution_id = %ctx.execution_id(),
                        "Orchestration cancelled"
                    );
                } else {
                    error!(
                        orchestration = %orchestration_id,
                        execution_id = %ctx.execution_id(),
                        kind = %e.kind(),
                        error = %e.message(),
                        "Orchestration failed"
                    );
                }
                ctx.add_log(format!("{} ({})", e.message(), e.kind()), LogLevel::Error);
                (Value::Null, Some(OrchestrationError::from(&e)))
            }
        };

        let mut completion = Metadata::new();
        completion.insert("state".into(), serde_json::json!(state));
        completion.insert("tool_calls".into(), serde_json::json!(metrics.tool_calls));
        completion.insert("tool_time_ms".into(), serde_json::json!(metrics.tool_time_ms));
        completion.insert("model_time_ms".into(), serde_json::json!(metrics.model_time_ms));
        self.metrics
            .record_completion(&orchestration_id, ctx.execution_id(), success, elapsed, &completion)
            .await;
        ctx.add_breadcrumb("Pipeline completed", serde_json::json!({ "state": state }));

        OrchestrationResult {
            execution_id: ctx.execution_id().to_string(),
            orchestration_id,
            success,
            state,
            transitions,
            output,
            error,
            step_results: trace.step_results,
            tool_usage,
            metrics,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Health of `orchestration`; a panicking check reports unhealthy.
    pub async fn health<O>(&self, orchestration: &O) -> HealthStatus
    where
        O: Orchestration + ?Sized,
    {
        match AssertUnwindSafe(orchestration.health()).catch_unwind().await {
            Ok(status) => {
                debug!(
                    orchestration = %orchestration.id(),
                    state = ?status.state,
                    "Health checked"
                );
                status
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    orchestration = %orchestration.id(),
                    error = %message,
                    "Health check failed"
                );
                HealthStatus::unhealthy(format!("Health check failed: {}", message))
            }
        }
    }

    async fn drive<O>(
        &self,
        orchestration: &O,
        request: &O::Request,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
        trace: &mut ExecutionTrace,
        transitions: &mut Vec<PipelineState>,
    ) -> Result<Value, ExecutionError>
    where
        O: Orchestration + ?Sized,
    {
        transitions.push(PipelineState::Validating);
        let errors = orchestration.validate(request);
        if !errors.is_empty() {
            debug!(
                orchestration = %orchestration.id(),
                count = errors.len(),
                "Request failed validation"
            );
            return Err(ExecutionError::Validation(errors));
        }

        transitions.push(PipelineState::DependencyCheck);
        if let Some(target) = orchestration.backend_target(request, ctx) {
            match &self.readiness {
                Some(readiness) => readiness.ensure_ready(&target).await?,
                None => debug!(backend = %target.backend_id, "No readiness checker configured"),
            }
        }

        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled(
                "Orchestration was cancelled before execution".into(),
            ));
        }

        transitions.push(PipelineState::Executing);
        let execution = orchestration.execute(request, ctx, trace, cancel.clone());
        match AssertUnwindSafe(execution).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ExecutionError::Unknown(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Orchestration panicked".to_string()
    }
}
