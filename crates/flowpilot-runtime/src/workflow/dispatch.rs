//! Execution of a single workflow step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use flowpilot_core::placeholder::resolve_config;
use flowpilot_core::{
    Attempt, CancellationScope, ExecutionContext, Interrupt, RetryPolicy, ToolEvent,
};
use flowpilot_protocols::error::ExecutionError;
use flowpilot_protocols::tool::{ToolContext, ToolExecutor, ToolResult};
use flowpilot_protocols::types::{ConfigMap, LogLevel};
use flowpilot_protocols::workflow::{StepResult, StepType, WorkflowStep};

use super::condition::{ConditionOutcome, ConditionPolicy, evaluate_condition};

/// Runs one step according to its declared type.
pub struct StepDispatcher {
    tools: Arc<dyn ToolExecutor>,
    retry_base_delay: Duration,
    condition_policy: ConditionPolicy,
}

impl StepDispatcher {
    pub fn new(tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            tools,
            retry_base_delay: RetryPolicy::default().base_delay,
            condition_policy: ConditionPolicy::default(),
        }
    }

    /// Delay after the first failed tool attempt; doubles after each further one.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_condition_policy(mut self, policy: ConditionPolicy) -> Self {
        self.condition_policy = policy;
        self
    }

    pub fn condition_policy(&self) -> ConditionPolicy {
        self.condition_policy
    }

    /// Execute `step`.
    ///
    /// `step_outputs` holds the outputs of earlier steps for `{{stepId}}`
    /// resolution. The returned result is always populated; failures are
    /// reported through it rather than as errors.
    pub async fn dispatch(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
        step_outputs: &HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> StepResult {
        let result = StepResult::begin(step);
        match &step.step_type {
            StepType::Tool | StepType::Process => {
                match self.run_tool_step(step, ctx, step_outputs, cancel).await {
                    Ok(output) => result.succeed(output),
                    Err(error) => result.fail(error),
                }
            }
            StepType::Decision => match self.run_decision(step, ctx) {
                Ok(taken) => result.succeed(Value::Bool(taken)),
                Err(error) => result.fail(error.to_string()),
            },
            StepType::ParallelGateway => {
                warn!(
                    step_id = %step.id,
                    "Parallel execution is not supported, gateway is a no-op"
                );
                result.succeed(Value::Array(Vec::new()))
            }
            StepType::Unknown(name) => {
                warn!(step_id = %step.id, step_type = %name, "Unknown step type");
                result.fail(format!("Unknown step type: {}", name))
            }
        }
    }

    async fn run_tool_step(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
        step_outputs: &HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, String> {
        let Some(tool_id) = step.tool.as_deref().filter(|t| !t.is_empty()) else {
            return Err(format!("Tool step '{}' has no tool assigned", step.label()));
        };

        let params = resolve_config(&step.configuration, step_outputs, &ctx.variables());
        let timeout = (step.timeout_seconds > 0).then(|| Duration::from_secs(step.timeout_seconds));
        let policy = RetryPolicy::new(step.attempts(), self.retry_base_delay);
        let max = policy.attempts();

        let outcome = policy
            .run(cancel, |attempt| {
                let params = params.clone();
                async move {
                    ctx.add_log(
                        format!("Executing tool {} (attempt {}/{})", tool_id, attempt, max),
                        LogLevel::Debug,
                    );
                    match self.invoke(tool_id, params, ctx, cancel, timeout).await {
                        Ok(result) if result.success => Attempt::Succeeded(result.data),
                        Ok(result) => Attempt::Failed(
                            result
                                .error
                                .unwrap_or_else(|| format!("Tool '{}' failed", tool_id)),
                        ),
                        Err(Interrupt::TimedOut) => Attempt::Failed(format!(
                            "Tool '{}' timed out after {} seconds",
                            tool_id, step.timeout_seconds
                        )),
                        Err(Interrupt::Cancelled) => {
                            Attempt::Aborted(format!("Tool '{}' was cancelled", tool_id))
                        }
                    }
                }
            })
            .await;

        debug!(step_id = %step.id, attempts = outcome.attempts, "Tool step finished");
        outcome.result.map_err(|failure| failure.into_error())
    }

    /// One attempt: a fresh timeout scope around the tool call, with tool
    /// events raised on the context.
    async fn invoke(
        &self,
        tool_id: &str,
        params: ConfigMap,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ToolResult, Interrupt> {
        let tool_name = self.tools.tool_name(tool_id).unwrap_or_else(|| tool_id.to_string());
        let parameters = Value::Object(params.clone());
        let scope = CancellationScope::new(cancel, timeout);

        let mut tool_ctx = ToolContext::new(ctx.execution_id(), ctx.user_id())
            .with_session(ctx.session_id())
            .with_variables(ctx.variables())
            .with_cancellation(scope.token());
        if let Some(timeout) = timeout {
            tool_ctx = tool_ctx.with_timeout(timeout);
        }

        ctx.emit_tool_event(ToolEvent::Started {
            tool_id: tool_id.to_string(),
            tool_name: tool_name.clone(),
            parameters: parameters.clone(),
            at: Utc::now(),
        });

        let started = Instant::now();
        let outcome = scope.run(self.tools.execute(tool_id, params, tool_ctx)).await;

        let (success, result, error) = match &outcome {
            Ok(r) => (r.success, r.data.clone(), r.error.clone()),
            Err(interrupt) => (false, Value::Null, Some(interrupt.to_string())),
        };
        ctx.emit_tool_event(ToolEvent::Completed {
            tool_id: tool_id.to_string(),
            tool_name,
            success,
            duration: started.elapsed(),
            parameters,
            result,
            error,
            at: Utc::now(),
        });

        outcome
    }

    fn run_decision(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
    ) -> Result<bool, ExecutionError> {
        let condition = step.condition.as_deref().unwrap_or_default();
        match evaluate_condition(condition, &ctx.variables()) {
            ConditionOutcome::Literal(taken) => {
                ctx.add_log(
                    format!("Decision '{}' evaluated to {}", step.label(), taken),
                    LogLevel::Info,
                );
                Ok(taken)
            }
            ConditionOutcome::Unsupported(expr) => match self.condition_policy {
                ConditionPolicy::AssumeTrue => {
                    warn!(
                        step_id = %step.id,
                        condition = %expr,
                        "Condition is not a literal boolean, defaulting to true"
                    );
                    ctx.add_log(
                        format!(
                            "Decision '{}' could not evaluate '{}', defaulting to true",
                            step.label(),
                            expr
                        ),
                        LogLevel::Warning,
                    );
                    Ok(true)
                }
                ConditionPolicy::Reject => Err(ExecutionError::configuration(format!(
                    "Unsupported condition expression '{}' in step '{}'",
                    expr,
                    step.label()
                ))),
            },
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
