//! Workflow executor: orders a step graph and drives the dispatcher over it.

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use flowpilot_core::ExecutionContext;
use flowpilot_protocols::audit::{
    AuditStatus, AuditStore, ExecutionAuditRecord, StatisticsStore, SubjectKind,
};
use flowpilot_protocols::error::{ErrorKind, ExecutionError, StoreError};
use flowpilot_protocols::events::{EventScope, EventSink, ExecutionEvent, NullEventSink};
use flowpilot_protocols::types::LogLevel;
use flowpilot_protocols::workflow::{StepResult, StepType, WorkflowDefinition};

use super::dispatch::StepDispatcher;
use super::order::build_execution_order;
use super::types::{ExecutionStatus, WorkflowRunRequest, WorkflowRunResult};

#[derive(Default)]
struct Progress {
    current_step: Option<String>,
    completed: usize,
    total: usize,
    message: Option<String>,
}

/// A run in flight, visible to `status` and `cancel`.
struct ActiveRun {
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    progress: Mutex<Progress>,
}

/// How the step loop ended.
enum Finish {
    Completed,
    Failed(ExecutionError),
    Cancelled,
}

/// Workflow executor that runs workflow steps in dependency order.
pub struct WorkflowExecutor {
    dispatcher: StepDispatcher,
    audit: Arc<dyn AuditStore>,
    statistics: Option<Arc<dyn StatisticsStore>>,
    events: Arc<dyn EventSink>,
    active: DashMap<String, Arc<ActiveRun>>,
}

impl WorkflowExecutor {
    pub fn new(dispatcher: StepDispatcher, audit: Arc<dyn AuditStore>) -> Self {
        Self {
            dispatcher,
            audit,
            statistics: None,
            events: Arc::new(NullEventSink),
            active: DashMap::new(),
        }
    }

    /// Record per-workflow rolling statistics after runs with a workflow id.
    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsStore>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn dispatcher(&self) -> &StepDispatcher {
        &self.dispatcher
    }

    /// Number of runs currently executing.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Run `definition` to completion, failure or cancellation.
    ///
    /// The execution id is the context's. Request parameters are copied into
    /// the context's variables before the first step.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        request: &WorkflowRunRequest,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> WorkflowRunResult {
        let execution_id = ctx.execution_id().to_string();
        let scope = EventScope {
            execution_id: execution_id.clone(),
            workflow_id: request.workflow_id.clone(),
            project_id: request.project_id.clone(),
        };
        for (key, value) in &request.input_parameters {
            ctx.set_variable(key.clone(), value.clone());
        }

        let run = Arc::new(ActiveRun {
            cancel: cancel.child_token(),
            started_at: ctx.started_at(),
            progress: Mutex::new(Progress::default()),
        });
        self.active.insert(execution_id.clone(), run.clone());

        info!(
            execution_id = %execution_id,
            workflow = %definition.name,
            "Starting workflow execution"
        );
        self.events.publish(ExecutionEvent::WorkflowStarted {
            scope: scope.clone(),
            workflow_name: definition.name.clone(),
            started_at: ctx.started_at(),
        });
        let started = format!("Workflow '{}' started", definition.name);
        self.log(ctx, &scope, &run, started, LogLevel::Info);

        let subject_id = request
            .workflow_id
            .clone()
            .unwrap_or_else(|| definition.name.clone());
        let mut record =
            ExecutionAuditRecord::running(&execution_id, &subject_id, SubjectKind::Workflow)
                .with_started_at(ctx.started_at())
            .with_initiator(request.initiated_by.clone());
        if let Err(e) = self.audit.create(&record).await {
            warn!(execution_id = %execution_id, error = %e, "Failed to create execution record");
        }

        let (step_results, finish) = self.run_steps(definition, ctx, &scope, &run).await;

        let completed_at = Utc::now();
        let duration_ms = duration_ms(ctx.started_at(), completed_at);
        let (status, message, errors, error_kind) = match &finish {
            Finish::Completed => (
                AuditStatus::Completed,
                "Workflow completed successfully".to_string(),
                Vec::new(),
                None,
            ),
            Finish::Failed(e) => (
                AuditStatus::Failed,
                format!("Workflow execution failed: {}", e.message()),
                vec![e.message()],
                Some(e.kind()),
            ),
            Finish::Cancelled => (
                AuditStatus::Cancelled,
                "Workflow execution was cancelled".to_string(),
                vec!["Workflow execution was cancelled".to_string()],
                Some(ErrorKind::CancelledError),
            ),
        };
        let success = status == AuditStatus::Completed;

        match &finish {
            Finish::Completed => {
                info!(execution_id = %execution_id, duration_ms, "Workflow completed");
                self.log(ctx, &scope, &run, "Workflow completed".to_string(), LogLevel::Info);
            }
            Finish::Failed(e) => {
                error!(execution_id = %execution_id, error = %e, "Workflow execution failed");
                self.log(ctx, &scope, &run, message.clone(), LogLevel::Error);
            }
            Finish::Cancelled => {
                warn!(execution_id = %execution_id, "Workflow execution cancelled");
                self.log(ctx, &scope, &run, message.clone(), LogLevel::Warning);
            }
        }

        let variables = ctx.variables();
        record.complete(status, errors.first().cloned(), completed_at);
        record.snapshot = serde_json::to_value(&variables).unwrap_or(Value::Null);
        record.log = ctx.transcript();
        if let Err(e) = self.audit.update(&record).await {
            warn!(execution_id = %execution_id, error = %e, "Failed to update execution record");
        }

        self.events.publish(match &finish {
            Finish::Completed => ExecutionEvent::WorkflowCompleted {
                scope: scope.clone(),
                duration_ms,
            },
            Finish::Failed(e) => ExecutionEvent::WorkflowFailed {
                scope: scope.clone(),
                error: e.message(),
            },
            Finish::Cancelled => ExecutionEvent::WorkflowCancelled {
                scope: scope.clone(),
            },
        });

        if let (Some(stats), Some(workflow_id)) = (&self.statistics, &request.workflow_id) {
            if let Err(e) = stats.record(workflow_id, success, duration_ms).await {
                warn!(
                    workflow_id = %workflow_id,
                    error = %e,
                    "Failed to update workflow statistics"
                );
            }
        }

        self.active.remove(&execution_id);

        WorkflowRunResult {
            execution_id,
            workflow_id: request.workflow_id.clone(),
            project_id: request.project_id.clone(),
            success,
            status,
            message,
            output_data: variables,
            step_results,
            errors,
            error_kind,
            started_at: ctx.started_at(),
            completed_at,
            duration_ms,
        }
    }

    async fn run_steps(
        &self,
        definition: &WorkflowDefinition,
        ctx: &ExecutionContext,
        scope: &EventScope,
        run: &ActiveRun,
    ) -> (Vec<StepResult>, Finish) {
        let order = build_execution_order(definition);
        run.progress.lock().total = order.len();

        let mut step_outputs: HashMap<String, Value> = HashMap::new();
        let mut results = Vec::with_capacity(order.len());

        for step_id in &order {
            if run.cancel.is_cancelled() || !ctx.should_continue() {
                return (results, Finish::Cancelled);
            }
            if ctx.is_timed_out() {
                return (
                    results,
                    Finish::Failed(ExecutionError::Timeout("Workflow execution timed out".into())),
                );
            }
            let Some(step) = definition.step(step_id) else {
                warn!(step_id = %step_id, "Step not found in workflow definition");
                continue;
            };

            run.progress.lock().current_step = Some(step.label().to_string());
            self.log(ctx, scope, run, format!("Starting step: {}", step.label()), LogLevel::Info);
            ctx.add_breadcrumb(
                step.label(),
                serde_json::json!({ "step_id": step.id, "type": step.step_type.as_str() }),
            );
            self.events.publish(ExecutionEvent::StepStarted {
                scope: scope.clone(),
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                tool_id: step.tool.clone(),
            });

            let result = self
                .dispatcher
                .dispatch(step, ctx, &step_outputs, &run.cancel)
                .await;

            step_outputs.insert(step.id.clone(), result.output.clone());
            run.progress.lock().completed += 1;
            self.events.publish(ExecutionEvent::StepCompleted {
                scope: scope.clone(),
                step_id: step.id.clone(),
                success: result.success,
                duration_ms: result.duration_ms,
            });

            let failure = (!result.success).then(|| result.error.clone().unwrap_or_default());
            results.push(result);

            if let Some(error) = failure {
                if step.step_type == StepType::Decision {
                    self.log(
                        ctx,
                        scope,
                        run,
                        format!("Decision '{}' failed: {}", step.label(), error),
                        LogLevel::Warning,
                    );
                    continue;
                }
                if run.cancel.is_cancelled() {
                    return (results, Finish::Cancelled);
                }
                return (
                    results,
                    Finish::Failed(ExecutionError::execution(format!(
                        "Step '{}' failed: {}",
                        step.label(),
                        error
                    ))),
                );
            }
        }

        (results, Finish::Completed)
    }

    /// Append to the run transcript and raise a `LogAppended` event.
    fn log(
        &self,
        ctx: &ExecutionContext,
        scope: &EventScope,
        run: &ActiveRun,
        message: String,
        level: LogLevel,
    ) {
        ctx.add_log(message.clone(), level);
        run.progress.lock().message = Some(message.clone());
        self.events.publish(ExecutionEvent::LogAppended {
            scope: scope.clone(),
            level,
            message,
        });
    }

    /// Progress of an active run, or the audit record of a finished one.
    pub async fn status(&self, execution_id: &str) -> Result<Option<ExecutionStatus>, StoreError> {
        if let Some(run) = self.active.get(execution_id).map(|r| r.value().clone()) {
            let progress = run.progress.lock();
            let percentage = if progress.total > 0 {
                progress.completed as f64 * 100.0 / progress.total as f64
            } else {
                0.0
            };
            return Ok(Some(ExecutionStatus {
                execution_id: execution_id.to_string(),
                status: AuditStatus::Running,
                current_step: progress.current_step.clone(),
                completed_steps: progress.completed,
                total_steps: progress.total,
                progress_percentage: percentage,
                started_at: run.started_at,
                completed_at: None,
                message: progress.message.clone(),
            }));
        }

        Ok(self
            .audit
            .get(execution_id)
            .await?
            .map(|record| ExecutionStatus::from_record(&record)))
    }

    /// Cancel an active run. Returns false when no such run is executing.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.active.get(execution_id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

fn duration_ms(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> f64 {
    (completed_at - started_at)
        .num_microseconds()
        .map(|us| us as f64 / 1000.0)
        .unwrap_or_default()
}
