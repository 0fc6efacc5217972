//! Workflow execution as a pipeline orchestration.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use flowpilot_core::ExecutionContext;
use flowpilot_protocols::audit::AuditStatus;
use flowpilot_protocols::backend::BackendTarget;
use flowpilot_protocols::error::{ErrorKind, ExecutionError};
use flowpilot_protocols::workflow::WorkflowDefinition;

use crate::pipeline::{ExecutionTrace, HealthStatus, Orchestration, OrchestrationCapabilities};
use crate::workflow::{WorkflowExecutor, WorkflowRunRequest};

/// A definition to run, the run parameters and the model backend it needs.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub definition: WorkflowDefinition,
    pub run: WorkflowRunRequest,
    pub backend: Option<BackendTarget>,
}

impl WorkflowRequest {
    pub fn new(definition: WorkflowDefinition, run: WorkflowRunRequest) -> Self {
        Self {
            definition,
            run,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: BackendTarget) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Runs workflows through the [`WorkflowExecutor`].
pub struct WorkflowOrchestration {
    executor: Arc<WorkflowExecutor>,
}

impl WorkflowOrchestration {
    pub fn new(executor: Arc<WorkflowExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<WorkflowExecutor> {
        &self.executor
    }
}

#[async_trait]
impl Orchestration for WorkflowOrchestration {
    type Request = WorkflowRequest;

    fn id(&self) -> &str {
        "workflow"
    }

    fn validate(&self, request: &WorkflowRequest) -> Vec<String> {
        request.definition.validate().errors
    }

    fn backend_target(
        &self,
        request: &WorkflowRequest,
        _ctx: &ExecutionContext,
    ) -> Option<BackendTarget> {
        request.backend.clone()
    }

    fn capabilities(&self) -> OrchestrationCapabilities {
        let mut capabilities = OrchestrationCapabilities::default();
        capabilities.custom.insert(
            "stepTypes".into(),
            json!(["tool", "process", "decision", "parallel-gateway"]),
        );
        capabilities.custom.insert(
            "conditionPolicy".into(),
            json!(self.executor.dispatcher().condition_policy()),
        );
        capabilities
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::healthy("Workflow executor is accepting runs")
            .with_detail("activeExecutions", json!(self.executor.active_count()))
    }

    async fn execute(
        &self,
        request: &WorkflowRequest,
        ctx: &ExecutionContext,
        trace: &mut ExecutionTrace,
        cancel: CancellationToken,
    ) -> Result<Value, ExecutionError> {
        let result = self
            .executor
            .execute(&request.definition, &request.run, ctx, &cancel)
            .await;
        trace.step_results.extend(result.step_results.iter().cloned());

        if result.success {
            return Ok(json!({
                "executionId": result.execution_id,
                "workflow": request.definition.name,
                "message": result.message,
                "outputData": result.output_data,
            }));
        }

        let detail = result
            .errors
            .first()
            .cloned()
            .unwrap_or_else(|| result.message.clone());
        Err(match (result.status, result.error_kind) {
            (AuditStatus::Cancelled, _) => ExecutionError::Cancelled(detail),
            (_, Some(ErrorKind::TimeoutError)) => ExecutionError::Timeout(detail),
            _ => ExecutionError::Execution(detail),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_protocols::workflow::WorkflowStep;
    use flowpilot_store::MemoryAuditStore;

    use crate::mock::{MockResponse, MockToolExecutor};
    use crate::pipeline::{ExecutionPipeline, PipelineState};
    use crate::workflow::StepDispatcher;

    fn setup() -> (Arc<MockToolExecutor>, Arc<MemoryAuditStore>, WorkflowOrchestration) {
        let tools = Arc::new(MockToolExecutor::new());
        let audit = Arc::new(MemoryAuditStore::new());
        let dispatcher = StepDispatcher::new(tools.clone())
            .with_retry_base_delay(std::time::Duration::from_millis(10));
        let executor = Arc::new(WorkflowExecutor::new(dispatcher, audit.clone()));
        (tools, audit, WorkflowOrchestration::new(executor))
    }

    fn two_steps() -> WorkflowDefinition {
        WorkflowDefinition::new("pair")
            .with_first_step("a")
            .with_step(WorkflowStep::tool("a", "fetch").with_next("b"))
            .with_step(WorkflowStep::tool("b", "store"))
    }

    #[tokio::test]
    async fn test_workflow_runs_through_pipeline() {
        let (_, _, orchestration) = setup();
        let request = WorkflowRequest::new(two_steps(), WorkflowRunRequest::new());
        let ctx = ExecutionContext::new("u", "s");

        let result = ExecutionPipeline::new()
            .run(&orchestration, &request, &ctx, &CancellationToken::new())
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.tool_usage.len(), 2);
        assert_eq!(result.output["workflow"], "pair");
        assert_eq!(result.output["executionId"], ctx.execution_id());
    }

    #[tokio::test]
    async fn test_health_and_capabilities() {
        let (_, _, orchestration) = setup();

        let health = ExecutionPipeline::new().health(&orchestration).await;
        assert!(health.is_healthy());
        assert_eq!(health.details["activeExecutions"], 0);

        let capabilities = orchestration.capabilities();
        assert!(capabilities.supports_cancel);
        assert!(!capabilities.supports_parallel_execution);
        assert_eq!(capabilities.custom["stepTypes"][2], "decision");
    }

    #[tokio::test]
    async fn test_invalid_definition_never_reaches_executor() {
        let (tools, audit, orchestration) = setup();
        let request =
            WorkflowRequest::new(WorkflowDefinition::new("empty"), WorkflowRunRequest::new());
        let ctx = ExecutionContext::new("u", "s");

        let result = ExecutionPipeline::new()
            .run(&orchestration, &request, &ctx, &CancellationToken::new())
            .await;

        assert_eq!(result.state, PipelineState::Failed);
        assert_eq!(result.error.unwrap().kind, ErrorKind::ValidationError);
        assert_eq!(tools.total_calls(), 0);
        assert!(audit.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_failure_maps_to_execution_error() {
        let (mock, _, orchestration) = setup();
        mock.set_response("fetch", MockResponse::Failure("upstream down".into())).await;
        let request = WorkflowRequest::new(two_steps(), WorkflowRunRequest::new());
        let ctx = ExecutionContext::new("u", "s");

        let result = ExecutionPipeline::new()
            .run(&orchestration, &request, &ctx, &CancellationToken::new())
            .await;

        assert_eq!(result.state, PipelineState::Failed);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ExecutionError);
        assert_eq!(error.message, "Step 'a' failed: upstream down");
        assert_eq!(mock.call_count("store"), 0);
    }
}
