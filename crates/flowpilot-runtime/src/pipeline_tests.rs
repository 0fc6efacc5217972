use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flowpilot_core::BackendRegistry;
use flowpilot_protocols::backend::BackendKind;
use serde_json::json;

use crate::mock::MockBackend;

enum Behaviour {
    Succeed(Value),
    Fail(ExecutionError),
    Panic,
    /// Sleep, then report one tool call of the given duration.
    UseTool { total: Duration, tool: Duration },
}

struct Scripted {
    errors: Vec<String>,
    behaviour: Behaviour,
    target: Option<BackendTarget>,
    executed: AtomicUsize,
}

impl Scripted {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            errors: Vec::new(),
            behaviour,
            target: None,
            executed: AtomicUsize::new(0),
        }
    }

    fn rejecting(mut self, errors: &[&str]) -> Self {
        self.errors = errors.iter().map(|e| e.to_string()).collect();
        self
    }

    fn needing(mut self, target: BackendTarget) -> Self {
        self.target = Some(target);
        self
    }

    fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Orchestration for Scripted {
    type Request = String;

    fn id(&self) -> &str {
        "scripted"
    }

    fn validate(&self, _request: &String) -> Vec<String> {
        self.errors.clone()
    }

    fn backend_target(&self, _request: &String, _ctx: &ExecutionContext) -> Option<BackendTarget> {
        self.target.clone()
    }

    async fn execute(
        &self,
        request: &String,
        ctx: &ExecutionContext,
        trace: &mut ExecutionTrace,
        _cancel: CancellationToken,
    ) -> Result<Value, ExecutionError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Succeed(value) => {
                trace.add_step(StepResult::begin(&flowpilot_protocols::workflow::WorkflowStep::tool(
                    "only", "echo",
                )).succeed(json!(request)));
                Ok(value.clone())
            }
            Behaviour::Fail(error) => Err(error.clone()),
            Behaviour::Panic => panic!("boom"),
            Behaviour::UseTool { total, tool } => {
                tokio::time::sleep(*total).await;
                ctx.emit_tool_event(ToolEvent::Completed {
                    tool_id: "search".into(),
                    tool_name: "Search".into(),
                    success: true,
                    duration: *tool,
                    parameters: json!({"q": request}),
                    result: json!(["hit"]),
                    error: None,
                    at: Utc::now(),
                });
                Ok(Value::Null)
            }
        }
    }
}

#[derive(Default)]
struct RecordingMetrics {
    starts: AtomicUsize,
    completions: Mutex<Vec<(bool, Metadata)>>,
}

#[async_trait]
impl MetricsCollector for RecordingMetrics {
    async fn record_start(&self, _orchestration_id: &str, _execution_id: &str, _user_id: &str) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn record_completion(
        &self,
        _orchestration_id: &str,
        _execution_id: &str,
        success: bool,
        _duration: std::time::Duration,
        metadata: &Metadata,
    ) {
        self.completions.lock().push((success, metadata.clone()));
    }
}

fn pipeline() -> (ExecutionPipeline, Arc<RecordingMetrics>) {
    let metrics = Arc::new(RecordingMetrics::default());
    (ExecutionPipeline::new().with_metrics(metrics.clone()), metrics)
}

async fn run(pipeline: &ExecutionPipeline, orchestration: &Scripted) -> OrchestrationResult {
    let ctx = ExecutionContext::new("user-1", "session-1");
    pipeline
        .run(orchestration, &"hello".to_string(), &ctx, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_successful_run_walks_every_state() {
    let (pipeline, metrics) = pipeline();
    let orchestration = Scripted::new(Behaviour::Succeed(json!({"answer": 42})));

    let result = run(&pipeline, &orchestration).await;

    assert!(result.success);
    assert_eq!(result.state, PipelineState::Succeeded);
    assert_eq!(
        result.transitions,
        vec![
            PipelineState::Pending,
            PipelineState::Validating,
            PipelineState::DependencyCheck,
            PipelineState::Executing,
            PipelineState::Succeeded,
        ]
    );
    assert_eq!(result.output["answer"], 42);
    assert_eq!(result.step_results.len(), 1);
    assert!(result.error.is_none());
    assert_eq!(metrics.starts.load(Ordering::SeqCst), 1);
    let completions = metrics.completions.lock();
    assert_eq!(completions.len(), 1);
    assert!(completions[0].0);
}

#[tokio::test]
async fn test_validation_failure_short_circuits() {
    let (pipeline, metrics) = pipeline();
    let orchestration =
        Scripted::new(Behaviour::Succeed(Value::Null)).rejecting(&["name is required", "too long"]);

    let result = run(&pipeline, &orchestration).await;

    assert!(!result.success);
    assert_eq!(orchestration.executed(), 0);
    assert_eq!(
        result.transitions,
        vec![PipelineState::Pending, PipelineState::Validating, PipelineState::Failed]
    );
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert_eq!(error.code, "VALIDATION_FAILED");
    assert_eq!(error.details, vec!["name is required", "too long"]);
    assert_eq!(metrics.starts.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.completions.lock().len(), 1);
    assert!(!metrics.completions.lock()[0].0);
}

#[tokio::test]
async fn test_panic_becomes_unknown_error() {
    let (pipeline, metrics) = pipeline();
    let orchestration = Scripted::new(Behaviour::Panic);

    let result = run(&pipeline, &orchestration).await;

    assert_eq!(result.state, PipelineState::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::UnknownError);
    assert_eq!(error.message, "boom");
    assert_eq!(metrics.completions.lock().len(), 1);
}

#[tokio::test]
async fn test_execution_error_keeps_its_kind() {
    let (pipeline, _) = pipeline();
    let timeout = ExecutionError::Timeout("model took too long".into());
    let orchestration = Scripted::new(Behaviour::Fail(timeout));

    let result = run(&pipeline, &orchestration).await;

    assert_eq!(result.state, PipelineState::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::TimeoutError);
    assert_eq!(error.message, "model took too long");
}

#[tokio::test]
async fn test_cancelled_error_ends_in_cancelled_state() {
    let (pipeline, _) = pipeline();
    let orchestration = Scripted::new(Behaviour::Fail(ExecutionError::Cancelled("stopped".into())));

    let result = run(&pipeline, &orchestration).await;

    assert_eq!(result.state, PipelineState::Cancelled);
    assert_eq!(result.error.unwrap().kind, ErrorKind::CancelledError);
}

#[tokio::test]
async fn test_pre_cancelled_token_skips_execution() {
    let (pipeline, metrics) = pipeline();
    let orchestration = Scripted::new(Behaviour::Succeed(Value::Null));
    let ctx = ExecutionContext::new("u", "s");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = pipeline.run(&orchestration, &"x".to_string(), &ctx, &cancel).await;

    assert_eq!(result.state, PipelineState::Cancelled);
    assert_eq!(orchestration.executed(), 0);
    assert!(!result.transitions.contains(&PipelineState::Executing));
    assert_eq!(metrics.completions.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tool_usage_and_time_split() {
    let (pipeline, metrics) = pipeline();
    let orchestration = Scripted::new(Behaviour::UseTool {
        total: Duration::from_millis(100),
        tool: Duration::from_millis(40),
    });
    let ctx = ExecutionContext::new("u", "s");

    let result = pipeline
        .run(&orchestration, &"rust".to_string(), &ctx, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.tool_usage.len(), 1);
    assert_eq!(result.tool_usage[0].tool_id, "search");
    assert_eq!(result.tool_usage[0].parameters["q"], "rust");
    assert_eq!(result.metrics.tool_calls, 1);
    assert_eq!(result.metrics.tool_time_ms, 40.0);
    assert!(result.metrics.total_duration_ms >= 100.0);
    assert_eq!(
        result.metrics.model_time_ms,
        result.metrics.total_duration_ms - 40.0
    );
    assert_eq!(metrics.completions.lock()[0].1["tool_calls"], 1);
}

#[tokio::test]
async fn test_readiness_failure_aborts_before_execution() {
    let registry = Arc::new(BackendRegistry::new());
    registry
        .register(Arc::new(
            MockBackend::new("ollama", BackendKind::LocalDaemon)
                .stopped()
                .failing_start(),
        ))
        .unwrap();
    let (pipeline, _) = pipeline();
    let pipeline = pipeline.with_readiness(Arc::new(DependencyReadiness::new(registry)));
    let orchestration = Scripted::new(Behaviour::Succeed(Value::Null))
        .needing(BackendTarget::new("ollama", "llama3"));

    let result = run(&pipeline, &orchestration).await;

    assert_eq!(result.state, PipelineState::Failed);
    assert_eq!(orchestration.executed(), 0);
    assert_eq!(result.error.unwrap().kind, ErrorKind::ExecutionError);
    assert!(result.transitions.contains(&PipelineState::DependencyCheck));
    assert!(!result.transitions.contains(&PipelineState::Executing));
}

#[tokio::test]
async fn test_best_effort_readiness_lets_run_proceed() {
    let registry = Arc::new(BackendRegistry::new());
    registry
        .register(Arc::new(
            MockBackend::new("hosted", BackendKind::Remote).failing_warm_up(),
        ))
        .unwrap();
    let pipeline =
        ExecutionPipeline::new().with_readiness(Arc::new(DependencyReadiness::new(registry)));
    let orchestration = Scripted::new(Behaviour::Succeed(json!("ok")))
        .needing(BackendTarget::new("hosted", "gpt"));

    let result = run(&pipeline, &orchestration).await;

    assert!(result.success);
    assert_eq!(orchestration.executed(), 1);
}

#[test]
fn test_terminal_states() {
    assert!(PipelineState::Succeeded.is_terminal());
    assert!(PipelineState::Cancelled.is_terminal());
    assert!(!PipelineState::Executing.is_terminal());
}

struct Flaky;

#[async_trait]
impl Orchestration for Flaky {
    type Request = ();

    fn id(&self) -> &str {
        "flaky"
    }

    fn capabilities(&self) -> OrchestrationCapabilities {
        OrchestrationCapabilities {
            max_concurrent_executions: 4,
            default_timeout_seconds: Some(30),
            ..Default::default()
        }
    }

    async fn health(&self) -> HealthStatus {
        panic!("database unreachable")
    }

    async fn execute(
        &self,
        _request: &(),
        _ctx: &ExecutionContext,
        _trace: &mut ExecutionTrace,
        _cancel: CancellationToken,
    ) -> Result<Value, ExecutionError> {
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn test_default_health_and_capabilities() {
    let orchestration = Scripted::new(Behaviour::Succeed(Value::Null));

    let health = ExecutionPipeline::new().health(&orchestration).await;
    assert_eq!(health.state, HealthState::Healthy);
    assert!(health.details.is_empty());

    let capabilities = orchestration.capabilities();
    assert_eq!(capabilities, OrchestrationCapabilities::default());
    assert!(capabilities.supports_cancel);
    assert!(!capabilities.supports_streaming);
    assert_eq!(capabilities.max_concurrent_executions, 0);
}

#[tokio::test]
async fn test_panicking_health_check_reports_unhealthy() {
    let health = ExecutionPipeline::new().health(&Flaky).await;

    assert_eq!(health.state, HealthState::Unhealthy);
    assert_eq!(health.message, "Health check failed: database unreachable");
    assert!(!health.is_healthy());
}

#[test]
fn test_capabilities_serialize_camel_case() {
    let value = serde_json::to_value(Flaky.capabilities()).unwrap();
    assert_eq!(value["maxConcurrentExecutions"], 4);
    assert_eq!(value["defaultTimeoutSeconds"], 30);
    assert_eq!(value["supportsCancel"], true);
    assert!(value.get("custom").is_none());
}
