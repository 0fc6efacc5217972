//! Tests for workflow executor.

use super::*;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use flowpilot_core::BroadcastEventSink;
use flowpilot_store::{MemoryAuditStore, MemoryStatisticsStore};

use crate::mock::{MockResponse, MockToolExecutor};
use crate::workflow::ConditionPolicy;
use flowpilot_protocols::workflow::WorkflowStep;

struct Harness {
    tools: Arc<MockToolExecutor>,
    audit: Arc<MemoryAuditStore>,
    executor: WorkflowExecutor,
}

fn harness() -> Harness {
    let tools = Arc::new(MockToolExecutor::new());
    let audit = Arc::new(MemoryAuditStore::new());
    let dispatcher =
        StepDispatcher::new(tools.clone()).with_retry_base_delay(Duration::from_millis(10));
    let executor = WorkflowExecutor::new(dispatcher, audit.clone());
    Harness {
        tools,
        audit,
        executor,
    }
}

fn linear() -> WorkflowDefinition {
    WorkflowDefinition::new("linear")
        .with_first_step("a")
        .with_step(WorkflowStep::tool("a", "fetch").with_name("Fetch").with_next("b"))
        .with_step(
            WorkflowStep::tool("b", "transform")
                .with_name("Transform")
                .with_config("input", json!("{{a}}"))
                .with_next("c"),
        )
        .with_step(WorkflowStep::tool("c", "store").with_name("Store"))
}

struct FailingAuditStore;

#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn create(&self, _record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        Err(StoreError::Custom("disk full".into()))
    }

    async fn update(&self, _record: &ExecutionAuditRecord) -> Result<(), StoreError> {
        Err(StoreError::Custom("disk full".into()))
    }

    async fn get(&self, _execution_id: &str) -> Result<Option<ExecutionAuditRecord>, StoreError> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_linear_workflow_succeeds() {
    let h = harness();
    h.tools.set_response("fetch", MockResponse::Success(json!({"rows": 2}))).await;

    let ctx = ExecutionContext::new("alice", "s1");
    let request = WorkflowRunRequest::new().with_parameter("limit", json!(5));
    let result = h
        .executor
        .execute(&linear(), &request, &ctx, &CancellationToken::new())
        .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.status, AuditStatus::Completed);
    assert_eq!(result.message, "Workflow completed successfully");
    let ids: Vec<_> = result.step_results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(result.output_data["limit"], 5);
    assert_eq!(result.execution_id, ctx.execution_id());

    let params = &h.tools.calls("transform")[0].params;
    assert_eq!(params["input"], json!({"rows": 2}));
    assert_eq!(h.executor.active_count(), 0);
}

#[tokio::test]
async fn test_audit_record_created_and_completed() {
    let h = harness();
    let ctx = ExecutionContext::new("alice", "s1");
    let request = WorkflowRunRequest::new()
        .with_workflow_id("wf-7")
        .with_initiator("alice")
        .with_parameter("k", json!("v"));
    h.executor
        .execute(&linear(), &request, &ctx, &CancellationToken::new())
        .await;

    let record = h.audit.get(ctx.execution_id()).await.unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Completed);
    assert!(record.success);
    assert_eq!(record.subject_id, "wf-7");
    assert_eq!(record.initiated_by.as_deref(), Some("alice"));
    assert_eq!(record.snapshot["k"], "v");
    assert!(record.log.contains("Workflow 'linear' started"));
    assert!(record.log.contains("Starting step: Transform"));
    assert_eq!(h.audit.len().await, 1);
}

#[tokio::test]
async fn test_huge_step_timeout_completes_audit() {
    let h = harness();
    let definition = WorkflowDefinition::new("slow")
        .with_first_step("a")
        .with_step(WorkflowStep::tool("a", "fetch").with_timeout_seconds(u64::MAX));
    let ctx = ExecutionContext::new("alice", "s1").with_timeout(Duration::MAX);

    let result = h
        .executor
        .execute(&definition, &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(h.executor.active_count(), 0);
    let record = h.audit.get(ctx.execution_id()).await.unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_failing_step_aborts_workflow() {
    let h = harness();
    h.tools.set_response("transform", MockResponse::Failure("bad input".into())).await;

    let ctx = ExecutionContext::new("alice", "s1");
    let result = h
        .executor
        .execute(&linear(), &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.status, AuditStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::ExecutionError));
    assert_eq!(result.errors, vec!["Step 'Transform' failed: bad input".to_string()]);
    assert_eq!(result.step_results.len(), 2);
    assert_eq!(h.tools.call_count("transform"), 3);
    assert_eq!(h.tools.call_count("store"), 0);

    let status = h.executor.status(ctx.execution_id()).await.unwrap().unwrap();
    assert_eq!(status.status, AuditStatus::Failed);
    assert_eq!(
        status.message.as_deref(),
        Some("Step 'Transform' failed: bad input")
    );
}

#[tokio::test]
async fn test_failed_decision_does_not_abort() {
    let tools = Arc::new(MockToolExecutor::new());
    let audit = Arc::new(MemoryAuditStore::new());
    let dispatcher =
        StepDispatcher::new(tools.clone()).with_condition_policy(ConditionPolicy::Reject);
    let executor = WorkflowExecutor::new(dispatcher, audit);

    let def = WorkflowDefinition::new("branchy")
        .with_first_step("d")
        .with_step(WorkflowStep::decision("d", "{score} > 3", vec!["t".into()], vec![]))
        .with_step(WorkflowStep::tool("t", "echo"));

    let ctx = ExecutionContext::new("u", "s");
    let result = executor
        .execute(&def, &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert!(!result.step_results[0].success);
    assert!(result.step_results[1].success);
    assert_eq!(tools.call_count("echo"), 1);
}

#[tokio::test]
async fn test_unknown_step_type_aborts() {
    let h = harness();
    let def = WorkflowDefinition::new("odd")
        .with_first_step("x")
        .with_step(WorkflowStep::new("x", "webhook").with_next("y"))
        .with_step(WorkflowStep::tool("y", "echo"));

    let ctx = ExecutionContext::new("u", "s");
    let result = h
        .executor
        .execute(&def, &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.errors[0].contains("Unknown step type: webhook"));
    assert_eq!(h.tools.total_calls(), 0);
}

#[tokio::test]
async fn test_pre_cancelled_run_executes_nothing() {
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let ctx = ExecutionContext::new("u", "s");
    let result = h
        .executor
        .execute(&linear(), &WorkflowRunRequest::new(), &ctx, &cancel)
        .await;

    assert!(!result.success);
    assert_eq!(result.status, AuditStatus::Cancelled);
    assert_eq!(result.error_kind, Some(ErrorKind::CancelledError));
    assert!(result.step_results.is_empty());
    assert_eq!(h.tools.total_calls(), 0);

    let record = h.audit.get(ctx.execution_id()).await.unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Cancelled);
}

#[tokio::test]
async fn test_stopped_context_cancels_before_next_step() {
    let h = harness();
    let ctx = ExecutionContext::new("u", "s");
    ctx.stop();
    let result = h
        .executor
        .execute(&linear(), &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;
    assert_eq!(result.status, AuditStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_by_id_while_running() {
    let h = Arc::new(harness());
    h.tools
        .set_response("fetch", MockResponse::Delayed(Duration::from_secs(60), json!(null)))
        .await;

    let ctx = Arc::new(ExecutionContext::new("u", "s"));
    let execution_id = ctx.execution_id().to_string();
    let runner = {
        let h = h.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            h.executor
                .execute(&linear(), &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let status = h.executor.status(&execution_id).await.unwrap().unwrap();
    assert_eq!(status.status, AuditStatus::Running);
    assert_eq!(status.current_step.as_deref(), Some("Fetch"));
    assert_eq!(status.total_steps, 3);
    assert_eq!(status.completed_steps, 0);

    assert!(h.executor.cancel(&execution_id));
    let result = runner.await.unwrap();
    assert_eq!(result.status, AuditStatus::Cancelled);
    assert_eq!(h.tools.call_count("fetch"), 1);
    assert!(!h.executor.cancel(&execution_id));
}

#[tokio::test]
async fn test_status_of_unknown_execution() {
    let h = harness();
    assert!(h.executor.status("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_audit_failures_are_swallowed() {
    let tools = Arc::new(MockToolExecutor::new());
    let executor = WorkflowExecutor::new(StepDispatcher::new(tools), Arc::new(FailingAuditStore));
    let ctx = ExecutionContext::new("u", "s");
    let result = executor
        .execute(&linear(), &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;
    assert!(result.success);
}

#[tokio::test]
async fn test_events_published_in_order() {
    let tools = Arc::new(MockToolExecutor::new());
    let sink = Arc::new(BroadcastEventSink::new(64));
    let mut rx = sink.subscribe();
    let audit = Arc::new(MemoryAuditStore::new());
    let executor =
        WorkflowExecutor::new(StepDispatcher::new(tools), audit).with_events(sink.clone());

    let def = WorkflowDefinition::new("one")
        .with_step(WorkflowStep::tool("only", "echo"));
    let ctx = ExecutionContext::new("u", "s");
    let request = WorkflowRunRequest::new().with_workflow_id("wf").with_project_id("p");
    executor
        .execute(&def, &request, &ctx, &CancellationToken::new())
        .await;

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.scope().execution_id, ctx.execution_id());
        assert_eq!(event.scope().project_id.as_deref(), Some("p"));
        kinds.push(match event {
            ExecutionEvent::WorkflowStarted { .. } => "workflow_started",
            ExecutionEvent::StepStarted { .. } => "step_started",
            ExecutionEvent::StepCompleted { .. } => "step_completed",
            ExecutionEvent::WorkflowCompleted { .. } => "workflow_completed",
            ExecutionEvent::WorkflowFailed { .. } => "workflow_failed",
            ExecutionEvent::WorkflowCancelled { .. } => "workflow_cancelled",
            ExecutionEvent::LogAppended { .. } => "log",
        });
    }
    let lifecycle: Vec<_> = kinds.into_iter().filter(|k| *k != "log").collect();
    assert_eq!(
        lifecycle,
        vec!["workflow_started", "step_started", "step_completed", "workflow_completed"]
    );
}

#[tokio::test]
async fn test_workflow_statistics_recorded() {
    let tools = Arc::new(MockToolExecutor::new());
    let stats = Arc::new(MemoryStatisticsStore::new());
    let audit = Arc::new(MemoryAuditStore::new());
    let executor =
        WorkflowExecutor::new(StepDispatcher::new(tools), audit).with_statistics(stats.clone());

    for _ in 0..2 {
        let ctx = ExecutionContext::new("u", "s");
        executor
            .execute(
                &linear(),
                &WorkflowRunRequest::new().with_workflow_id("wf-1"),
                &ctx,
                &CancellationToken::new(),
            )
            .await;
    }
    let ctx = ExecutionContext::new("u", "s");
    executor
        .execute(&linear(), &WorkflowRunRequest::new(), &ctx, &CancellationToken::new())
        .await;

    let recorded = stats.get("wf-1").await.unwrap().unwrap();
    assert_eq!(recorded.execution_count, 2);
    assert_eq!(recorded.success_count, 2);
}
