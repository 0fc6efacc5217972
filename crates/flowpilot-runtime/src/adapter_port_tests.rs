use super::*;

use std::time::Duration;

use flowpilot_protocols::adapter::{AdapterDefinition, AdapterDirection};
use flowpilot_store::{MemoryAuditStore, MemoryStatisticsStore};

use crate::mock::{MockAdapter, MockResponse};

struct Harness {
    audit: Arc<MemoryAuditStore>,
    port: AdapterExecutionPort,
}

fn harness(adapters: Vec<Arc<MockAdapter>>) -> Harness {
    let registry = Arc::new(AdapterRegistry::new());
    for adapter in adapters {
        registry.register(adapter).unwrap();
    }
    let audit = Arc::new(MemoryAuditStore::new());
    let port =
        AdapterExecutionPort::new(registry, audit.clone(), Arc::new(MemoryStatisticsStore::new()));
    Harness { audit, port }
}

fn config(pairs: &[(&str, Value)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_input_resolves_variables_and_audits() {
    let source = Arc::new(MockAdapter::new("csv", AdapterDirection::Input));
    let h = harness(vec![source.clone()]);
    let ctx = ExecutionContext::new("alice", "s");
    ctx.set_variable("file", "/data/in.csv");

    let result = h
        .port
        .execute_input(
            "csv",
            &config(&[("path", json!("{{file}}")), ("header", json!(true))]),
            &ctx,
            &CancellationToken::new(),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data["path"], "/data/in.csv");
    assert_eq!(result.metrics.items_processed, 1);
    assert_eq!(source.last_params().unwrap()["path"], "/data/in.csv");

    let record = h.audit.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Completed);
    assert_eq!(record.subject_kind, SubjectKind::Adapter);
    assert_eq!(record.initiated_by.as_deref(), Some("alice"));
    assert_eq!(record.snapshot["operation"], "input");
    assert_eq!(record.snapshot["attempts"], 1);
    assert_eq!(record.snapshot["parent_execution_id"], ctx.execution_id());
    assert_ne!(result.execution_id, ctx.execution_id());

    let stats = h.port.statistics("csv").await.unwrap().unwrap();
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.success_count, 1);
}

#[tokio::test]
async fn test_each_execution_gets_fresh_id() {
    let h = harness(vec![Arc::new(MockAdapter::new("csv", AdapterDirection::Input))]);
    let ctx = ExecutionContext::new("u", "s");
    let cancel = CancellationToken::new();
    let a = h.port.execute_input("csv", &ConfigMap::new(), &ctx, &cancel).await;
    let b = h.port.execute_input("csv", &ConfigMap::new(), &ctx, &cancel).await;
    assert_ne!(a.execution_id, b.execution_id);
    assert_eq!(h.audit.len().await, 2);
}

#[tokio::test]
async fn test_direction_mismatch_is_rejected_without_audit() {
    let sink = Arc::new(MockAdapter::new("db", AdapterDirection::Output));
    let h = harness(vec![sink.clone()]);
    let ctx = ExecutionContext::new("u", "s");

    let result = h
        .port
        .execute_input("db", &ConfigMap::new(), &ctx, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Adapter 'db' is not an input adapter"));
    assert_eq!(result.error_kind, Some(ErrorKind::ExecutionError));
    assert_eq!(sink.call_count(), 0);
    assert!(h.audit.is_empty().await);
    assert!(h.port.statistics("db").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_and_disabled_adapters() {
    let disabled = Arc::new(
        MockAdapter::new("old", AdapterDirection::Input).with_definition(
            AdapterDefinition::new("old", "Old", AdapterDirection::Input).with_enabled(false),
        ),
    );
    let h = harness(vec![disabled]);
    let ctx = ExecutionContext::new("u", "s");
    let cancel = CancellationToken::new();

    let missing = h.port.execute_input("nope", &ConfigMap::new(), &ctx, &cancel).await;
    assert_eq!(missing.error.as_deref(), Some("Adapter 'nope' not found"));
    assert_eq!(missing.error_kind, Some(ErrorKind::ExecutionError));

    let off = h.port.execute_input("old", &ConfigMap::new(), &ctx, &cancel).await;
    assert_eq!(off.error.as_deref(), Some("Adapter 'old' is disabled"));
    assert_eq!(off.error_kind, Some(ErrorKind::ExecutionError));
    assert!(h.audit.is_empty().await);
}

#[tokio::test]
async fn test_output_passes_data_through() {
    let sink = Arc::new(MockAdapter::new("db", AdapterDirection::Bidirectional));
    let h = harness(vec![sink.clone()]);
    let ctx = ExecutionContext::new("u", "s");

    let result = h
        .port
        .execute_output(
            "db",
            json!([{"id": 1}]),
            &config(&[("table", json!("orders"))]),
            &ctx,
            &CancellationToken::new(),
        )
        .await;

    assert!(result.success);
    assert_eq!(sink.written(), vec![json!([{"id": 1}])]);
    let record = h.audit.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(record.snapshot["operation"], "output");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_success_updates_rolling_average() {
    let source = Arc::new(MockAdapter::new("api", AdapterDirection::Input));
    source
        .push_responses(vec![
            MockResponse::Delayed(Duration::from_secs(10), json!("late")),
            MockResponse::Delayed(Duration::from_millis(200), json!("fresh")),
        ])
        .await;
    let h = harness(vec![source]);
    let cancel = CancellationToken::new();

    let ctx = ExecutionContext::new("u", "s").with_timeout(Duration::from_secs(1));
    let timed_out = h.port.execute_input("api", &ConfigMap::new(), &ctx, &cancel).await;

    assert!(!timed_out.success);
    assert_eq!(timed_out.error.as_deref(), Some("Adapter execution timed out"));
    assert_eq!(timed_out.error_kind, Some(ErrorKind::TimeoutError));
    let record = h.audit.get(&timed_out.execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Failed);
    assert_eq!(record.snapshot["error_category"], "timeout");

    let stats = h.port.statistics("api").await.unwrap().unwrap();
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.execution_count, 1);

    let ctx = ExecutionContext::new("u", "s");
    let ok = h.port.execute_input("api", &ConfigMap::new(), &ctx, &cancel).await;
    assert!(ok.success);
    assert_eq!(ok.data, json!("fresh"));

    let stats = h.port.statistics("api").await.unwrap().unwrap();
    assert_eq!(stats.execution_count, 2);
    assert_eq!(stats.success_count, 1);
    let expected = (timed_out.duration_ms + ok.duration_ms) / 2.0;
    assert!((stats.average_duration_ms.unwrap() - expected).abs() < 1e-6);
    assert!(timed_out.duration_ms >= 1000.0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation() {
    let source = Arc::new(MockAdapter::new("api", AdapterDirection::Input));
    source
        .push_responses(vec![MockResponse::Delayed(Duration::from_secs(10), Value::Null)])
        .await;
    let h = harness(vec![source]);
    let ctx = ExecutionContext::new("u", "s");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h.port.execute_input("api", &ConfigMap::new(), &ctx, &cancel).await;

    assert_eq!(result.error.as_deref(), Some("Adapter execution was cancelled"));
    assert_eq!(result.error_kind, Some(ErrorKind::CancelledError));
    let record = h.audit.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_recovers_from_failure() {
    let source = Arc::new(MockAdapter::new("api", AdapterDirection::Input));
    source
        .push_responses(vec![
            MockResponse::Failure("connection reset".into()),
            MockResponse::Success(json!({"ok": true})),
        ])
        .await;
    let registry = Arc::new(AdapterRegistry::new());
    registry.register(source.clone()).unwrap();
    let audit = Arc::new(MemoryAuditStore::new());
    let statistics = Arc::new(MemoryStatisticsStore::new());
    let port = AdapterExecutionPort::new(registry, audit.clone(), statistics)
        .with_retry(RetryPolicy::new(2, Duration::from_millis(50)));
    let ctx = ExecutionContext::new("u", "s");

    let result = port
        .execute_input("api", &ConfigMap::new(), &ctx, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(source.call_count(), 2);
    let record = audit.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(record.snapshot["attempts"], 2);
}

#[tokio::test]
async fn test_failure_without_retry_is_categorized() {
    let source = Arc::new(MockAdapter::new("api", AdapterDirection::Input));
    source
        .push_responses(vec![MockResponse::Failure("connection refused".into())])
        .await;
    let h = harness(vec![source]);
    let ctx = ExecutionContext::new("u", "s");

    let result = h
        .port
        .execute_input("api", &ConfigMap::new(), &ctx, &CancellationToken::new())
        .await;

    assert_eq!(result.error.as_deref(), Some("Adapter operation failed: connection refused"));
    assert_eq!(result.error_kind, Some(ErrorKind::ExecutionError));
    let record = h.audit.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(record.snapshot["error_category"], "network");
    assert!(ctx.transcript().contains("Adapter 'api' failed"));
}

#[tokio::test]
async fn test_validate_configuration() {
    let h = harness(vec![Arc::new(MockAdapter::new("csv", AdapterDirection::Input))]);

    assert!(h.port.validate_configuration("csv", &config(&[("path", json!("x"))])).await.is_ok());

    let err = h
        .port
        .validate_configuration("csv", &config(&[("invalid", json!(1))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let err = h.port.validate_configuration("nope", &ConfigMap::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

#[test]
fn test_error_categories() {
    assert_eq!(ErrorCategory::classify("Request Timeout"), ErrorCategory::Timeout);
    assert_eq!(ErrorCategory::classify("Adapter execution timed out"), ErrorCategory::Timeout);
    assert_eq!(ErrorCategory::classify("file not found"), ErrorCategory::NotFound);
    assert_eq!(ErrorCategory::classify("Validation failed"), ErrorCategory::Validation);
    assert_eq!(ErrorCategory::classify("Unauthorized"), ErrorCategory::Authorization);
    assert_eq!(ErrorCategory::classify("permission denied"), ErrorCategory::Authorization);
    assert_eq!(ErrorCategory::classify("Network unreachable"), ErrorCategory::Network);
    assert_eq!(ErrorCategory::classify("disk full"), ErrorCategory::Other);
    assert_eq!(ErrorCategory::classify(""), ErrorCategory::Other);
}
