//! Adapter execution port.
//!
//! Looks adapters up by id, checks they may be used for the requested
//! direction, resolves `{{variable}}` references in their configuration and
//! runs the read or write under the caller's cancellation and the context's
//! timeout. Every execution that reaches the adapter leaves an audit record
//! and a statistics update behind, whatever its outcome.

#[cfg(test)]
#[path = "adapter_port_tests.rs"]
mod tests;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flowpilot_core::placeholder::resolve_variables;
use flowpilot_core::{AdapterRegistry, Attempt, CancellationScope, ExecutionContext, RetryPolicy};
use flowpilot_protocols::adapter::{Adapter, AdapterMetrics, AdapterResult};
use flowpilot_protocols::audit::{
    AdapterStatistics, AuditStatus, AuditStore, ExecutionAuditRecord, StatisticsStore, SubjectKind,
};
use flowpilot_protocols::error::{AdapterError, ErrorKind, ExecutionError, StoreError};
use flowpilot_protocols::types::{ConfigMap, LogLevel};

/// Coarse bucket of an adapter failure, derived from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    NotFound,
    Validation,
    Authorization,
    Network,
    Other,
}

impl ErrorCategory {
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("timeout") || message.contains("timed out") {
            Self::Timeout
        } else if message.contains("not found") {
            Self::NotFound
        } else if message.contains("validation") || message.contains("invalid") {
            Self::Validation
        } else if message.contains("permission") || message.contains("unauthorized") {
            Self::Authorization
        } else if message.contains("network") || message.contains("connection") {
            Self::Network
        } else {
            Self::Other
        }
    }
}

enum Operation {
    Read,
    Write(Value),
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Self::Read => "input",
            Self::Write(_) => "output",
        }
    }
}

/// Runs adapters and keeps their audit trail and statistics.
pub struct AdapterExecutionPort {
    adapters: Arc<AdapterRegistry>,
    audit: Arc<dyn AuditStore>,
    statistics: Arc<dyn StatisticsStore>,
    retry: RetryPolicy,
}

impl AdapterExecutionPort {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        audit: Arc<dyn AuditStore>,
        statistics: Arc<dyn StatisticsStore>,
    ) -> Self {
        Self {
            adapters,
            audit,
            statistics,
            retry: RetryPolicy::once(),
        }
    }

    /// Retry failed operations. Timeouts, cancellation and configuration
    /// errors are never retried.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read from an input or bidirectional adapter.
    pub async fn execute_input(
        &self,
        adapter_id: &str,
        configuration: &ConfigMap,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> AdapterResult {
        self.execute(adapter_id, Operation::Read, configuration, ctx, cancel)
            .await
    }

    /// Write `data` to an output or bidirectional adapter.
    pub async fn execute_output(
        &self,
        adapter_id: &str,
        data: Value,
        configuration: &ConfigMap,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> AdapterResult {
        self.execute(adapter_id, Operation::Write(data), configuration, ctx, cancel)
            .await
    }

    /// Ask the adapter whether `configuration` is acceptable.
    pub async fn validate_configuration(
        &self,
        adapter_id: &str,
        configuration: &ConfigMap,
    ) -> Result<(), ExecutionError> {
        let adapter = self
            .adapters
            .get(adapter_id)
            .ok_or_else(|| {
                ExecutionError::configuration(format!("Adapter '{}' not found", adapter_id))
            })?;
        adapter
            .validate_configuration(configuration)
            .await
            .map_err(|e| ExecutionError::validation(e.to_string()))
    }

    pub async fn statistics(
        &self,
        adapter_id: &str,
    ) -> Result<Option<AdapterStatistics>, StoreError> {
        self.statistics.get(adapter_id).await
    }

    /// Rejections are reported as execution errors, before any audit record
    /// is written.
    fn lookup(&self, adapter_id: &str, operation: &Operation) -> Result<Arc<dyn Adapter>, String> {
        let Some(adapter) = self.adapters.get(adapter_id) else {
            return Err(format!("Adapter '{}' not found", adapter_id));
        };
        let definition = adapter.definition();
        if !definition.enabled {
            return Err(format!("Adapter '{}' is disabled", adapter_id));
        }
        let supported = match operation {
            Operation::Read => definition.direction.supports_input(),
            Operation::Write(_) => definition.direction.supports_output(),
        };
        if !supported {
            return Err(format!(
                "Adapter '{}' is not an {} adapter",
                adapter_id,
                operation.name()
            ));
        }
        Ok(adapter)
    }

    async fn execute(
        &self,
        adapter_id: &str,
        operation: Operation,
        configuration: &ConfigMap,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> AdapterResult {
        let execution_id = Uuid::new_v4().to_string();
        let adapter = match self.lookup(adapter_id, &operation) {
            Ok(adapter) => adapter,
            Err(message) => {
                error!(adapter_id = %adapter_id, "{}", message);
                return AdapterResult::rejected(
                    execution_id,
                    adapter_id,
                    ErrorKind::ExecutionError,
                    message,
                );
            }
        };

        info!(
            adapter_id = %adapter_id,
            user_id = %ctx.user_id(),
            "Executing {} adapter",
            operation.name()
        );

        let resolved = resolve_variables(configuration, &ctx.variables());
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut record =
            ExecutionAuditRecord::running(&execution_id, adapter_id, SubjectKind::Adapter)
                .with_started_at(started_at)
                .with_initiator(Some(ctx.user_id().to_string()));
        record.snapshot = json!({ "parent_execution_id": ctx.execution_id() });
        if let Err(e) = self.audit.create(&record).await {
            warn!(
                execution_id = %execution_id,
                error = %e,
                "Failed to create adapter audit record"
            );
        }

        let scope = CancellationScope::new(cancel, ctx.timeout());
        let (resolved_config, attempt_scope, requested) = (&resolved, &scope, &operation);
        let outcome = self
            .retry
            .run(&scope.token(), move |attempt| {
                let adapter = adapter.clone();
                let (resolved, scope, operation) = (resolved_config, attempt_scope, requested);
                async move {
                    if attempt > 1 {
                        debug!(adapter_id = %adapter.definition().id, attempt, "Retrying adapter");
                    }
                    let call = async {
                        match operation {
                            Operation::Read => adapter.read(resolved, scope.token()).await,
                            Operation::Write(data) => {
                                adapter.write(data.clone(), resolved, scope.token()).await
                            }
                        }
                    };
                    match scope.run(call).await {
                        Ok(Ok(output)) => Attempt::Succeeded(output),
                        Ok(Err(AdapterError::Cancelled)) => {
                            let reason = "Adapter execution was cancelled".to_string();
                            Attempt::Aborted(ExecutionError::Cancelled(reason))
                        }
                        Ok(Err(e)) if is_permanent(&e) => {
                            Attempt::Aborted(ExecutionError::execution(e.to_string()))
                        }
                        Ok(Err(e)) => Attempt::Failed(ExecutionError::execution(e.to_string())),
                        Err(interrupt) => {
                            Attempt::Aborted(interrupt.into_error("Adapter execution"))
                        }
                    }
                }
            })
            .await;

        let duration_ms = clock.elapsed().as_secs_f64() * 1000.0;
        let completed_at = Utc::now();
        let attempts = outcome.attempts;

        let (data, metrics, failure) = match outcome.result {
            Ok(output) => (output.data, output.metrics, None),
            Err(failure) => (Value::Null, AdapterMetrics::default(), Some(failure.into_error())),
        };
        let success = failure.is_none();
        let status = match &failure {
            None => AuditStatus::Completed,
            Some(ExecutionError::Cancelled(_)) => AuditStatus::Cancelled,
            Some(_) => AuditStatus::Failed,
        };
        let message = failure.as_ref().map(ExecutionError::message);
        let category = message.as_deref().map(ErrorCategory::classify);

        record.complete(status, message.clone(), completed_at);
        record.duration_ms = Some(duration_ms);
        record.snapshot = json!({
            "parent_execution_id": ctx.execution_id(),
            "operation": operation.name(),
            "attempts": attempts,
            "items_processed": metrics.items_processed,
            "bytes_processed": metrics.bytes_processed,
            "error_category": category,
        });
        record.log = ctx.transcript();
        if let Err(e) = self.audit.update(&record).await {
            warn!(
                execution_id = %execution_id,
                error = %e,
                "Failed to update adapter audit record"
            );
        }
        if let Err(e) = self.statistics.record(adapter_id, success, duration_ms).await {
            warn!(adapter_id = %adapter_id, error = %e, "Failed to update adapter statistics");
        }

        match &message {
            None => {
                info!(
                    adapter_id = %adapter_id,
                    duration_ms,
                    items = metrics.items_processed,
                    "{} adapter completed",
                    operation.name()
                );
                ctx.add_log(format!("Adapter '{}' completed", adapter_id), LogLevel::Info);
            }
            Some(error) => {
                warn!(adapter_id = %adapter_id, category = ?category, "{}", error);
                ctx.add_log(format!("Adapter '{}' failed: {}", adapter_id, error), LogLevel::Error);
            }
        }

        AdapterResult {
            execution_id,
            adapter_id: adapter_id.to_string(),
            success,
            data,
            error: message,
            error_kind: failure.as_ref().map(ExecutionError::kind),
            started_at,
            completed_at,
            duration_ms,
            metrics,
        }
    }
}

/// Errors no retry can fix.
fn is_permanent(error: &AdapterError) -> bool {
    matches!(
        error,
        AdapterError::Unsupported { .. } | AdapterError::InvalidConfiguration(_)
    )
}
