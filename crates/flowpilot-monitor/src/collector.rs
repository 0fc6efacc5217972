//! Metrics collector used by the execution pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use flowpilot_protocols::metrics::MetricsCollector;
use flowpilot_protocols::types::Metadata;

use crate::metrics::MetricsRegistry;

pub const STARTED_TOTAL: &str = "flowpilot_executions_started_total";
pub const SUCCEEDED_TOTAL: &str = "flowpilot_executions_succeeded_total";
pub const FAILED_TOTAL: &str = "flowpilot_executions_failed_total";
pub const DURATION_MS_TOTAL: &str = "flowpilot_execution_duration_ms_total";
pub const ACTIVE: &str = "flowpilot_executions_active";

/// Records execution start/completion into a [`MetricsRegistry`].
pub struct PipelineMetrics {
    registry: Arc<MetricsRegistry>,
}

impl PipelineMetrics {
    /// Register the execution metrics on `registry`.
    pub async fn new(registry: Arc<MetricsRegistry>) -> Self {
        registry
            .register_counter(STARTED_TOTAL, "Executions started")
            .await;
        registry
            .register_counter(SUCCEEDED_TOTAL, "Executions that succeeded")
            .await;
        registry
            .register_counter(FAILED_TOTAL, "Executions that failed or were cancelled")
            .await;
        registry
            .register_counter(DURATION_MS_TOTAL, "Accumulated execution time in milliseconds")
            .await;
        registry
            .register_gauge(ACTIVE, "Executions currently running")
            .await;
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

#[async_trait]
impl MetricsCollector for PipelineMetrics {
    async fn record_start(&self, orchestration_id: &str, execution_id: &str, user_id: &str) {
        debug!(execution_id, user_id, orchestration_id, "Execution started");
        let labels = [("orchestration", orchestration_id)];
        self.registry.inc_counter(STARTED_TOTAL, &labels).await;
        self.registry.inc_gauge(ACTIVE, &[]).await;
    }

    async fn record_completion(
        &self,
        orchestration_id: &str,
        execution_id: &str,
        success: bool,
        duration: Duration,
        _metadata: &Metadata,
    ) {
        debug!(execution_id, orchestration_id, success, ?duration, "Execution completed");
        let labels = [("orchestration", orchestration_id)];
        let outcome = if success { SUCCEEDED_TOTAL } else { FAILED_TOTAL };
        self.registry.inc_counter(outcome, &labels).await;
        self.registry
            .add_counter(DURATION_MS_TOTAL, &labels, duration.as_millis() as u64)
            .await;
        self.registry.dec_gauge(ACTIVE, &[]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_completion() {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = PipelineMetrics::new(registry.clone()).await;
        let labels = [("orchestration", "workflow")];

        metrics.record_start("workflow", "e1", "u").await;
        assert_eq!(registry.get(ACTIVE, &[]).await, Some(1));

        metrics
            .record_completion(
                "workflow",
                "e1",
                false,
                Duration::from_millis(1500),
                &Metadata::new(),
            )
            .await;

        assert_eq!(registry.get(STARTED_TOTAL, &labels).await, Some(1));
        assert_eq!(registry.get(FAILED_TOTAL, &labels).await, Some(1));
        assert_eq!(registry.get(SUCCEEDED_TOTAL, &labels).await, None);
        assert_eq!(registry.get(DURATION_MS_TOTAL, &labels).await, Some(1500));
        assert_eq!(registry.get(ACTIVE, &[]).await, Some(0));

        let export = metrics.registry().export().await;
        assert!(export.contains("flowpilot_executions_failed_total{orchestration=\"workflow\"} 1"));
    }
}
