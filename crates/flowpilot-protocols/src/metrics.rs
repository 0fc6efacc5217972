//! Metrics collaborator notified at execution start and completion.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::Metadata;

#[async_trait]
pub trait MetricsCollector: Send + Sync {
    async fn record_start(&self, orchestration_id: &str, execution_id: &str, user_id: &str);

    async fn record_completion(
        &self,
        orchestration_id: &str,
        execution_id: &str,
        success: bool,
        duration: Duration,
        metadata: &Metadata,
    );
}

/// Collector that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

#[async_trait]
impl MetricsCollector for NoopMetrics {
    async fn record_start(&self, _orchestration_id: &str, _execution_id: &str, _user_id: &str) {}

    async fn record_completion(
        &self,
        _orchestration_id: &str,
        _execution_id: &str,
        _success: bool,
        _duration: Duration,
        _metadata: &Metadata,
    ) {
    }
}
