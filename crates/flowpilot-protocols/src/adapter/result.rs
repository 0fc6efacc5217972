//! Adapter execution result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Volume counters reported by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterMetrics {
    pub items_processed: u64,
    pub bytes_processed: u64,
}

/// What an adapter returns from a successful read or write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOutput {
    pub data: serde_json::Value,
    #[serde(default)]
    pub metrics: AdapterMetrics,
}

impl AdapterOutput {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            metrics: AdapterMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, items_processed: u64, bytes_processed: u64) -> Self {
        self.metrics = AdapterMetrics {
            items_processed,
            bytes_processed,
        };
        self
    }
}

/// Outcome of one adapter invocation through the execution port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResult {
    pub execution_id: String,
    pub adapter_id: String,
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: f64,
    #[serde(default)]
    pub metrics: AdapterMetrics,
}

impl AdapterResult {
    /// A failed result for a request rejected before the adapter ran.
    pub fn rejected(
        execution_id: impl Into<String>,
        adapter_id: impl Into<String>,
        kind: ErrorKind,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            adapter_id: adapter_id.into(),
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            error_kind: Some(kind),
            started_at: now,
            completed_at: now,
            duration_ms: 0.0,
            metrics: AdapterMetrics::default(),
        }
    }
}
