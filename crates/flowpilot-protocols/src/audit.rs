//! Durable execution bookkeeping: audit records and rolling statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// What an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Workflow,
    Adapter,
    Orchestration,
}

/// Lifecycle status of an audited execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AuditStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-style entry describing one execution's lifecycle and outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAuditRecord {
    pub execution_id: String,
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    pub status: AuditStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Serialized variables or metrics at completion.
    #[serde(default)]
    pub snapshot: serde_json::Value,
    /// Newline-joined run transcript.
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub initiated_by: Option<String>,
}

impl ExecutionAuditRecord {
    /// A record in the `running` state.
    pub fn running(
        execution_id: impl Into<String>,
        subject_id: impl Into<String>,
        subject_kind: SubjectKind,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            subject_id: subject_id.into(),
            subject_kind,
            status: AuditStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            success: false,
            error_message: None,
            snapshot: serde_json::Value::Null,
            log: String::new(),
            initiated_by: None,
        }
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn with_initiator(mut self, initiated_by: Option<String>) -> Self {
        self.initiated_by = initiated_by;
        self
    }

    /// Move the record to a terminal status.
    pub fn complete(
        &mut self,
        status: AuditStatus,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) {
        self.status = status;
        self.success = status == AuditStatus::Completed;
        self.error_message = error_message;
        self.completed_at = Some(completed_at);
        self.duration_ms = (completed_at - self.started_at)
            .num_microseconds()
            .map(|us| us as f64 / 1000.0);
    }
}

/// Persistence for audit records.
///
/// Records are created once and updated once; they are never deleted.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError>;

    async fn update(&self, record: &ExecutionAuditRecord) -> Result<(), StoreError>;

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionAuditRecord>, StoreError>;
}

/// Rolling counters for a workflow or adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterStatistics {
    pub subject_id: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default)]
    pub average_duration_ms: Option<f64>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl AdapterStatistics {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    /// Fold one execution into the counters.
    ///
    /// The average follows `avg' = (avg * (n - 1) + d) / n`.
    pub fn record(&mut self, success: bool, duration_ms: f64, at: DateTime<Utc>) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let n = self.execution_count as f64;
        self.average_duration_ms = Some(match self.average_duration_ms {
            Some(avg) => (avg * (n - 1.0) + duration_ms) / n,
            None => duration_ms,
        });
        self.last_executed_at = Some(at);
    }

    /// Percentage of successful executions, 0 when none ran.
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.execution_count as f64 * 100.0
        }
    }
}

/// Persistence for rolling statistics.
///
/// `record` is a read-modify-write that implementations serialize so
/// concurrent writers never lose an update.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn record(
        &self,
        subject_id: &str,
        success: bool,
        duration_ms: f64,
    ) -> Result<AdapterStatistics, StoreError>;

    async fn get(&self, subject_id: &str) -> Result<Option<AdapterStatistics>, StoreError>;
}
