//! Request, result and status types of the workflow executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowpilot_protocols::audit::{AuditStatus, ExecutionAuditRecord};
use flowpilot_protocols::error::ErrorKind;
use flowpilot_protocols::types::Metadata;
use flowpilot_protocols::workflow::StepResult;

/// Parameters of one workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunRequest {
    /// Stored workflow the definition came from; enables statistics.
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub initiated_by: Option<String>,
    /// Copied into the context's variables before the first step.
    #[serde(default)]
    pub input_parameters: Metadata,
}

impl WorkflowRunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_initiator(mut self, initiated_by: impl Into<String>) -> Self {
        self.initiated_by = Some(initiated_by.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input_parameters.insert(key.into(), value);
        self
    }
}

/// Outcome of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunResult {
    pub execution_id: String,
    pub workflow_id: Option<String>,
    pub project_id: Option<String>,
    pub success: bool,
    pub status: AuditStatus,
    pub message: String,
    /// Variables at the end of the run.
    pub output_data: Metadata,
    pub step_results: Vec<StepResult>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: f64,
}

impl WorkflowRunResult {
    /// The step results that failed.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.step_results.iter().filter(|r| !r.success)
    }
}

/// Point-in-time view of an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    pub execution_id: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub progress_percentage: f64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionStatus {
    /// Status of a finished execution read back from its audit record.
    pub fn from_record(record: &ExecutionAuditRecord) -> Self {
        let message = match record.status {
            AuditStatus::Failed => record.error_message.clone(),
            AuditStatus::Cancelled => Some("Execution cancelled".to_string()),
            AuditStatus::Completed => Some("Execution completed".to_string()),
            AuditStatus::Running => None,
        };
        Self {
            execution_id: record.execution_id.clone(),
            status: record.status,
            current_step: None,
            completed_steps: 0,
            total_steps: 0,
            progress_percentage: if record.status == AuditStatus::Completed { 100.0 } else { 0.0 },
            started_at: record.started_at,
            completed_at: record.completed_at,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_protocols::audit::SubjectKind;

    #[test]
    fn test_request_builder() {
        let request = WorkflowRunRequest::new()
            .with_workflow_id("wf-1")
            .with_initiator("alice")
            .with_parameter("city", serde_json::json!("Oslo"));
        assert_eq!(request.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(request.input_parameters["city"], "Oslo");
    }

    #[test]
    fn test_status_from_failed_record() {
        let mut record = ExecutionAuditRecord::running("e1", "wf", SubjectKind::Workflow);
        record.complete(AuditStatus::Failed, Some("Step 'fetch' failed".into()), Utc::now());
        let status = ExecutionStatus::from_record(&record);
        assert_eq!(status.status, AuditStatus::Failed);
        assert_eq!(status.message.as_deref(), Some("Step 'fetch' failed"));
        assert!(status.completed_at.is_some());
    }

    #[test]
    fn test_status_from_completed_record() {
        let mut record = ExecutionAuditRecord::running("e1", "wf", SubjectKind::Workflow);
        record.complete(AuditStatus::Completed, None, Utc::now());
        let status = ExecutionStatus::from_record(&record);
        assert_eq!(status.progress_percentage, 100.0);
        assert_eq!(status.message.as_deref(), Some("Execution completed"));
    }
}
