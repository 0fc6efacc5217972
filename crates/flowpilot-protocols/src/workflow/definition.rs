//! Workflow definitions and structural validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{StepType, WorkflowStep};
use crate::types::Metadata;

/// A named directed graph of steps with a designated entry step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_step_id: Option<String>,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Findings of [`WorkflowDefinition::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionReport {
    /// Problems that make the definition unrunnable.
    pub errors: Vec<String>,
    /// Problems the executor tolerates at runtime.
    pub warnings: Vec<String>,
}

impl DefinitionReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_first_step(mut self, id: impl Into<String>) -> Self {
        self.first_step_id = Some(id.into());
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Parse a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the graph for structural problems.
    pub fn validate(&self) -> DefinitionReport {
        let mut report = DefinitionReport::default();

        if self.steps.is_empty() {
            report.errors.push("Workflow has no steps".to_string());
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                report.errors.push("Step with empty id".to_string());
            } else if !seen.insert(step.id.as_str()) {
                report.errors.push(format!("Duplicate step id '{}'", step.id));
            }

            match &step.step_type {
                StepType::Tool | StepType::Process => {
                    if step.tool.as_deref().is_none_or(|t| t.trim().is_empty()) {
                        report
                            .errors
                            .push(format!("Step '{}' has no tool", step.label()));
                    }
                    if step.retry_count == 0 {
                        report
                            .errors
                            .push(format!("Step '{}' has retryCount 0", step.label()));
                    }
                }
                StepType::Decision => {
                    if step.condition.as_deref().is_none_or(|c| c.trim().is_empty()) {
                        report
                            .errors
                            .push(format!("Decision step '{}' has no condition", step.label()));
                    }
                }
                StepType::ParallelGateway => {
                    report.warnings.push(format!(
                        "Step '{}' is a parallel gateway and runs no branches",
                        step.label()
                    ));
                }
                StepType::Unknown(name) => {
                    report
                        .errors
                        .push(format!("Step '{}' has unknown type '{}'", step.label(), name));
                }
            }
        }

        for step in &self.steps {
            for target in step.successors() {
                if self.step(target).is_none() {
                    report.warnings.push(format!(
                        "Step '{}' references missing step '{}'",
                        step.label(),
                        target
                    ));
                }
            }
        }

        if let Some(first) = &self.first_step_id {
            if self.step(first).is_none() {
                report
                    .warnings
                    .push(format!("First step '{}' does not exist", first));
            }
        }

        report
    }
}
