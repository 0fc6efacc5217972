//! Decision condition evaluation.
//!
//! Only literal booleans are understood: `true`/`1` and `false`/`0` after
//! `{name}` placeholders are replaced. Anything else is reported as
//! unsupported and left to the configured [`ConditionPolicy`].

use serde::{Deserialize, Serialize};

use flowpilot_core::placeholder::substitute_condition;
use flowpilot_protocols::types::Metadata;

/// What to do with a condition that is not a literal boolean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionPolicy {
    /// Take the true branch and log a warning.
    #[default]
    AssumeTrue,
    /// Fail the decision step with a configuration error.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Literal(bool),
    /// The substituted expression could not be evaluated.
    Unsupported(String),
}

/// Substitute variables into `condition` and evaluate it.
pub fn evaluate_condition(condition: &str, variables: &Metadata) -> ConditionOutcome {
    let substituted = substitute_condition(condition, variables);
    match substituted.trim().to_lowercase().as_str() {
        "true" | "1" => ConditionOutcome::Literal(true),
        "false" | "0" => ConditionOutcome::Literal(false),
        _ => ConditionOutcome::Unsupported(substituted),
    }
}
