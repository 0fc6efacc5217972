//! Workflow execution: ordering, step dispatch and the executor.

mod condition;
mod dispatch;
mod executor;
mod order;
mod types;

pub use condition::{ConditionOutcome, ConditionPolicy, evaluate_condition};
pub use dispatch::StepDispatcher;
pub use executor::WorkflowExecutor;
pub use order::build_execution_order;
pub use types::{ExecutionStatus, WorkflowRunRequest, WorkflowRunResult};
