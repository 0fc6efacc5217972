//! # FlowPilot Runtime
//!
//! Execution engine for workflows, orchestrations and adapters.
//!
//! ## Components
//!
//! - [`WorkflowExecutor`] - Linearizes a step graph and dispatches each step
//! - [`StepDispatcher`] - Runs one step by type, with retry and timeouts
//! - [`ExecutionPipeline`] - validate, check dependencies, execute, record
//! - [`AdapterExecutionPort`] - Audited, timeout-bound adapter reads and writes
//! - [`DependencyReadiness`] - Inference backend readiness checks

pub mod adapter_port;
pub mod mock;
pub mod pipeline;
pub mod readiness;
pub mod tool_executor;
pub mod workflow;
pub mod workflow_orchestration;

pub use adapter_port::{AdapterExecutionPort, ErrorCategory};
pub use pipeline::{
    ExecutionPipeline, ExecutionTrace, HealthState, HealthStatus, Orchestration,
    OrchestrationCapabilities, OrchestrationError, OrchestrationResult, PerformanceMetrics,
    PipelineState, ToolUsage,
};
pub use readiness::{DependencyReadiness, ReadinessPolicy};
pub use tool_executor::RegistryToolExecutor;
pub use workflow::{
    ConditionOutcome, ConditionPolicy, ExecutionStatus, StepDispatcher, WorkflowExecutor,
    WorkflowRunRequest, WorkflowRunResult, build_execution_order, evaluate_condition,
};
pub use workflow_orchestration::{WorkflowOrchestration, WorkflowRequest};
