//! # FlowPilot Protocols
//!
//! Core protocol definitions (traits and data types) for the FlowPilot
//! execution engine. Contains only interface definitions - no implementations.
//!
//! ## Core Traits
//!
//! - [`Tool`] / [`ToolExecutor`] - Invocable capabilities and the port that runs them
//! - [`Adapter`] - Pluggable input/output connectors
//! - [`AuditStore`] / [`StatisticsStore`] - Durable execution bookkeeping
//! - [`EventSink`] - Fire-and-forget lifecycle notifications
//! - [`InferenceBackend`] - Model-inference service readiness
//! - [`MetricsCollector`] - Execution start/completion metrics

pub mod adapter;
pub mod audit;
pub mod backend;
pub mod error;
pub mod events;
pub mod metrics;
pub mod tool;
pub mod types;
pub mod workflow;

pub use adapter::{
    Adapter, AdapterDefinition, AdapterDirection, AdapterMetrics, AdapterOutput, AdapterResult,
};
pub use audit::{
    AdapterStatistics, AuditStatus, AuditStore, ExecutionAuditRecord, StatisticsStore, SubjectKind,
};
pub use backend::{BackendKind, BackendTarget, InferenceBackend};
pub use error::{
    AdapterError, BackendError, ErrorKind, ExecutionError, RegistryError, StoreError, ToolError,
};
pub use events::{EventScope, EventSink, ExecutionEvent, NullEventSink};
pub use metrics::{MetricsCollector, NoopMetrics};
pub use tool::{Tool, ToolContext, ToolDefinition, ToolExecutor, ToolMetrics, ToolResult};
pub use types::*;
pub use workflow::{
    Branches, DefinitionReport, StepResult, StepType, WorkflowDefinition, WorkflowStep,
};
