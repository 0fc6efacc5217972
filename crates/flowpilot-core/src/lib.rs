//! # FlowPilot Core
//!
//! Building blocks shared by every execution path of the engine.
//!
//! ## Components
//!
//! - [`ExecutionContext`] - Per-run mutable state: variables, logs, breadcrumbs
//! - [`CancellationScope`] - Caller cancellation composed with a local timeout
//! - [`SessionCancellations`] - One stop handle per session key
//! - [`RetryPolicy`] - Bounded attempts with exponential backoff
//! - Registries for tools, adapters and inference backends

pub mod cancellation;
pub mod context;
pub mod events;
pub mod placeholder;
pub mod registry;
pub mod retry;

pub use cancellation::{CancellationScope, Interrupt, SessionCancellations, SessionHandle};
pub use context::{
    Breadcrumb, ContextSummary, ExecutionContext, ListenerId, LogEntry, ToolEvent,
    ToolEventListener,
};
pub use events::BroadcastEventSink;
pub use registry::{AdapterRegistry, BackendRegistry, OneTimeInit, ToolRegistry};
pub use retry::{Attempt, RetryFailure, RetryOutcome, RetryPolicy};
