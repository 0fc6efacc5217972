//! Error types for the FlowPilot protocol layer.

mod adapter;
mod backend;
mod execution;
mod registry;
mod store;
mod tool;

pub use adapter::*;
pub use backend::*;
pub use execution::*;
pub use registry::*;
pub use store::*;
pub use tool::*;
