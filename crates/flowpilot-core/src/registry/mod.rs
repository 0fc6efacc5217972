//! Registries for tools, adapters and inference backends.
//!
//! Registries are constructed explicitly and injected where needed. Each one
//! carries a [`OneTimeInit`] guard so concurrent callers populating it at
//! startup cannot run discovery twice.

mod adapter;
mod backend;
mod base;
mod init;
mod tool;

pub use adapter::AdapterRegistry;
pub use backend::BackendRegistry;
pub use base::{BaseRegistry, Registerable};
pub use init::OneTimeInit;
pub use tool::ToolRegistry;
