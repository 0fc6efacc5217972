//! Workflow definition types.
//!
//! A workflow is a named directed graph of steps. Definitions are produced by
//! a designer and stored as JSON, so field names follow the designer's
//! camelCase convention.

mod definition;
mod step;

pub use definition::*;
pub use step::*;

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
