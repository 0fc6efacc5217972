//! Tool protocol definitions.
//!
//! Tools are invocable capabilities used by workflow steps and tool-calling chat.

mod context;
mod definition;
mod result;
mod traits;

pub use context::*;
pub use definition::*;
pub use result::*;
pub use traits::*;
