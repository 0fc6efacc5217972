//! Adapter protocol definitions.
//!
//! Adapters are pluggable connectors that read external data into a run or
//! write results out of it.

mod definition;
mod result;
mod traits;

pub use definition::*;
pub use result::*;
pub use traits::*;
