//! # FlowPilot Store
//!
//! Persistence for execution audit records and rolling statistics.
//!
//! Two backends are provided for each store: an in-memory one for tests and
//! short-lived processes, and a JSON-file one for durable history.

mod audit;
mod statistics;

pub use audit::{FileAuditStore, MemoryAuditStore};
pub use statistics::{FileStatisticsStore, MemoryStatisticsStore};

/// File name for an id.
///
/// ASCII letters, digits, `-` and `.` are kept; every other byte, `_`
/// included, becomes `_XX` (uppercase hex), so distinct ids never share a file.
pub(crate) fn file_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len() + 5);
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.') {
            name.push(byte as char);
        } else {
            name.push_str(&format!("_{:02X}", byte));
        }
    }
    name.push_str(".json");
    name
}
