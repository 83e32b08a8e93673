//! Sinks shipped with the crate. Each groups events by environment before writing.

mod audit_log;
mod evaluation_count;

pub use audit_log::*;
pub use evaluation_count::*;
