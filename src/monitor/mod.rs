//! Operation tracking and health reporting for backend calls.

pub mod operation_monitor;
pub mod types;


pub use operation_monitor::{OperationMonitor, load_diagnostics};
pub use types::*;
