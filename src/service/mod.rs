//! Resilient scheduling service.
//!
//! [`SchedulerService`] runs each query on a pooled backend connection through
//! [`RetryExecutor`], tracks every attempt with the injected
//! [`OperationMonitor`](crate::monitor::OperationMonitor) and, once retries are
//! exhausted, answers from the fallback reasoner when fallback is enabled.

pub mod error_recovery;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod tests;

pub use error_recovery::RetryExecutor;
pub use scheduler::SchedulerService;
pub use types::*;
