//! # Taskmind
//!
//! A task reasoning engine. Given a snapshot of tasks with deadlines,
//! priorities, durations and dependencies, it answers scheduling queries:
//! which task to do next, which tasks are ready, whether a task sits in a
//! dependency cycle, how urgent a task is, and summary statistics.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: Task model, dependency graph and urgency scoring
//! - **[`reasoner`]**: Deterministic in-process reasoner used as the fallback
//! - **[`backend`]**: Reasoning backend connections, knowledge bases and the connection pool
//! - **[`monitor`]**: Operation tracking, health assessment and diagnostics export
//! - **[`service`]**: Retrying scheduler service that ties the pool, monitor and fallback together
//! - **[`cli`]**: Command line arguments, configuration discovery and task loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskmind::backend::FactBackendFactory;
//! use taskmind::monitor::{MonitorConfig, OperationMonitor};
//! use taskmind::service::{SchedulerService, SchedulerServiceConfig};
//! use taskmind::cli::TaskLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SchedulerServiceConfig::default();
//!     let monitor = Arc::new(OperationMonitor::new(MonitorConfig::default()));
//!     let factory = Arc::new(FactBackendFactory::new(config.scoring.clone()));
//!     let service = SchedulerService::new(config, factory, Arc::clone(&monitor)).await?;
//!
//!     let tasks = TaskLoader::load_tasks("tasks.json")?;
//!     if let Some(next) = service.next_recommended_task(&tasks).await? {
//!         println!("Next task: {}", next);
//!     }
//!
//!     service.close();
//!     monitor.shutdown().await?;
//!     Ok(())
//! }
//! ```

/// Task model, dependency analysis and urgency scoring.
pub mod task;

/// Deterministic in-process reasoning over task snapshots.
pub mod reasoner;

/// Reasoning backends and the connection pool that serves them.
///
/// Defines the backend seam, the knowledge-base parser, the in-process
/// fact backend and a bounded pool with temporary overflow connections.
pub mod backend;

/// Operation monitoring and health assessment.
pub mod monitor;

/// The scheduler service: retries, contention backoff and fallback.
pub mod service;

/// Environment constants and path utilities.
///
/// Centralizes all hardcoded paths and directory names used throughout
/// the application for easier maintenance and consistency.
pub mod env;

// CLI module for command-line interface
pub mod cli;

// Re-export main task types
pub use task::{ScoringConfig, Task, TaskId, TaskPriority, TaskStatus, UrgencyScorer};

// Re-export reasoning types
pub use reasoner::{FallbackReasoner, TaskRecommendation, TaskStatistics};

// Re-export service types
pub use service::{ReasonerError, SchedulerService, SchedulerServiceConfig, ServiceStatus};

// Re-export monitoring types
pub use monitor::{HealthSnapshot, HealthStatus, MonitorConfig, OperationMonitor};
