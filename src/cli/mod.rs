//! CLI-specific functionality for taskmind
//!
//! This module contains all CLI-related code including argument parsing,
//! task snapshot loading, and configuration discovery.

pub mod args;
pub mod config;
pub mod tasks;

pub use args::{Args, BenchConfig, ExecutionMode, Query, QueryConfig, ServiceOptions};
pub use config::{AppConfig, ConfigDiscovery, ConfigError};
pub use tasks::{FileError, TaskLoader};
