use crate::backend::{BackendError, ConnectionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Monitor errors
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Diagnostics I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Diagnostics serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// An error the monitor can classify by a structured tag
pub trait OperationError: std::fmt::Display {
    fn kind(&self) -> &'static str;
}

impl OperationError for BackendError {
    fn kind(&self) -> &'static str {
        BackendError::kind(self).as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Operation records kept in the FIFO history
    pub max_history: usize,
    /// Error rate over the history above which the service is unhealthy
    pub error_rate_threshold: f64,
    pub recent_window: usize,
    /// Failures within the recent window that mark the service degraded
    pub recent_failure_threshold: usize,
    pub slow_operation_threshold: Duration,
    /// Duration samples kept per operation name
    pub max_duration_samples: usize,
    /// Diagnostics are exported here on shutdown when set
    pub diagnostics_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_history: 1000,
            error_rate_threshold: 0.1,
            recent_window: 10,
            recent_failure_threshold: 3,
            slow_operation_threshold: Duration::from_secs(5),
            max_duration_samples: 1000,
            diagnostics_path: None,
        }
    }
}

/// Error kind of an operation dropped before it completed
pub const CANCELLED_KIND: &str = "Cancelled";

/// Error kind of an operation that panicked
pub const PANICKED_KIND: &str = "Panicked";

/// One tracked backend operation attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRecord {
    pub operation_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub connection_id: Option<ConnectionId>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub uptime_seconds: f64,
    pub total_operations: u64,
    pub total_errors: u64,
    /// Failed share of the records currently in the history
    pub error_rate: f64,
    pub average_response_times_ms: HashMap<String, f64>,
    pub issues: Vec<String>,
    pub last_operation: Option<OperationRecord>,
}

/// Aggregates for a single operation name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationStats {
    pub operation_name: String,
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub success_rate: f64,
    pub min_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub slow_operations: usize,
    /// Failures in the history keyed by error kind
    pub error_patterns: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DurationStats {
    pub samples: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Everything written by a diagnostics export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsReport {
    pub exported_at: DateTime<Utc>,
    pub health: HealthSnapshot,
    pub operation_history: Vec<OperationRecord>,
    pub error_counts: HashMap<String, u64>,
    pub performance: HashMap<String, DurationStats>,
}
