use crate::backend::{
    BackendError, ConnectionId, ConnectionKind, KnowledgeBaseError, PoolConfig, PoolStatus,
};
use crate::monitor::{HealthSnapshot, MonitorConfig, MonitorError};
use crate::task::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Scheduler service errors
#[derive(Debug, thiserror::Error)]
pub enum ReasonerError {
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, ReasonerError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per query before giving up on the backend
    pub max_retries: u32,
    /// Multiplied by the attempt number after a contention failure
    pub contention_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            contention_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerServiceConfig {
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    /// Answer from the fallback reasoner when the backend is exhausted
    pub enable_fallback: bool,
    pub knowledge_base_path: Option<PathBuf>,
    pub monitor: MonitorConfig,
    pub scoring: ScoringConfig,
}

impl Default for SchedulerServiceConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            enable_fallback: true,
            knowledge_base_path: None,
            monitor: MonitorConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

/// Result of a connection test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionProbe {
    pub success: bool,
    pub connection_id: Option<ConnectionId>,
    pub connection_kind: Option<ConnectionKind>,
    pub latency_ms: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceStatus {
    pub backend: String,
    pub pool: PoolStatus,
    pub fallback_enabled: bool,
    /// Queries answered by the fallback reasoner since startup
    pub fallback_invocations: u64,
    pub health: HealthSnapshot,
}
