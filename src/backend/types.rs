use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Errors reported by a reasoning backend connection.
///
/// The variant is the classification tag: retry policy looks at the variant,
/// never at the message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Another caller mutated shared backend state concurrently
    #[error("Concurrent mutation conflict: {0}")]
    Contention(String),
    #[error("Backend timeout: {0}")]
    Timeout(String),
    #[error("Malformed query: {0}")]
    MalformedQuery(String),
    /// The backend answered with something that does not fit the snapshot
    #[error("Malformed answer: {0}")]
    MalformedAnswer(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Classification tag of a [`BackendError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendErrorKind {
    Contention,
    Timeout,
    MalformedQuery,
    MalformedAnswer,
    Unavailable,
}

impl BackendError {
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::Contention(_) => BackendErrorKind::Contention,
            BackendError::Timeout(_) => BackendErrorKind::Timeout,
            BackendError::MalformedQuery(_) => BackendErrorKind::MalformedQuery,
            BackendError::MalformedAnswer(_) => BackendErrorKind::MalformedAnswer,
            BackendError::Unavailable(_) => BackendErrorKind::Unavailable,
        }
    }

    /// Contention failures are retried after a backoff, everything else immediately
    pub fn is_contention(&self) -> bool {
        matches!(self, BackendError::Contention(_))
    }
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::Contention => "Contention",
            BackendErrorKind::Timeout => "Timeout",
            BackendErrorKind::MalformedQuery => "MalformedQuery",
            BackendErrorKind::MalformedAnswer => "MalformedAnswer",
            BackendErrorKind::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a checked-out connection relates to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Member of the shared pool, returned after use
    Pooled,
    /// Created because the pool was exhausted; always discarded after use
    Temporary,
}

/// Identifier of a backend connection, unique for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(kind: ConnectionKind) -> Self {
        let prefix = match kind {
            ConnectionKind::Pooled => "pooled",
            ConnectionKind::Temporary => "temp",
        };
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", prefix, &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections kept in the pool
    pub pool_size: usize,
    /// How long a checkout waits for an idle connection before creating a temporary one
    pub checkout_timeout: Duration,
    /// Connections held longer than this are discarded on return
    pub staleness_threshold: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            checkout_timeout: Duration::from_secs(5),
            staleness_threshold: Duration::from_secs(30),
        }
    }
}

/// Snapshot of pool occupancy and lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub idle: usize,
    /// Pooled connections alive, idle or checked out
    pub members: usize,
    /// Connections currently held by callers, temporary ones included
    pub checked_out: usize,
    pub total_checkouts: u64,
    pub temporary_created: u64,
    pub discarded: u64,
    pub replenished: u64,
    pub knowledge_base_expressions: usize,
    pub knowledge_base_generation: u64,
    pub closed: bool,
}
