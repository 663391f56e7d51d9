use crate::backend::{BackendError, ConnectionPool, ReasoningBackend};
use crate::monitor::OperationMonitor;
use crate::service::types::{ReasonerError, Result, RetryConfig};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Future returned by a backend closure, borrowing the checked-out connection
pub type BackendCall<'c, T> = BoxFuture<'c, std::result::Result<T, BackendError>>;

/// Runs backend operations on pooled connections with bounded retries.
///
/// Each attempt checks out its own connection and returns it when the attempt
/// ends, whatever the outcome. Contention failures wait
/// `contention_backoff * attempt` before the next attempt; every other
/// failure is retried immediately.
pub struct RetryExecutor {
    pool: ConnectionPool,
    monitor: Arc<OperationMonitor>,
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(pool: ConnectionPool, monitor: Arc<OperationMonitor>, config: RetryConfig) -> Self {
        Self {
            pool,
            monitor,
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: for<'c> Fn(&'c mut dyn ReasoningBackend) -> BackendCall<'c, T> + Send + Sync,
        T: Send,
    {
        // At least one attempt, even with a zero retry budget
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            let retry_count = attempt;
            attempt += 1;

            match self.attempt(operation, retry_count, &f).await {
                Ok(value) => {
                    if retry_count > 0 {
                        info!("{} succeeded after {} retries", operation, retry_count);
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => {
                    error!("{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(ReasonerError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) if e.is_contention() => {
                    let delay = self.config.contention_backoff * attempt;
                    debug!("{} hit contention, backing off {:?}", operation, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!("{} failed ({}), retrying", operation, e.kind());
                }
            }
        }
    }

    async fn attempt<T, F>(
        &self,
        operation: &str,
        retry_count: u32,
        f: &F,
    ) -> std::result::Result<T, BackendError>
    where
        F: for<'c> Fn(&'c mut dyn ReasoningBackend) -> BackendCall<'c, T> + Send + Sync,
        T: Send,
    {
        let timeout = self.pool.config().checkout_timeout;
        let mut conn = match self.pool.checkout(timeout).await {
            Ok(conn) => conn,
            Err(e) => {
                self.monitor.record_failure(operation, retry_count, &e).await;
                return Err(e);
            }
        };

        let id = conn.id().clone();
        self.monitor
            .track_operation(operation, Some(&id), retry_count, f(conn.backend()))
            .await
    }
}
