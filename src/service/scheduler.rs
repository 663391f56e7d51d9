use crate::backend::{
    BackendError, BackendFactory, ConnectionPool, KnowledgeBase, load_knowledge_base,
};
use crate::monitor::{HealthSnapshot, OperationMonitor, OperationStats};
use crate::reasoner::{FallbackReasoner, TaskRecommendation, TaskStatistics};
use crate::service::error_recovery::RetryExecutor;
use crate::service::types::*;
use crate::task::{Task, TaskId};
use futures::FutureExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scheduling queries answered by pooled backend connections, with the
/// fallback reasoner as the last resort.
pub struct SchedulerService {
    config: SchedulerServiceConfig,
    backend_name: &'static str,
    pool: ConnectionPool,
    executor: RetryExecutor,
    monitor: Arc<OperationMonitor>,
    fallback: FallbackReasoner,
    fallback_invocations: AtomicU64,
}

impl SchedulerService {
    /// Load the configured knowledge base and open the connection pool
    pub async fn new(
        config: SchedulerServiceConfig,
        factory: Arc<dyn BackendFactory>,
        monitor: Arc<OperationMonitor>,
    ) -> Result<Self> {
        let knowledge = match &config.knowledge_base_path {
            Some(path) => {
                let kb = load_knowledge_base(path)?;
                info!(
                    "Loaded {} knowledge-base expressions from {}",
                    kb.len(),
                    path.display()
                );
                kb
            }
            None => KnowledgeBase::default(),
        };

        let backend_name = factory.backend_name();
        let pool = ConnectionPool::new(factory, config.pool.clone(), knowledge).await?;
        let executor = RetryExecutor::new(pool.clone(), Arc::clone(&monitor), config.retry.clone());

        info!(
            "Scheduler service ready ({} backend, fallback {})",
            backend_name,
            if config.enable_fallback { "enabled" } else { "disabled" }
        );

        Ok(Self {
            fallback: FallbackReasoner::new(config.scoring.clone()),
            config,
            backend_name,
            pool,
            executor,
            monitor,
            fallback_invocations: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SchedulerServiceConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<OperationMonitor> {
        &self.monitor
    }

    pub async fn next_recommended_task(&self, tasks: &[Task]) -> Result<Option<TaskId>> {
        let snapshot: Arc<[Task]> = tasks.into();
        let result = self
            .executor
            .execute("get_next_task", move |backend| {
                let snapshot = Arc::clone(&snapshot);
                async move {
                    backend.ingest(&snapshot).await?;
                    match backend.next_task().await? {
                        Some(id) if !contains_task(&snapshot, &id) => Err(
                            BackendError::MalformedAnswer(format!("unknown next task {}", id)),
                        ),
                        answer => Ok(answer),
                    }
                }
                .boxed()
            })
            .await;

        self.resolve("get_next_task", result, || {
            self.fallback.next_recommended_task(tasks)
        })
    }

    pub async fn ready_task_ids(&self, tasks: &[Task]) -> Result<Vec<TaskId>> {
        let snapshot: Arc<[Task]> = tasks.into();
        let result = self
            .executor
            .execute("get_ready_tasks", move |backend| {
                let snapshot = Arc::clone(&snapshot);
                async move {
                    backend.ingest(&snapshot).await?;
                    let ready = backend.ready_tasks().await?;
                    if let Some(unknown) = ready.iter().find(|id| !contains_task(&snapshot, id)) {
                        return Err(BackendError::MalformedAnswer(format!(
                            "unknown ready task {}",
                            unknown
                        )));
                    }
                    Ok(ready)
                }
                .boxed()
            })
            .await;

        self.resolve("get_ready_tasks", result, || self.fallback.ready_task_ids(tasks))
    }

    pub async fn has_circular_dependency(&self, task_id: &str, tasks: &[Task]) -> Result<bool> {
        let snapshot: Arc<[Task]> = tasks.into();
        let id: Arc<str> = task_id.into();
        let result = self
            .executor
            .execute("check_circular_dependency", move |backend| {
                let snapshot = Arc::clone(&snapshot);
                let id = Arc::clone(&id);
                async move {
                    backend.ingest(&snapshot).await?;
                    backend.has_circular_dependency(&id).await
                }
                .boxed()
            })
            .await;

        self.resolve("check_circular_dependency", result, || {
            self.fallback.has_circular_dependency(task_id, tasks)
        })
    }

    pub async fn urgency(&self, task_id: &str, tasks: &[Task]) -> Result<f64> {
        let snapshot: Arc<[Task]> = tasks.into();
        let id: Arc<str> = task_id.into();
        let result = self
            .executor
            .execute("calculate_urgency", move |backend| {
                let snapshot = Arc::clone(&snapshot);
                let id = Arc::clone(&id);
                async move {
                    backend.ingest(&snapshot).await?;
                    let score = backend.urgency(&id).await?;
                    if !score.is_finite() {
                        return Err(BackendError::MalformedAnswer(format!(
                            "non-finite urgency {} for {}",
                            score, id
                        )));
                    }
                    Ok(score)
                }
                .boxed()
            })
            .await;

        self.resolve("calculate_urgency", result, || {
            self.fallback.urgency(task_id, tasks)
        })
    }

    /// Task statistics for the snapshot.
    ///
    /// The backend is still queried so its failures are tracked, but the
    /// returned counts are always computed locally.
    pub async fn statistics(&self, tasks: &[Task]) -> Result<TaskStatistics> {
        let snapshot: Arc<[Task]> = tasks.into();
        let result = self
            .executor
            .execute("get_statistics", move |backend| {
                let snapshot = Arc::clone(&snapshot);
                async move {
                    backend.ingest(&snapshot).await?;
                    backend.statistics().await
                }
                .boxed()
            })
            .await;

        let local = self.fallback.statistics(tasks);
        let remote = self.resolve("get_statistics", result, || None)?;
        if let Some(remote) = remote
            && remote != local
        {
            debug!(
                "Backend statistics differ from local counts (backend total {}, local total {})",
                remote.total, local.total
            );
        }
        Ok(local)
    }

    /// Up to `limit` ranked recommendations with the reasons behind each rank
    pub fn recommendations(&self, tasks: &[Task], limit: usize) -> Vec<TaskRecommendation> {
        self.fallback.recommendations(tasks, limit)
    }

    /// Check out a connection and run a trivial query on it
    pub async fn probe(&self) -> ConnectionProbe {
        let started = Instant::now();
        let mut conn = match self.pool.checkout(self.pool.config().checkout_timeout).await {
            Ok(conn) => conn,
            Err(e) => {
                self.monitor.record_failure("test_connection", 0, &e).await;
                return ConnectionProbe {
                    success: false,
                    connection_id: None,
                    connection_kind: None,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    error: Some(e.to_string()),
                };
            }
        };

        let id = conn.id().clone();
        let kind = conn.kind();
        let result = self
            .monitor
            .track_operation("test_connection", Some(&id), 0, async {
                let backend = conn.backend();
                backend.ingest(&[]).await?;
                backend.ready_tasks().await
            })
            .await;

        ConnectionProbe {
            success: result.is_ok(),
            connection_id: Some(id),
            connection_kind: Some(kind),
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: result.err().map(|e| e.to_string()),
        }
    }

    pub async fn service_status(&self) -> ServiceStatus {
        ServiceStatus {
            backend: self.backend_name.to_string(),
            pool: self.pool.status(),
            fallback_enabled: self.config.enable_fallback,
            fallback_invocations: self.fallback_invocations.load(Ordering::Relaxed),
            health: self.monitor.health_status().await,
        }
    }

    pub async fn health_status(&self) -> HealthSnapshot {
        self.monitor.health_status().await
    }

    pub async fn operation_stats(&self, operation_name: &str) -> Option<OperationStats> {
        self.monitor.operation_stats(operation_name).await
    }

    pub async fn export_diagnostics(&self, path: &Path) -> Result<()> {
        Ok(self.monitor.export_diagnostics(path).await?)
    }

    /// Parse `content` and load it into every connection created from now on.
    ///
    /// Returns the new knowledge-base generation.
    pub async fn set_knowledge_base(&self, content: &str) -> Result<u64> {
        let knowledge = KnowledgeBase::parse(content)?;
        Ok(self.pool.set_knowledge_base(knowledge).await)
    }

    pub fn fallback_invocations(&self) -> u64 {
        self.fallback_invocations.load(Ordering::Relaxed)
    }

    /// Close the connection pool; later queries fail over to the fallback reasoner
    pub fn close(&self) {
        self.pool.close();
        info!("Scheduler service closed");
    }

    fn resolve<T>(
        &self,
        operation: &str,
        result: Result<T>,
        fallback: impl FnOnce() -> T,
    ) -> Result<T> {
        match result {
            Err(e @ ReasonerError::Exhausted { .. }) if self.config.enable_fallback => {
                warn!("{}; answering {} from the fallback reasoner", e, operation);
                self.fallback_invocations.fetch_add(1, Ordering::Relaxed);
                Ok(fallback())
            }
            other => other,
        }
    }
}

fn contains_task(tasks: &[Task], task_id: &str) -> bool {
    tasks.iter().any(|task| task.id == task_id)
}
