use crate::backend::*;
use crate::monitor::{HealthStatus, MonitorConfig, OperationMonitor};
use crate::reasoner::{FallbackReasoner, TaskStatistics};
use crate::service::{ReasonerError, RetryConfig, SchedulerService, SchedulerServiceConfig};
use crate::task::{Task, TaskId, TaskPriority, TaskStatus};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Failures and bogus answers a scripted backend plays back before behaving
#[derive(Default)]
struct Script {
    failures: Mutex<VecDeque<BackendError>>,
    fail_always: Mutex<Option<BackendError>>,
    bogus_answers: AtomicUsize,
    calls: AtomicUsize,
}

impl Script {
    fn with_failures(failures: impl IntoIterator<Item = BackendError>) -> Arc<Self> {
        let script = Self::default();
        script.failures.lock().unwrap().extend(failures);
        Arc::new(script)
    }

    fn failing(error: BackendError) -> Arc<Self> {
        let script = Self::default();
        *script.fail_always.lock().unwrap() = Some(error);
        Arc::new(script)
    }

    fn next_failure(&self) -> Option<BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_always.lock().unwrap().clone() {
            return Some(error);
        }
        self.failures.lock().unwrap().pop_front()
    }

    fn take_bogus(&self) -> bool {
        self.bogus_answers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Fact backend wrapper whose queries fail according to a shared script
struct ScriptedBackend {
    inner: Box<dyn ReasoningBackend>,
    script: Arc<Script>,
}

impl ScriptedBackend {
    fn check(&self) -> Result<(), BackendError> {
        match self.script.next_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn load_expression(&mut self, expression: &str) -> Result<(), BackendError> {
        self.inner.load_expression(expression).await
    }

    async fn ingest(&mut self, tasks: &[Task]) -> Result<(), BackendError> {
        self.inner.ingest(tasks).await
    }

    async fn next_task(&mut self) -> Result<Option<TaskId>, BackendError> {
        self.check()?;
        if self.script.take_bogus() {
            return Ok(Some("ghost".to_string()));
        }
        self.inner.next_task().await
    }

    async fn ready_tasks(&mut self) -> Result<Vec<TaskId>, BackendError> {
        self.check()?;
        if self.script.take_bogus() {
            return Ok(vec!["ghost".to_string()]);
        }
        self.inner.ready_tasks().await
    }

    async fn has_circular_dependency(&mut self, task_id: &str) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.has_circular_dependency(task_id).await
    }

    async fn urgency(&mut self, task_id: &str) -> Result<f64, BackendError> {
        self.check()?;
        if self.script.take_bogus() {
            return Ok(f64::NAN);
        }
        self.inner.urgency(task_id).await
    }

    async fn statistics(&mut self) -> Result<Option<TaskStatistics>, BackendError> {
        self.check()?;
        if self.script.take_bogus() {
            return Ok(Some(TaskStatistics::total_only(999)));
        }
        self.inner.statistics().await
    }
}

struct ScriptedFactory {
    inner: FactBackendFactory,
    script: Arc<Script>,
}

#[async_trait]
impl BackendFactory for ScriptedFactory {
    async fn connect(&self, id: &ConnectionId) -> Result<Box<dyn ReasoningBackend>, BackendError> {
        Ok(Box::new(ScriptedBackend {
            inner: self.inner.connect(id).await?,
            script: Arc::clone(&self.script),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

fn service_config(enable_fallback: bool) -> SchedulerServiceConfig {
    SchedulerServiceConfig {
        pool: PoolConfig {
            pool_size: 2,
            checkout_timeout: Duration::from_millis(100),
            staleness_threshold: Duration::from_secs(30),
        },
        retry: RetryConfig {
            max_retries: 3,
            contention_backoff: Duration::from_millis(20),
        },
        enable_fallback,
        ..Default::default()
    }
}

async fn scripted_service(script: Arc<Script>, enable_fallback: bool) -> SchedulerService {
    let factory = Arc::new(ScriptedFactory {
        inner: FactBackendFactory::default(),
        script,
    });
    let monitor = Arc::new(OperationMonitor::new(MonitorConfig::default()));
    SchedulerService::new(service_config(enable_fallback), factory, monitor)
        .await
        .unwrap()
}

fn worklist() -> Vec<Task> {
    let now = Utc::now();
    vec![
        Task::new(
            "design",
            "Design schema",
            now + ChronoDuration::days(10),
            TaskPriority::Medium,
            240,
        ),
        Task::new("fix", "Fix outage", now - ChronoDuration::days(1), TaskPriority::High, 45),
        Task::new("deploy", "Deploy", now + ChronoDuration::days(2), TaskPriority::High, 30)
            .with_dependencies(["design"]),
        Task::new("done", "Old chore", now - ChronoDuration::days(5), TaskPriority::Low, 30)
            .with_status(TaskStatus::Completed),
    ]
}

#[tokio::test]
async fn test_queries_answered_by_backend() {
    let script = Arc::new(Script::default());
    let service = scripted_service(Arc::clone(&script), true).await;
    let tasks = worklist();

    assert_eq!(service.next_recommended_task(&tasks).await.unwrap(), Some("fix".to_string()));
    assert_eq!(
        service.ready_task_ids(&tasks).await.unwrap(),
        vec!["design".to_string(), "fix".to_string()]
    );
    assert!(!service.has_circular_dependency("deploy", &tasks).await.unwrap());
    assert!(service.urgency("fix", &tasks).await.unwrap() > 8.0);

    let stats = service.statistics(&tasks).await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.completed, 1);

    assert_eq!(service.fallback_invocations(), 0);
    assert_eq!(script.calls.load(Ordering::SeqCst), 5);
    let health = service.health_status().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.total_operations, 5);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let script = Script::with_failures([
        BackendError::Timeout("first".to_string()),
        BackendError::Unavailable("second".to_string()),
    ]);
    let service = scripted_service(script, false).await;

    let next = service.next_recommended_task(&worklist()).await.unwrap();
    assert_eq!(next, Some("fix".to_string()));

    let history = service.monitor().history().await;
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|r| r.retry_count).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(history.iter().all(|r| r.connection_id.is_some()));
    assert!(history[2].success);
}

#[tokio::test]
async fn test_contention_backs_off_linearly() {
    let script = Script::with_failures([
        BackendError::Contention("a".to_string()),
        BackendError::Contention("b".to_string()),
    ]);
    let service = scripted_service(script, false).await;

    let started = Instant::now();
    let ready = service.ready_task_ids(&worklist()).await.unwrap();
    // 20ms after the first attempt, 40ms after the second
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(ready.len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_fall_back() {
    let script = Script::failing(BackendError::Timeout("down".to_string()));
    let service = scripted_service(Arc::clone(&script), true).await;
    let tasks = worklist();
    let fallback = FallbackReasoner::default();

    assert_eq!(
        service.next_recommended_task(&tasks).await.unwrap(),
        fallback.next_recommended_task(&tasks)
    );
    assert_eq!(
        service.ready_task_ids(&tasks).await.unwrap(),
        fallback.ready_task_ids(&tasks)
    );
    assert!(!service.has_circular_dependency("deploy", &tasks).await.unwrap());
    assert!(service.urgency("fix", &tasks).await.unwrap() > 0.0);
    assert_eq!(service.statistics(&tasks).await.unwrap().total, 4);

    assert_eq!(service.fallback_invocations(), 5);
    assert_eq!(script.calls.load(Ordering::SeqCst), 15);

    let status = service.service_status().await;
    assert_eq!(status.fallback_invocations, 5);
    assert!(status.fallback_enabled);
    assert_eq!(status.health.status, HealthStatus::Unhealthy);
    assert_eq!(status.health.total_errors, 15);
}

#[tokio::test]
async fn test_exhausted_retries_propagate_without_fallback() {
    let script = Script::failing(BackendError::Contention("busy".to_string()));
    let service = scripted_service(script, false).await;

    match service.urgency("fix", &worklist()).await {
        Err(ReasonerError::Exhausted {
            operation,
            attempts,
            source,
        }) => {
            assert_eq!(operation, "calculate_urgency");
            assert_eq!(attempts, 3);
            assert!(source.is_contention());
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(service.fallback_invocations(), 0);
}

#[tokio::test]
async fn test_malformed_answers_are_retried() {
    let script = Arc::new(Script::default());
    script.bogus_answers.store(2, Ordering::SeqCst);
    let service = scripted_service(Arc::clone(&script), false).await;

    let next = service.next_recommended_task(&worklist()).await.unwrap();
    assert_eq!(next, Some("fix".to_string()));

    let stats = service.operation_stats("get_next_task").await.unwrap();
    assert_eq!(stats.total_calls, 3);
    assert_eq!(stats.error_patterns.get("MalformedAnswer"), Some(&2));

    script.bogus_answers.store(1, Ordering::SeqCst);
    let score = service.urgency("fix", &worklist()).await.unwrap();
    assert!(score.is_finite());
}

#[tokio::test]
async fn test_statistics_are_computed_locally() {
    let script = Arc::new(Script::default());
    script.bogus_answers.store(1, Ordering::SeqCst);
    let service = scripted_service(script, false).await;
    let tasks = worklist();

    let stats = service.statistics(&tasks).await.unwrap();
    assert_eq!(stats, FallbackReasoner::default().statistics(&tasks));
    assert_eq!(stats.total, 4);
}

#[tokio::test]
async fn test_probe_reports_connection() {
    let service = scripted_service(Arc::new(Script::default()), true).await;
    let probe = service.probe().await;
    assert!(probe.success);
    assert_eq!(probe.connection_kind, Some(ConnectionKind::Pooled));
    assert!(probe.error.is_none());

    let script = Script::failing(BackendError::Timeout("x".to_string()));
    let failing = scripted_service(script, true).await;
    let probe = failing.probe().await;
    assert!(!probe.success);
    assert!(probe.error.unwrap().contains("timeout"));
}

#[tokio::test]
async fn test_closed_service_falls_back() {
    let service = scripted_service(Arc::new(Script::default()), true).await;
    service.close();

    let tasks = worklist();
    assert_eq!(service.next_recommended_task(&tasks).await.unwrap(), Some("fix".to_string()));
    assert_eq!(service.fallback_invocations(), 1);

    let history = service.monitor().history().await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.connection_id.is_none()));
}

#[tokio::test]
async fn test_set_knowledge_base_updates_pool() {
    let service = scripted_service(Arc::new(Script::default()), true).await;
    let generation = service
        .set_knowledge_base("(rule one)\n; note\n(rule two)")
        .await
        .unwrap();
    assert_eq!(generation, 1);

    let status = service.service_status().await;
    assert_eq!(status.pool.knowledge_base_expressions, 2);
    assert_eq!(status.backend, "scripted");

    assert!(matches!(
        service.set_knowledge_base("(unclosed").await,
        Err(ReasonerError::KnowledgeBase(_))
    ));
}

#[tokio::test]
async fn test_service_loads_knowledge_base_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("rules.kb");
    std::fs::write(&path, "(rule a) (rule b) (rule c)").unwrap();

    let config = SchedulerServiceConfig {
        knowledge_base_path: Some(path),
        ..service_config(true)
    };
    let monitor = Arc::new(OperationMonitor::new(MonitorConfig::default()));
    let service = SchedulerService::new(config, Arc::new(FactBackendFactory::default()), monitor)
        .await
        .unwrap();
    assert_eq!(service.service_status().await.pool.knowledge_base_expressions, 3);
}

#[tokio::test]
async fn test_export_diagnostics_through_service() {
    let dir = tempfile::TempDir::new().unwrap();
    let service = scripted_service(Arc::new(Script::default()), true).await;
    service.ready_task_ids(&worklist()).await.unwrap();

    let path = dir.path().join("diag.json.gz");
    service.export_diagnostics(&path).await.unwrap();
    let report = crate::monitor::load_diagnostics(&path).await.unwrap();
    assert_eq!(report.operation_history.len(), 1);
    assert_eq!(report.operation_history[0].operation_name, "get_ready_tasks");
}
