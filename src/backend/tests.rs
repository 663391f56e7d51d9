use crate::backend::*;
use crate::reasoner::TaskStatistics;
use crate::task::{Task, TaskId, TaskPriority};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend that records every knowledge-base expression it receives
struct RecordingBackend {
    id: ConnectionId,
    loaded: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl ReasoningBackend for RecordingBackend {
    async fn load_expression(&mut self, expression: &str) -> Result<(), BackendError> {
        self.loaded
            .lock()
            .unwrap()
            .push((self.id.to_string(), expression.to_string()));
        Ok(())
    }

    async fn ingest(&mut self, _tasks: &[Task]) -> Result<(), BackendError> {
        Ok(())
    }

    async fn next_task(&mut self) -> Result<Option<TaskId>, BackendError> {
        Ok(None)
    }

    async fn ready_tasks(&mut self) -> Result<Vec<TaskId>, BackendError> {
        Ok(Vec::new())
    }

    async fn has_circular_dependency(&mut self, _task_id: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn urgency(&mut self, _task_id: &str) -> Result<f64, BackendError> {
        Ok(0.0)
    }

    async fn statistics(&mut self) -> Result<Option<TaskStatistics>, BackendError> {
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingFactory {
    loaded: Arc<Mutex<Vec<(String, String)>>>,
    connects: AtomicUsize,
}

impl RecordingFactory {
    fn expressions_for(&self, id: &ConnectionId) -> Vec<String> {
        self.loaded
            .lock()
            .unwrap()
            .iter()
            .filter(|(conn, _)| conn == id.as_str())
            .map(|(_, expr)| expr.clone())
            .collect()
    }
}

#[async_trait]
impl BackendFactory for RecordingFactory {
    async fn connect(&self, id: &ConnectionId) -> Result<Box<dyn ReasoningBackend>, BackendError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingBackend {
            id: id.clone(),
            loaded: Arc::clone(&self.loaded),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

fn pool_config(pool_size: usize) -> PoolConfig {
    PoolConfig {
        pool_size,
        checkout_timeout: Duration::from_millis(200),
        staleness_threshold: Duration::from_secs(30),
    }
}

async fn fact_pool(config: PoolConfig) -> ConnectionPool {
    ConnectionPool::new(Arc::new(FactBackendFactory::default()), config, KnowledgeBase::default())
        .await
        .unwrap()
}

fn sample_tasks() -> Vec<Task> {
    let now = Utc::now();
    vec![
        Task::new("write", "Write report", now + ChronoDuration::days(2), TaskPriority::High, 60),
        Task::new(
            "review",
            "Review report",
            now + ChronoDuration::days(3),
            TaskPriority::Medium,
            30,
        )
        .with_dependencies(["write"]),
    ]
}

// Knowledge-base parsing

#[test]
fn test_parse_splits_top_level_expressions() {
    let content = r#"
(defrule overdue (task ?id) => (assert (late ?id)))
(deffacts start (phase "setup (initial)"))
"#;
    let expressions = parse_expressions(content).unwrap();
    assert_eq!(
        expressions,
        vec![
            "(defrule overdue (task ?id) => (assert (late ?id)))".to_string(),
            r#"(deffacts start (phase "setup (initial)"))"#.to_string(),
        ]
    );
}

#[test]
fn test_parse_skips_comments() {
    let content = "# header comment\n\
                   ; full line comment\n\
                   (fact one) ; trailing (comment\n\
                   (fact \"two ; not a comment\")\n";
    let expressions = parse_expressions(content).unwrap();
    assert_eq!(
        expressions,
        vec!["(fact one)".to_string(), "(fact \"two ; not a comment\")".to_string()]
    );
}

#[test]
fn test_parse_keeps_semicolon_inside_expression() {
    let expressions = parse_expressions("(url \"http://x\" a;b)\n(ok) ; done\n").unwrap();
    assert_eq!(
        expressions,
        vec!["(url \"http://x\" a;b)".to_string(), "(ok)".to_string()]
    );

    let multiline = parse_expressions("(rule\n  ; note (\n  x)").unwrap();
    assert_eq!(multiline, vec!["(rule\n  \n  x)".to_string()]);
}

#[test]
fn test_parse_keeps_escapes_and_negation_prefix() {
    let content = r#"! (blocked "quote \" and \) paren") (ok)"#;
    let expressions = parse_expressions(content).unwrap();
    assert_eq!(
        expressions,
        vec![r#"!(blocked "quote \" and \) paren")"#.to_string(), "(ok)".to_string()]
    );

    let attached = parse_expressions("!(not (done x))").unwrap();
    assert_eq!(attached, vec!["!(not (done x))".to_string()]);
}

#[test]
fn test_parse_reports_line_numbers() {
    match parse_expressions("(ok)\n(open (nested)\n") {
        Err(KnowledgeBaseError::Unbalanced { line }) => assert_eq!(line, 2),
        other => panic!("unexpected result: {:?}", other),
    }

    match parse_expressions("(ok)\n\n(a \"never closed)\n") {
        Err(KnowledgeBaseError::UnterminatedString { line }) => assert_eq!(line, 3),
        other => panic!("unexpected result: {:?}", other),
    }

    match parse_expressions("(ok))") {
        Err(KnowledgeBaseError::UnexpectedClose { line }) => assert_eq!(line, 1),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_load_knowledge_base_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("rules.kb");
    std::fs::write(&path, "(rule a)\n(rule b)\n").unwrap();

    let kb = load_knowledge_base(&path).unwrap();
    assert_eq!(kb.len(), 2);
    assert_eq!(kb.expressions()[1], "(rule b)");

    let missing = load_knowledge_base(dir.path().join("missing.kb"));
    assert!(matches!(missing, Err(KnowledgeBaseError::Io(_))));
}

// Connection pool

#[tokio::test]
async fn test_pool_starts_with_idle_connections() {
    let pool = fact_pool(pool_config(3)).await;
    let status = pool.status();
    assert_eq!(status.idle, 3);
    assert_eq!(status.members, 3);
    assert_eq!(status.checked_out, 0);
}

#[tokio::test]
async fn test_checkout_returns_connection_on_drop() {
    let pool = fact_pool(pool_config(2)).await;

    let conn = pool.checkout(Duration::from_millis(50)).await.unwrap();
    assert_eq!(conn.kind(), ConnectionKind::Pooled);
    assert!(conn.id().as_str().starts_with("pooled-"));
    assert_eq!(pool.status().idle, 1);
    assert_eq!(pool.status().checked_out, 1);

    drop(conn);
    let status = pool.status();
    assert_eq!(status.idle, 2);
    assert_eq!(status.checked_out, 0);
    assert_eq!(status.discarded, 0);
}

#[tokio::test]
async fn test_exhausted_pool_creates_temporary_connections() {
    let pool = fact_pool(pool_config(2)).await;
    let timeout = Duration::from_millis(20);

    let first = pool.checkout(timeout).await.unwrap();
    let second = pool.checkout(timeout).await.unwrap();
    let third = pool.checkout(timeout).await.unwrap();

    assert_eq!(first.kind(), ConnectionKind::Pooled);
    assert_eq!(second.kind(), ConnectionKind::Pooled);
    assert_eq!(third.kind(), ConnectionKind::Temporary);
    assert!(third.id().as_str().starts_with("temp-"));
    assert_eq!(pool.status().checked_out, 3);

    drop(third);
    drop(second);
    drop(first);

    let status = pool.status();
    assert_eq!(status.idle, 2);
    assert_eq!(status.members, 2);
    assert_eq!(status.temporary_created, 1);
    assert_eq!(status.total_checkouts, 3);
}

#[tokio::test]
async fn test_waiting_checkout_receives_returned_connection() {
    let pool = fact_pool(pool_config(1)).await;
    let held = pool.checkout(Duration::from_millis(10)).await.unwrap();
    let held_id = held.id().clone();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout(Duration::from_secs(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(held);

    let conn = waiter.await.unwrap().unwrap();
    assert_eq!(conn.kind(), ConnectionKind::Pooled);
    assert_eq!(conn.id(), &held_id);
    assert_eq!(pool.status().temporary_created, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_idle_never_exceeds_pool_size_under_load() {
    let pool_size = 3;
    let pool = fact_pool(pool_config(pool_size)).await;
    let tasks = Arc::new(sample_tasks());

    let mut handles = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        let tasks = Arc::clone(&tasks);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                let mut conn = pool.checkout(Duration::from_millis(5)).await.unwrap();
                conn.backend().ingest(&tasks).await.unwrap();
                conn.backend().next_task().await.unwrap();
                assert!(pool.status().idle <= pool_size);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let status = pool.status();
    assert!(status.idle <= pool_size);
    assert_eq!(status.members, pool_size);
    assert_eq!(status.checked_out, 0);
    assert_eq!(status.total_checkouts, 120);
}

#[tokio::test]
async fn test_stale_connection_is_discarded_and_replenished() {
    let config = PoolConfig {
        staleness_threshold: Duration::ZERO,
        ..pool_config(2)
    };
    let pool = fact_pool(config).await;

    let conn = pool.checkout(Duration::from_millis(50)).await.unwrap();
    let stale_id = conn.id().clone();
    drop(conn);

    assert!(pool.wait_for_members(Duration::from_secs(2)).await);
    let status = pool.status();
    assert_eq!(status.discarded, 1);
    assert!(status.replenished >= 1);
    assert_eq!(status.members, 2);
    assert!(status.idle <= 2);

    let mut ids = Vec::new();
    for _ in 0..2 {
        ids.push(pool.checkout(Duration::from_millis(50)).await.unwrap());
    }
    assert!(ids.iter().all(|conn| conn.id() != &stale_id));
}

#[tokio::test]
async fn test_connections_are_loaded_with_knowledge_base() {
    let factory = Arc::new(RecordingFactory::default());
    let kb = KnowledgeBase::parse("(rule one)\n(rule two)").unwrap();
    let pool = ConnectionPool::new(factory.clone(), pool_config(1), kb).await.unwrap();

    let conn = pool.checkout(Duration::from_millis(10)).await.unwrap();
    assert_eq!(
        factory.expressions_for(conn.id()),
        vec!["(rule one)".to_string(), "(rule two)".to_string()]
    );

    // The only member is busy, so this one is temporary and still loaded
    let temp = pool.checkout(Duration::from_millis(10)).await.unwrap();
    assert_eq!(temp.kind(), ConnectionKind::Temporary);
    assert_eq!(factory.expressions_for(temp.id()).len(), 2);
}

#[tokio::test]
async fn test_set_knowledge_base_rebuilds_connections() {
    let factory = Arc::new(RecordingFactory::default());
    let pool = ConnectionPool::new(
        factory.clone(),
        pool_config(2),
        KnowledgeBase::parse("(old)").unwrap(),
    )
    .await
    .unwrap();
    let held = pool.checkout(Duration::from_millis(10)).await.unwrap();
    let held_id = held.id().clone();

    let generation = pool
        .set_knowledge_base(KnowledgeBase::parse("(new a) (new b)").unwrap())
        .await;
    assert_eq!(generation, 1);

    // Idle member was rebuilt right away with the new content
    let fresh = pool.checkout(Duration::from_millis(10)).await.unwrap();
    assert_eq!(
        factory.expressions_for(fresh.id()),
        vec!["(new a)".to_string(), "(new b)".to_string()]
    );
    drop(fresh);

    // The member checked out before the change is not reused
    drop(held);
    assert!(pool.wait_for_members(Duration::from_secs(2)).await);
    let status = pool.status();
    assert_eq!(status.knowledge_base_generation, 1);
    assert_eq!(status.knowledge_base_expressions, 2);
    assert_eq!(status.members, 2);

    let a = pool.checkout(Duration::from_millis(50)).await.unwrap();
    let b = pool.checkout(Duration::from_millis(50)).await.unwrap();
    assert_ne!(a.id(), &held_id);
    assert_ne!(b.id(), &held_id);
}

#[tokio::test]
async fn test_closed_pool_rejects_checkout_and_discards_returns() {
    let pool = fact_pool(pool_config(2)).await;
    let conn = pool.checkout(Duration::from_millis(10)).await.unwrap();

    pool.close();
    assert!(pool.is_closed());
    assert_eq!(pool.status().idle, 0);

    drop(conn);
    let status = pool.status();
    assert_eq!(status.idle, 0);
    assert_eq!(status.members, 0);
    assert!(matches!(
        pool.checkout(Duration::from_millis(10)).await,
        Err(BackendError::Unavailable(_))
    ));
}

// Fact backend

#[tokio::test]
async fn test_fact_backend_answers_from_ingested_tasks() {
    let factory = FactBackendFactory::default();
    let mut backend = factory
        .connect(&ConnectionId::new(ConnectionKind::Pooled))
        .await
        .unwrap();

    backend.ingest(&sample_tasks()).await.unwrap();
    assert_eq!(backend.next_task().await.unwrap(), Some("write".to_string()));
    assert_eq!(backend.ready_tasks().await.unwrap(), vec!["write".to_string()]);
    assert!(!backend.has_circular_dependency("review").await.unwrap());
    assert!(backend.urgency("write").await.unwrap() > backend.urgency("review").await.unwrap());
    assert_eq!(backend.urgency("unknown").await.unwrap(), 0.0);

    let stats = backend.statistics().await.unwrap().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.ready, 1);
}

#[tokio::test]
async fn test_fact_backend_rejects_malformed_task_ids() {
    let mut backend = FactBackendFactory::default()
        .connect(&ConnectionId::new(ConnectionKind::Pooled))
        .await
        .unwrap();

    for bad in ["", "has space", "paren)"] {
        let err = backend.urgency(bad).await.unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::MalformedQuery);
    }
}

#[tokio::test]
async fn test_fact_backend_overlapping_ingests_conflict() {
    let faults = FaultProfile {
        latency: Duration::from_millis(50),
        exclusive_space: true,
        ..Default::default()
    };
    let factory = FactBackendFactory::with_faults(Default::default(), faults);
    let mut first = factory
        .connect(&ConnectionId::new(ConnectionKind::Pooled))
        .await
        .unwrap();
    let mut second = factory
        .connect(&ConnectionId::new(ConnectionKind::Pooled))
        .await
        .unwrap();
    let tasks = sample_tasks();

    let (a, b) = tokio::join!(first.ingest(&tasks), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        second.ingest(&tasks).await
    });
    assert!(a.is_ok());
    assert!(b.unwrap_err().is_contention());

    // The space is free again once the first ingest finished
    assert!(second.ingest(&tasks).await.is_ok());
}

#[tokio::test]
async fn test_fact_backend_injects_transient_failures() {
    let faults = FaultProfile {
        transient_rate: 1.0,
        ..Default::default()
    };
    assert!(faults.is_enabled());
    let mut backend = FactBackendFactory::with_faults(Default::default(), faults)
        .connect(&ConnectionId::new(ConnectionKind::Temporary))
        .await
        .unwrap();

    let err = backend.ready_tasks().await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::Timeout);
}
