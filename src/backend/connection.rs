use crate::backend::types::{BackendError, ConnectionId};
use crate::reasoner::TaskStatistics;
use crate::task::{Task, TaskId};
use async_trait::async_trait;

/// A stateful connection to a reasoning backend.
///
/// Connections are not safe for concurrent use: every operation takes
/// `&mut self`, and the pool hands a connection to one caller at a time.
/// Answers are typed; implementations must not return stringly encoded
/// results.
#[async_trait]
pub trait ReasoningBackend: Send {
    /// Load one knowledge-base expression (rule or fact)
    async fn load_expression(&mut self, expression: &str) -> Result<(), BackendError>;

    /// Replace the task facts the connection reasons over
    async fn ingest(&mut self, tasks: &[Task]) -> Result<(), BackendError>;

    /// Recommended next task among the ingested facts
    async fn next_task(&mut self) -> Result<Option<TaskId>, BackendError>;

    async fn ready_tasks(&mut self) -> Result<Vec<TaskId>, BackendError>;

    async fn has_circular_dependency(&mut self, task_id: &str) -> Result<bool, BackendError>;

    /// Urgency score; 0.0 for unknown tasks
    async fn urgency(&mut self, task_id: &str) -> Result<f64, BackendError>;

    /// Backend-side statistics, if the backend computes any
    async fn statistics(&mut self) -> Result<Option<TaskStatistics>, BackendError>;
}

/// Creates new backend connections for the pool
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self, id: &ConnectionId) -> Result<Box<dyn ReasoningBackend>, BackendError>;

    /// Backend name used in logs
    fn backend_name(&self) -> &'static str;
}
