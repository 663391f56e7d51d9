//! In-process reasoning backend.
//!
//! The fact backend keeps loaded knowledge-base expressions and the ingested
//! task facts per connection and answers queries with the same heuristics as
//! the fallback reasoner. Optional fault injection makes it behave like a
//! shared external engine under load: transient failures, latency and
//! conflicting concurrent mutations of a single fact space.

use crate::backend::connection::{BackendFactory, ReasoningBackend};
use crate::backend::types::{BackendError, ConnectionId};
use crate::reasoner::{FallbackReasoner, TaskStatistics};
use crate::task::{ScoringConfig, Task, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Failure and latency injection for the fact backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaultProfile {
    /// Probability that an ingest fails with a contention error
    pub contention_rate: f64,
    /// Probability that any call fails with a timeout
    pub transient_rate: f64,
    /// Artificial delay applied to every call
    pub latency: Duration,
    /// Connections share one fact space; overlapping ingests conflict
    pub exclusive_space: bool,
}

impl FaultProfile {
    pub fn is_enabled(&self) -> bool {
        self.contention_rate > 0.0
            || self.transient_rate > 0.0
            || !self.latency.is_zero()
            || self.exclusive_space
    }
}

/// Creates [`FactBackend`] connections sharing one scoring configuration
#[derive(Debug, Clone)]
pub struct FactBackendFactory {
    scoring: ScoringConfig,
    faults: FaultProfile,
    space: Arc<AtomicBool>,
}

impl FactBackendFactory {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self::with_faults(scoring, FaultProfile::default())
    }

    pub fn with_faults(scoring: ScoringConfig, faults: FaultProfile) -> Self {
        Self {
            scoring,
            faults,
            space: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for FactBackendFactory {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

#[async_trait]
impl BackendFactory for FactBackendFactory {
    async fn connect(&self, id: &ConnectionId) -> Result<Box<dyn ReasoningBackend>, BackendError> {
        debug!("Opening fact backend connection {}", id);
        Ok(Box::new(FactBackend {
            id: id.clone(),
            reasoner: FallbackReasoner::new(self.scoring.clone()),
            faults: self.faults.clone(),
            space: Arc::clone(&self.space),
            expressions: Vec::new(),
            facts: Vec::new(),
            tasks: Vec::new(),
            ingested_at: Utc::now(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "fact"
    }
}

/// A single fact backend connection
pub struct FactBackend {
    id: ConnectionId,
    reasoner: FallbackReasoner,
    faults: FaultProfile,
    space: Arc<AtomicBool>,
    expressions: Vec<String>,
    facts: Vec<String>,
    tasks: Vec<Task>,
    ingested_at: DateTime<Utc>,
}

/// Exclusive claim on the shared fact space, released on drop
struct SpaceClaim(Arc<AtomicBool>);

impl Drop for SpaceClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FactBackend {
    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    /// Task facts from the last ingest, in snapshot order
    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    async fn simulate_call(&self, call: &str) -> Result<(), BackendError> {
        if !self.faults.latency.is_zero() {
            tokio::time::sleep(self.faults.latency).await;
        }
        if roll(self.faults.transient_rate) {
            return Err(BackendError::Timeout(format!(
                "{} on {} did not answer in time",
                call, self.id
            )));
        }
        Ok(())
    }

    fn claim_space(&self) -> Result<Option<SpaceClaim>, BackendError> {
        if roll(self.faults.contention_rate) {
            return Err(BackendError::Contention(format!(
                "fact space modified concurrently while {} was ingesting",
                self.id
            )));
        }
        if !self.faults.exclusive_space {
            return Ok(None);
        }
        self.space
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Some(SpaceClaim(Arc::clone(&self.space))))
            .map_err(|_| {
                BackendError::Contention(format!(
                    "fact space is being rewritten, {} must retry",
                    self.id
                ))
            })
    }

    fn check_task_id(task_id: &str) -> Result<(), BackendError> {
        let invalid = |c: char| c.is_whitespace() || c == '(' || c == ')';
        if task_id.is_empty() || task_id.contains(invalid) {
            return Err(BackendError::MalformedQuery(format!("invalid task id {:?}", task_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReasoningBackend for FactBackend {
    async fn load_expression(&mut self, expression: &str) -> Result<(), BackendError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(BackendError::MalformedQuery("empty expression".to_string()));
        }
        trace!("{} loading expression {}", self.id, expression);
        self.expressions.push(expression.to_string());
        Ok(())
    }

    async fn ingest(&mut self, tasks: &[Task]) -> Result<(), BackendError> {
        let _claim = self.claim_space()?;
        self.simulate_call("ingest").await?;

        self.facts = tasks.iter().map(Task::to_fact).collect();
        self.tasks = tasks.to_vec();
        self.ingested_at = Utc::now();
        debug!("{} ingested {} task facts", self.id, self.facts.len());
        Ok(())
    }

    async fn next_task(&mut self) -> Result<Option<TaskId>, BackendError> {
        self.simulate_call("next_task").await?;
        Ok(self.reasoner.next_recommended_task_at(&self.tasks, self.ingested_at))
    }

    async fn ready_tasks(&mut self) -> Result<Vec<TaskId>, BackendError> {
        self.simulate_call("ready_tasks").await?;
        Ok(self.reasoner.ready_task_ids(&self.tasks))
    }

    async fn has_circular_dependency(&mut self, task_id: &str) -> Result<bool, BackendError> {
        Self::check_task_id(task_id)?;
        self.simulate_call("has_circular_dependency").await?;
        Ok(self.reasoner.has_circular_dependency(task_id, &self.tasks))
    }

    async fn urgency(&mut self, task_id: &str) -> Result<f64, BackendError> {
        Self::check_task_id(task_id)?;
        self.simulate_call("urgency").await?;
        Ok(self.reasoner.urgency_at(task_id, &self.tasks, self.ingested_at))
    }

    async fn statistics(&mut self) -> Result<Option<TaskStatistics>, BackendError> {
        self.simulate_call("statistics").await?;
        Ok(Some(self.reasoner.statistics_at(&self.tasks, self.ingested_at)))
    }
}

fn roll(rate: f64) -> bool {
    rate > 0.0 && rand::random::<f64>() < rate
}
