use crate::task::{TaskId, TaskPriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate counts over a task snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
    /// Open tasks whose deadline has passed
    pub overdue: usize,
    pub ready: usize,
    pub high_priority_pending: usize,
}

impl TaskStatistics {
    /// Statistics for a snapshot that could not be analysed, carrying only the total
    pub fn total_only(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }
}

/// A scored recommendation with human-readable reasons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecommendation {
    pub task_id: TaskId,
    pub title: String,
    pub urgency_score: f64,
    pub reasons: Vec<String>,
    pub deadline: DateTime<Utc>,
    pub priority: TaskPriority,
}
