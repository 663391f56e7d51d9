use crate::reasoner::types::{TaskRecommendation, TaskStatistics};
use crate::task::{ScoringConfig, Task, TaskId, TaskIndex, TaskPriority, TaskStatus, UrgencyScorer};
use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Deadline distance (in days) at which a recommendation mentions the due date
const DUE_SOON_DAYS: i64 = 3;

/// Backend-free scheduler answering every query from the task snapshot alone
#[derive(Debug, Clone, Default)]
pub struct FallbackReasoner {
    scorer: UrgencyScorer,
}

impl FallbackReasoner {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            scorer: UrgencyScorer::new(config),
        }
    }

    pub fn scorer(&self) -> &UrgencyScorer {
        &self.scorer
    }

    pub fn next_recommended_task(&self, tasks: &[Task]) -> Option<TaskId> {
        self.next_recommended_task_at(tasks, Utc::now())
    }

    /// Highest-urgency ready task.
    ///
    /// When nothing is ready every open task is a candidate, so a fully
    /// blocked worklist still gets a recommendation.
    pub fn next_recommended_task_at(&self, tasks: &[Task], now: DateTime<Utc>) -> Option<TaskId> {
        guarded("next_recommended_task", None, || {
            info!("Using fallback reasoner for next task recommendation");
            self.scorer
                .top(self.candidates(tasks), now)
                .map(|(task, score)| {
                    debug!("Fallback reasoner recommends task {} (score {:.2})", task.id, score);
                    task.id.clone()
                })
        })
    }

    pub fn ready_task_ids(&self, tasks: &[Task]) -> Vec<TaskId> {
        guarded("ready_task_ids", Vec::new(), || crate::task::ready_task_ids(tasks))
    }

    pub fn has_circular_dependency(&self, task_id: &str, tasks: &[Task]) -> bool {
        guarded("has_circular_dependency", false, || crate::task::has_cycle(task_id, tasks))
    }

    pub fn urgency(&self, task_id: &str, tasks: &[Task]) -> f64 {
        self.urgency_at(task_id, tasks, Utc::now())
    }

    /// Urgency of a single task; 0.0 when the id is unknown
    pub fn urgency_at(&self, task_id: &str, tasks: &[Task], now: DateTime<Utc>) -> f64 {
        guarded("urgency", 0.0, || {
            tasks
                .iter()
                .find(|task| task.id == task_id)
                .map(|task| self.scorer.score(task, now))
                .filter(|score| score.is_finite())
                .unwrap_or(0.0)
        })
    }

    pub fn statistics(&self, tasks: &[Task]) -> TaskStatistics {
        self.statistics_at(tasks, Utc::now())
    }

    pub fn statistics_at(&self, tasks: &[Task], now: DateTime<Utc>) -> TaskStatistics {
        guarded("statistics", TaskStatistics::total_only(tasks.len()), || {
            let index = TaskIndex::new(tasks);
            let mut stats = TaskStatistics {
                total: tasks.len(),
                ..Default::default()
            };

            for task in tasks {
                match task.status {
                    TaskStatus::Completed => stats.completed += 1,
                    TaskStatus::Pending => stats.pending += 1,
                    TaskStatus::InProgress => stats.in_progress += 1,
                }
                if task.is_overdue(now) {
                    stats.overdue += 1;
                }
                if index.is_ready(task) {
                    stats.ready += 1;
                }
                if task.priority == TaskPriority::High && !task.is_completed() {
                    stats.high_priority_pending += 1;
                }
            }

            stats
        })
    }

    pub fn recommendations(&self, tasks: &[Task], limit: usize) -> Vec<TaskRecommendation> {
        self.recommendations_at(tasks, limit, Utc::now())
    }

    /// Up to `limit` candidates ranked by urgency, each with the reasons behind its rank
    pub fn recommendations_at(
        &self,
        tasks: &[Task],
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<TaskRecommendation> {
        guarded("recommendations", Vec::new(), || {
            self.scorer
                .rank(self.candidates(tasks), now)
                .into_iter()
                .take(limit)
                .map(|(task, score)| TaskRecommendation {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    urgency_score: score,
                    reasons: self.reasons(task, now),
                    deadline: task.deadline,
                    priority: task.priority,
                })
                .collect()
        })
    }

    fn reasons(&self, task: &Task, now: DateTime<Utc>) -> Vec<String> {
        let mut reasons = Vec::new();
        if task.priority == TaskPriority::High {
            reasons.push("High priority task".to_string());
        }

        let days = UrgencyScorer::days_until_deadline(task, now);
        if days < 0 {
            reasons.push(format!("Overdue by {} days", days.unsigned_abs()));
        } else if days <= DUE_SOON_DAYS {
            reasons.push(format!("Due in {days} days"));
        }

        if task.duration_hours() <= self.scorer.config().quick_win_hours {
            reasons.push("Quick win (<= 1 hour)".to_string());
        }
        reasons
    }

    /// Ready open tasks, or every open task when none is ready
    fn candidates<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let index = TaskIndex::new(tasks);
        let open: Vec<&Task> = tasks.iter().filter(|task| !task.is_completed()).collect();
        let ready: Vec<&Task> = open.iter().copied().filter(|task| index.is_ready(task)).collect();
        if ready.is_empty() { open } else { ready }
    }
}

/// Run a fallback computation, converting a panic into the query's safe default
fn guarded<T>(operation: &str, default: T, compute: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(compute)) {
        Ok(value) => value,
        Err(_) => {
            error!("Fallback reasoner failed in {}, returning safe default", operation);
            default
        }
    }
}
