use crate::task::types::{Task, TaskPriority};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// Weights for the urgency scoring heuristic
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub high_priority_weight: f64,
    pub medium_priority_weight: f64,
    pub low_priority_weight: f64,
    /// Days before the deadline at which a task starts gaining urgency
    pub urgency_window_days: i64,
    /// Added per overdue day
    pub overdue_penalty: f64,
    /// Maximum bonus for an approaching deadline
    pub approaching_deadline_bonus: f64,
    pub quick_win_hours: f64,
    pub quick_win_bonus: f64,
    pub long_task_hours: f64,
    pub long_task_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_priority_weight: 3.0,
            medium_priority_weight: 2.0,
            low_priority_weight: 1.0,
            urgency_window_days: 7,
            overdue_penalty: 5.0,
            approaching_deadline_bonus: 2.0,
            quick_win_hours: 1.0,
            quick_win_bonus: 0.5,
            long_task_hours: 8.0,
            long_task_penalty: 0.2,
        }
    }
}

/// Computes urgency scores from priority, deadline proximity and duration
#[derive(Clone, Debug, Default)]
pub struct UrgencyScorer {
    config: ScoringConfig,
}

impl UrgencyScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn priority_weight(&self, priority: TaskPriority) -> f64 {
        match priority {
            TaskPriority::High => self.config.high_priority_weight,
            TaskPriority::Medium => self.config.medium_priority_weight,
            TaskPriority::Low => self.config.low_priority_weight,
        }
    }

    /// Whole days until the deadline, rounded towards negative infinity.
    ///
    /// A deadline 36 hours in the past yields -2.
    pub fn days_until_deadline(task: &Task, now: DateTime<Utc>) -> i64 {
        let remaining = task.deadline.signed_duration_since(now);
        // num_seconds truncates toward zero; a fraction of a second past the
        // deadline already counts as a whole overdue day
        let mut seconds = remaining.num_seconds();
        if remaining < TimeDelta::seconds(seconds) {
            seconds -= 1;
        }
        seconds.div_euclid(SECONDS_PER_DAY)
    }

    /// Calculate the urgency score of a task at `now`
    pub fn score(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        let config = &self.config;
        let mut score = self.priority_weight(task.priority);

        let days = Self::days_until_deadline(task, now);
        if days < 0 {
            score += config.overdue_penalty * days.unsigned_abs() as f64;
        } else if days <= config.urgency_window_days && config.urgency_window_days > 0 {
            let window = config.urgency_window_days as f64;
            score += ((window - days as f64) / window) * config.approaching_deadline_bonus;
        }

        let hours = task.duration_hours();
        if hours <= config.quick_win_hours {
            score += config.quick_win_bonus;
        } else if hours >= config.long_task_hours {
            score -= config.long_task_penalty;
        }

        score
    }

    /// Score every task and sort by descending score.
    ///
    /// The sort is stable: equal scores keep snapshot order.
    pub fn rank<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task>,
        now: DateTime<Utc>,
    ) -> Vec<(&'a Task, f64)> {
        let mut scored: Vec<_> = tasks
            .into_iter()
            .map(|task| (task, self.score(task, now)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Highest scoring task; the first one in iteration order wins ties
    pub fn top<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task>,
        now: DateTime<Utc>,
    ) -> Option<(&'a Task, f64)> {
        let mut best: Option<(&Task, f64)> = None;
        for task in tasks {
            let score = self.score(task, now);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((task, score)),
            }
        }
        best
    }
}
