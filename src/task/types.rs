use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for tasks, assigned by the storage layer
pub type TaskId = String;

/// Core task structure as handed over by the storage layer for a single query
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "timestamp")]
    pub deadline: DateTime<Utc>,
    pub priority: TaskPriority,
    /// Estimated duration in minutes
    pub duration: u32,
    #[serde(default)]
    pub status: TaskStatus,
    /// Ids this task depends on. Ids that are not part of the snapshot are allowed.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Task priority levels
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

/// Task lifecycle status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl Task {
    /// Create a pending task without dependencies
    pub fn new(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        deadline: DateTime<Utc>,
        priority: TaskPriority,
        duration: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            deadline,
            priority,
            duration,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            completed_at: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        if status == TaskStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// A task is overdue when it is still open and its deadline lies before `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed() && self.deadline < now
    }

    /// Duration expressed in hours
    pub fn duration_hours(&self) -> f64 {
        f64::from(self.duration) / 60.0
    }

    /// Render the task as a backend fact expression:
    /// `(task <id> "<title>" "<date>" <Priority> <minutes> <Status> (<deps>))`
    pub fn to_fact(&self) -> String {
        format!(
            "(task {} \"{}\" \"{}\" {} {} {} ({}))",
            self.id,
            escape_fact_string(&self.title),
            self.deadline.format("%Y-%m-%d"),
            self.priority,
            self.duration,
            self.status,
            self.dependencies.join(" ")
        )
    }
}

fn escape_fact_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPriority::High => "High",
            TaskPriority::Medium => "Medium",
            TaskPriority::Low => "Low",
        };
        f.write_str(name)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Completed => "Completed",
        };
        f.write_str(name)
    }
}

/// Parse a timestamp in any of the accepted forms and normalize it to UTC.
///
/// Accepted: RFC 3339 with offset, naive `YYYY-MM-DDTHH:MM:SS[.f]` (also with a
/// space separator) and bare `YYYY-MM-DD`. Naive values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Serde adapter accepting offset-aware and naive timestamps
pub mod timestamp {
    use super::parse_timestamp;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use super::super::parse_timestamp;
        use chrono::{DateTime, SecondsFormat, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de::Error};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => {
                    serializer.serialize_some(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}
