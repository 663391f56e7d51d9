//! Task snapshot loading
//!
//! Task-consuming commands read a JSON array of tasks. Every task needs a
//! non-empty id, unique within the file; timestamps are normalized to UTC.

use crate::task::Task;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("File '{path}' is not UTF-8 encoded: {hint}")]
    NotUtf8 { path: PathBuf, hint: String },

    #[error("File '{path}' not found")]
    NotFound { path: PathBuf },

    #[error("IO error reading '{path}': {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Task parsing error in '{path}': {reason}")]
    ParseError { path: PathBuf, reason: String },
}

/// Loads task snapshots from disk
pub struct TaskLoader;

impl TaskLoader {
    pub fn load_tasks<P: AsRef<Path>>(path: P) -> Result<Vec<Task>, FileError> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading tasks from: {:?}", path);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                return Err(match e.kind() {
                    std::io::ErrorKind::NotFound => FileError::NotFound { path },
                    std::io::ErrorKind::InvalidData => FileError::NotUtf8 {
                        path,
                        hint: "Task files must be UTF-8 encoded JSON.".to_string(),
                    },
                    _ => FileError::IoError { path, source: e },
                });
            }
        };

        let tasks = Self::parse_tasks(&content).map_err(|reason| FileError::ParseError {
            path: path.clone(),
            reason,
        })?;
        debug!("Loaded {} tasks from {:?}", tasks.len(), path);
        Ok(tasks)
    }

    /// Parse and validate a JSON task array
    pub fn parse_tasks(content: &str) -> Result<Vec<Task>, String> {
        let tasks: Vec<Task> = serde_json::from_str(content).map_err(|e| e.to_string())?;

        let mut seen = HashSet::new();
        for task in &tasks {
            if task.id.trim().is_empty() {
                return Err(format!("task '{}' has an empty id", task.title));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(format!("duplicate task id '{}'", task.id));
            }
        }

        for task in &tasks {
            for dependency in &task.dependencies {
                if !seen.contains(dependency.as_str()) {
                    warn!(
                        "Task {} depends on unknown task {}, treating it as satisfied",
                        task.id, dependency
                    );
                }
            }
        }

        Ok(tasks)
    }
}
