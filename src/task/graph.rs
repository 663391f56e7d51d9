//! Dependency graph analysis over a task snapshot.
//!
//! Dependency ids that are not part of the snapshot are dead ends for cycle
//! detection and count as satisfied for readiness. The permissive readiness
//! policy lets a task whose prerequisite was deleted become workable again
//! instead of staying blocked forever.

use crate::task::types::{Task, TaskId};
use std::collections::{HashMap, HashSet};

/// Id-indexed view over a task snapshot
pub struct TaskIndex<'a> {
    tasks: HashMap<&'a str, &'a Task>,
}

impl<'a> TaskIndex<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        Self {
            tasks: tasks.iter().map(|task| (task.id.as_str(), task)).collect(),
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&'a Task> {
        self.tasks.get(task_id).copied()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    fn dependencies_of(&self, task_id: &str) -> &'a [TaskId] {
        self.get(task_id)
            .map(|task| task.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// A dependency is satisfied when it is missing from the snapshot or completed
    pub fn is_satisfied(&self, dependency_id: &str) -> bool {
        self.get(dependency_id).is_none_or(Task::is_completed)
    }

    /// A task is ready when it is open and all its dependencies are satisfied
    pub fn is_ready(&self, task: &Task) -> bool {
        !task.is_completed() && task.dependencies.iter().all(|dep| self.is_satisfied(dep))
    }

    /// Check whether a dependency cycle is reachable from `task_id`.
    ///
    /// Depth-first search with a visited set and a recursion-stack set. The
    /// traversal uses an explicit stack so long dependency chains cannot
    /// exhaust the thread stack.
    pub fn has_cycle(&self, task_id: &str) -> bool {
        let Some(start) = self.get(task_id) else {
            return false;
        };
        if start.dependencies.is_empty() {
            return false;
        }

        let start = start.id.as_str();
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut on_stack: HashSet<&str> = HashSet::from([start]);
        // (node, index of the next dependency to explore)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            frame.1 += 1;

            match self.dependencies_of(node).get(cursor) {
                Some(dep) => {
                    let dep = dep.as_str();
                    if on_stack.contains(dep) {
                        return true;
                    }
                    if visited.insert(dep) {
                        on_stack.insert(dep);
                        stack.push((dep, 0));
                    }
                }
                None => {
                    on_stack.remove(node);
                    stack.pop();
                }
            }
        }

        false
    }
}

/// Check if a task participates in (or leads into) a circular dependency
pub fn has_cycle(task_id: &str, tasks: &[Task]) -> bool {
    TaskIndex::new(tasks).has_cycle(task_id)
}

/// Ids of all ready tasks
pub fn ready_tasks(tasks: &[Task]) -> HashSet<TaskId> {
    ready_task_ids(tasks).into_iter().collect()
}

/// Ids of all ready tasks, in snapshot order
pub fn ready_task_ids(tasks: &[Task]) -> Vec<TaskId> {
    let index = TaskIndex::new(tasks);
    tasks
        .iter()
        .filter(|task| index.is_ready(task))
        .map(|task| task.id.clone())
        .collect()
}

/// Dependency edges as `(dependency, dependent)` pairs, in snapshot order
pub fn dependency_edges(tasks: &[Task]) -> Vec<(TaskId, TaskId)> {
    tasks
        .iter()
        .flat_map(|task| {
            task.dependencies
                .iter()
                .map(move |dep| (dep.clone(), task.id.clone()))
        })
        .collect()
}
