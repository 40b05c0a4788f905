//! The Task message and the two pieces of process-wide state the Tasks
//! scheduler keeps around it: `TaskIdGenerator` (monotonic 10^-7s ids, as
//! the original's `TaskMaker.task_id` produces) and `PendingTaskCache`
//! (continuations keyed by parent task id).
//!
//! Grounded on `original_source/apps/sys/Tasks.py` (`TaskMaker`,
//! `PendingTaskCache`) and `original_source/apps/AppRunner.py`'s reliance
//! on a Task having exactly these fields.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a single Worker's `run_task` call, appended to `Task::results`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskResult {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            payload,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            payload: serde_json::Value::Null,
        }
    }
}

/// A transient message routed between Workers and the Tasks scheduler.
///
/// Identity is `id`; a Task is never mutated after emission except by
/// appending to `results` (the latest entry is the authoritative outcome).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub app_name: String,
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub results: Vec<TaskResult>,
}

impl Task {
    pub fn new(id: String, app_name: impl Into<String>, action: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id,
            app_name: app_name.into(),
            action: action.into(),
            args,
            results: Vec::new(),
        }
    }

    /// The most recent outcome recorded against this task, if any.
    pub fn last_result(&self) -> Option<&TaskResult> {
        self.results.last()
    }

    pub fn succeeded(&self) -> bool {
        self.last_result().map(|r| r.success).unwrap_or(false)
    }
}

/// Generates task ids as a monotonic count of 10^-7-second ticks since the
/// epoch, matching `TaskMaker.task_id`'s `int(time() * 10_000_000)`.
/// Monotonicity across rapid calls (well under 100ns apart, which a
/// single-threaded scheduler cycle never achieves) is enforced by bumping
/// past the last-issued value rather than trusting wall-clock resolution.
pub struct TaskIdGenerator {
    last: AtomicI64,
}

impl Default for TaskIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self { last: AtomicI64::new(0) }
    }

    pub fn next_id(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_nanos() as i64
            / 100; // nanoseconds -> 10^-7s ticks
        let mut candidate = now;
        loop {
            let last = self.last.load(Ordering::SeqCst);
            if candidate <= last {
                candidate = last + 1;
            }
            if self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate.to_string();
            }
        }
    }

    pub fn make(&self, app_name: impl Into<String>, action: impl Into<String>, args: serde_json::Value) -> Task {
        Task::new(self.next_id(), app_name, action, args)
    }
}

/// `pending[parent_task_id] = [successor_task, ...]`. A successor set is
/// released exactly when its parent task returns with
/// `result.success == true` (see `check_in`).
#[derive(Default)]
pub struct PendingTaskCache {
    pending: HashMap<String, Vec<Task>>,
}

impl PendingTaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `successors` to be released when `parent_task_id` completes.
    pub fn register(&mut self, parent_task_id: impl Into<String>, successors: Vec<Task>) {
        self.pending.insert(parent_task_id.into(), successors);
    }

    /// Pop and return the continuation for `task_id`, or an empty vec if
    /// there is none registered.
    pub fn check_in(&mut self, task_id: &str) -> Vec<Task> {
        self.pending.remove(task_id).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.pending.contains_key(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let gen = TaskIdGenerator::new();
        let a = gen.next_id().parse::<i64>().unwrap();
        let b = gen.next_id().parse::<i64>().unwrap();
        let c = gen.next_id().parse::<i64>().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn pending_cache_check_in_releases_once() {
        let mut cache = PendingTaskCache::new();
        let successor = Task::new("2".into(), "file_mover", "remove", serde_json::json!({}));
        cache.register("1", vec![successor]);
        assert!(cache.contains("1"));
        let released = cache.check_in("1");
        assert_eq!(released.len(), 1);
        assert!(!cache.contains("1"));
        assert!(cache.check_in("1").is_empty());
    }
}
