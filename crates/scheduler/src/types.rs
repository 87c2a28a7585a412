use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Process-unique task identifier, assigned in construction order.
pub type TaskKey = u64;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for a concurrency slot.
    Pending,
    /// The work function is executing.
    Running,
    /// Pulled out of scheduling until resumed.
    Paused,
    /// Terminal. Removed from the queue by cancel or abort.
    Canceled,
    /// Terminal. The work function settled on its own.
    Completed,
}

impl TaskStatus {
    /// Paused or canceled: cooperative work should stop at its next checkpoint.
    pub fn is_interrupted(self) -> bool {
        matches!(self, TaskStatus::Paused | TaskStatus::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority. Higher values are admitted first.
#[derive(Clone)]
pub enum Priority {
    Fixed(f64),
    /// Re-evaluated every time the queue compares entries.
    Dynamic(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl Priority {
    pub fn dynamic<F>(evaluator: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Priority::Dynamic(Arc::new(evaluator))
    }

    /// Resolve the current numeric priority.
    pub fn value(&self) -> f64 {
        match self {
            Priority::Fixed(value) => *value,
            Priority::Dynamic(evaluator) => evaluator(),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Fixed(0.0)
    }
}

impl fmt::Debug for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Priority::Dynamic(_) => f.debug_tuple("Dynamic").field(&self.value()).finish(),
        }
    }
}

impl From<f64> for Priority {
    fn from(value: f64) -> Self {
        Priority::Fixed(value)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority::Fixed(f64::from(value))
    }
}

/// Introspection record for a task registered on a queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub key: TaskKey,
    pub queue: String,
    pub priority: f64,
    pub status: TaskStatus,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[test]
    fn interrupted_states() {
        assert!(TaskStatus::Paused.is_interrupted());
        assert!(TaskStatus::Canceled.is_interrupted());
        assert!(!TaskStatus::Pending.is_interrupted());
        assert!(!TaskStatus::Running.is_interrupted());
        assert!(!TaskStatus::Completed.is_interrupted());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
        assert_eq!(TaskStatus::Running.to_string(), "running");
    }

    #[test]
    fn dynamic_priority_is_reevaluated() {
        let source = Arc::new(AtomicU64::new(1));
        let reader = Arc::clone(&source);
        let priority = Priority::dynamic(move || reader.load(Ordering::Relaxed) as f64);

        assert_eq!(priority.value(), 1.0);
        source.store(7, Ordering::Relaxed);
        assert_eq!(priority.value(), 7.0);
    }

    #[test]
    fn fixed_priority_conversions() {
        assert_eq!(Priority::from(3).value(), 3.0);
        assert_eq!(Priority::from(2.5).value(), 2.5);
        assert_eq!(Priority::default().value(), 0.0);
    }
}
