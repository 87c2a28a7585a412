use std::sync::Arc;

use thiserror::Error;

/// Why a task outcome, or a control operation on a task, failed.
///
/// `Clone` so a single outcome can be delivered to every waiter of a task.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("Cannot pause a task that is not running")]
    NotRunning,

    #[error("Task not found")]
    NotFound,

    #[error("Cannot abort a task that is not running")]
    AbortNotRunning,

    #[error("Task canceled")]
    Canceled,

    #[error("Running task aborted")]
    RunningAborted,

    #[error("Paused task aborted")]
    PausedAborted,

    /// Raised by the work function itself; displayed verbatim.
    #[error("{0}")]
    Work(Arc<anyhow::Error>),

    #[error("task dropped before settling")]
    Dropped,
}

impl TaskError {
    /// True for the synthetic errors injected by the scheduler on cancel/abort.
    pub fn is_forced_termination(&self) -> bool {
        matches!(
            self,
            TaskError::Canceled | TaskError::RunningAborted | TaskError::PausedAborted
        )
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Work(Arc::new(err))
    }
}

/// Errors raised while loading a [`SchedulerConfig`](crate::SchedulerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
