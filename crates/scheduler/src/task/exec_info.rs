use tokio::sync::watch;

use crate::types::TaskStatus;

/// Live, read-only view of a task's status handed to its work function.
///
/// Work that wants to be pausable polls [`ExecInfo::is_interrupted`] at safe
/// points, or races its steps against [`ExecInfo::interrupted`], and returns
/// what it has so far once the task is paused or canceled.
#[derive(Debug, Clone)]
pub struct ExecInfo {
    status: watch::Receiver<TaskStatus>,
}

impl ExecInfo {
    pub(crate) fn new(status: watch::Receiver<TaskStatus>) -> Self {
        Self { status }
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    pub fn is_interrupted(&self) -> bool {
        self.status().is_interrupted()
    }

    /// Resolves once the task is paused or canceled.
    pub async fn interrupted(&self) {
        let mut status = self.status.clone();
        // A closed channel means the task is gone; treat that as interrupted too.
        let _ = status.wait_for(|s| s.is_interrupted()).await;
    }
}
