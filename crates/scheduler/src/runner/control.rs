use std::sync::Arc;

use ptask_core::TaskError;
use tracing::{debug, info};

use crate::job::Job;
use crate::types::{TaskKey, TaskStatus};

use super::Scheduler;

impl Scheduler {
    /// Make sure `job` has exactly one place in this queue.
    ///
    /// A task already pending, running or paused keeps its entry. Finished
    /// tasks are queued for a fresh execution; canceled ones are refused.
    pub(crate) fn enqueue(self: &Arc<Self>, job: Arc<dyn Job>) -> Result<(), TaskError> {
        let key = job.key();
        {
            let mut state = self.lock_state();
            if state.pending.contains(key)
                || state.running.contains_key(&key)
                || state.paused.contains_key(&key)
            {
                debug!(queue = %self.name, task_key = key, "task already queued");
            } else {
                match job.status() {
                    TaskStatus::Canceled => return Err(TaskError::Canceled),
                    TaskStatus::Completed => job.set_status(TaskStatus::Pending),
                    _ => {}
                }
                debug!(queue = %self.name, task_key = key, "task enqueued");
                state.pending.push(job);
            }
        }
        self.schedule_pass();
        Ok(())
    }

    /// Move a running or pending task into the paused set.
    ///
    /// For a running task `on_detach` is called with the detached attempt's
    /// id while the queue lock is still held, so anything it subscribes is in
    /// place before that attempt can settle. Returns its value, or `None` if
    /// the task was still pending.
    pub(crate) fn pause<T>(
        self: &Arc<Self>,
        key: TaskKey,
        on_detach: impl FnOnce(u64) -> T,
    ) -> Result<Option<T>, TaskError> {
        let detached = {
            let mut state = self.lock_state();
            if let Some(running) = state.running.remove(&key) {
                running.job.set_status(TaskStatus::Paused);
                let detached = on_detach(running.attempt);
                state.paused.insert(key, running.job);
                Some(detached)
            } else if let Some(job) = state.pending.remove(key) {
                job.set_status(TaskStatus::Paused);
                state.paused.insert(key, job);
                None
            } else {
                return Err(TaskError::NotRunning);
            }
        };

        let was_running = detached.is_some();
        debug!(queue = %self.name, task_key = key, was_running, "task paused");
        if was_running {
            self.process();
        }
        Ok(detached)
    }

    /// Return a paused task to the pending set. No-op for any other task.
    pub(crate) fn resume(self: &Arc<Self>, key: TaskKey) -> bool {
        {
            let mut state = self.lock_state();
            let Some(job) = state.paused.remove(&key) else {
                return false;
            };
            job.set_status(TaskStatus::Pending);
            state.pending.push(job);
        }
        debug!(queue = %self.name, task_key = key, "task resumed");
        self.schedule_pass();
        true
    }

    /// Remove a pending task and reject everyone waiting on it.
    pub(crate) fn cancel(&self, key: TaskKey) -> Result<(), TaskError> {
        let job = {
            let mut state = self.lock_state();
            let job = state.pending.remove(key).ok_or(TaskError::NotFound)?;
            job.set_status(TaskStatus::Canceled);
            job
        };

        info!(queue = %self.name, task_key = key, "pending task canceled");
        job.reject(TaskError::Canceled);
        Ok(())
    }

    /// Detach a running or paused task and reject its waiters.
    ///
    /// A running attempt is not stopped: this waits for it to exit, discards
    /// whatever it produced, and rejects with [`TaskError::RunningAborted`].
    /// The slot is recycled when that attempt settles.
    pub(crate) async fn abort(&self, key: TaskKey) -> Result<(), TaskError> {
        enum Detached {
            Running(Arc<dyn Job>, futures::future::BoxFuture<'static, ()>),
            Paused(Arc<dyn Job>),
        }

        let detached = {
            let mut state = self.lock_state();
            if let Some(running) = state.running.remove(&key) {
                running.job.set_status(TaskStatus::Canceled);
                // Subscribe before the lock drops so the exit can't be missed.
                let exit = running.job.attempt_exit(running.attempt);
                Detached::Running(running.job, exit)
            } else if let Some(job) = state.paused.remove(&key) {
                job.set_status(TaskStatus::Canceled);
                Detached::Paused(job)
            } else {
                return Err(TaskError::AbortNotRunning);
            }
        };

        let (job, error) = match detached {
            Detached::Running(job, exit) => {
                debug!(queue = %self.name, task_key = key, "waiting for aborted attempt to exit");
                exit.await;
                (job, TaskError::RunningAborted)
            }
            Detached::Paused(job) => (job, TaskError::PausedAborted),
        };

        info!(queue = %self.name, task_key = key, %error, "task aborted");
        job.reject(error);
        Ok(())
    }

    /// Apply a changed priority to a pending task's queue position.
    pub(crate) fn reprioritize(&self, key: TaskKey) -> bool {
        let moved = self.lock_state().pending.reprioritize(key);
        if moved {
            debug!(queue = %self.name, task_key = key, "task re-prioritized");
        }
        moved
    }
}
