use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use crate::job::Job;
use crate::metrics::{QueueMetrics, QueueStats};
use crate::queue::PendingQueue;
use crate::sync::lock;
use crate::types::{TaskInfo, TaskKey};

/// An attempt currently owned by the admission loop.
pub(super) struct RunningAttempt {
    pub(super) job: Arc<dyn Job>,
    pub(super) attempt: u64,
}

/// Everything the admission loop and control operations mutate.
///
/// Guarded by a single mutex that is never held across an await.
pub(super) struct QueueState {
    pub(super) pending: PendingQueue<Arc<dyn Job>>,
    pub(super) running: HashMap<TaskKey, RunningAttempt>,
    pub(super) paused: HashMap<TaskKey, Arc<dyn Job>>,
    pub(super) concurrency_limit: usize,
    /// Executing attempts, including ones detached by pause or abort.
    pub(super) in_flight: usize,
    /// A deferred admission pass has been spawned and not yet run.
    pub(super) pass_scheduled: bool,
    pub(super) next_attempt: u64,
    pub(super) metrics: QueueMetrics,
}

/// Admission control for one named queue.
///
/// Runs at most `concurrency_limit` attempts at once, always admitting the
/// highest-priority pending task when a slot frees.
pub struct Scheduler {
    pub(super) name: String,
    pub(super) state: Mutex<QueueState>,
}

impl Scheduler {
    /// Create a scheduler for `name`. A limit of 0 is raised to 1.
    pub fn new(name: impl Into<String>, concurrency_limit: usize) -> Arc<Self> {
        let name = name.into();
        let concurrency_limit = concurrency_limit.max(1);
        info!(queue = %name, concurrency_limit, "queue created");
        Arc::new(Self {
            name,
            state: Mutex::new(QueueState {
                pending: PendingQueue::new(),
                running: HashMap::new(),
                paused: HashMap::new(),
                concurrency_limit,
                in_flight: 0,
                pass_scheduled: false,
                next_attempt: 0,
                metrics: QueueMetrics::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency_limit(&self) -> usize {
        self.lock_state().concurrency_limit
    }

    /// Change the limit for subsequent admissions. Running work beyond a
    /// lowered limit is left alone; a raised limit admits more right away.
    pub fn set_concurrency_limit(self: &Arc<Self>, limit: usize) {
        let limit = limit.max(1);
        let previous = {
            let mut state = self.lock_state();
            std::mem::replace(&mut state.concurrency_limit, limit)
        };
        info!(queue = %self.name, previous, limit, "concurrency limit changed");
        if limit > previous {
            self.schedule_pass();
        }
    }

    /// Snapshot of the queue's sets and counters.
    pub fn stats(&self) -> QueueStats {
        let state = self.lock_state();
        QueueStats {
            queue: self.name.clone(),
            pending: state.pending.len(),
            running: state.running.len(),
            paused: state.paused.len(),
            in_flight: state.in_flight,
            concurrency_limit: state.concurrency_limit,
            metrics: state.metrics.clone(),
        }
    }

    /// Tasks currently waiting for a slot, in key order.
    pub fn pending_tasks(&self) -> Vec<TaskInfo> {
        let state = self.lock_state();
        let mut keys = state.pending.keys();
        keys.sort_unstable();
        keys.into_iter()
            .filter_map(|key| state.pending.get(key))
            .map(|job| job.info())
            .collect()
    }

    pub(super) fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }
}
