//! Named queues and the tasks listed on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use ptask_core::SchedulerConfig;
use tracing::debug;

use crate::job::Job;
use crate::metrics::QueueStats;
use crate::runner::Scheduler;
use crate::sync::lock;
use crate::types::{TaskInfo, TaskKey};

struct RegistryInner {
    config: SchedulerConfig,
    queues: Mutex<HashMap<String, Arc<Scheduler>>>,
    /// Tasks built and not yet finished, per queue. Weak so an abandoned
    /// task handle does not outlive its last clone.
    tasks: Mutex<HashMap<String, Vec<Weak<dyn Job>>>>,
}

/// Owner of every queue's [`Scheduler`].
///
/// Queues are created on first use with the limit the config assigns them and
/// live as long as the registry. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct QueueRegistry {
    inner: Arc<RegistryInner>,
}

impl QueueRegistry {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                queues: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// The scheduler for `name`, created if this is its first use.
    pub fn queue(&self, name: &str) -> Arc<Scheduler> {
        let mut queues = lock(&self.inner.queues);
        let scheduler = queues
            .entry(name.to_string())
            .or_insert_with(|| Scheduler::new(name, self.inner.config.limit_for(name)));
        Arc::clone(scheduler)
    }

    /// Change how many attempts `queue` runs at once.
    pub fn set_concurrency_limit(&self, limit: usize, queue: &str) {
        self.queue(queue).set_concurrency_limit(limit);
    }

    /// Tasks on `queue` that were built and have not finished or been
    /// canceled, in creation order.
    pub fn tasks(&self, queue: &str) -> Vec<TaskInfo> {
        let mut tasks = lock(&self.inner.tasks);
        let Some(list) = tasks.get_mut(queue) else {
            return Vec::new();
        };
        list.retain(|task| task.strong_count() > 0);
        list.iter()
            .filter_map(Weak::upgrade)
            .map(|job| job.info())
            .collect()
    }

    /// Names of every queue created so far, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.queues).keys().cloned().collect();
        names.sort();
        names
    }

    /// Stats for `queue`, or `None` if it was never used.
    pub fn stats(&self, queue: &str) -> Option<QueueStats> {
        let scheduler = lock(&self.inner.queues).get(queue).cloned();
        scheduler.map(|s| s.stats())
    }

    pub(crate) fn track(&self, job: Arc<dyn Job>) {
        let key = job.key();
        let mut tasks = lock(&self.inner.tasks);
        let list = tasks.entry(job.queue().to_string()).or_default();
        let listed = list
            .iter()
            .filter_map(Weak::upgrade)
            .any(|listed| listed.key() == key);
        if !listed {
            list.push(Arc::downgrade(&job));
        }
    }

    pub(crate) fn untrack(&self, queue: &str, key: TaskKey) {
        let mut tasks = lock(&self.inner.tasks);
        if let Some(list) = tasks.get_mut(queue) {
            list.retain(|task| task.upgrade().is_some_and(|listed| listed.key() != key));
            debug!(queue, task_key = key, "task unlisted");
        }
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ptask_core::QueueConfig;

    use super::*;

    #[test]
    fn queues_are_created_once() {
        let registry = QueueRegistry::default();
        let a = registry.queue("alpha");
        let b = registry.queue("alpha");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.queue_names(), vec!["alpha".to_string()]);
    }

    #[test]
    fn queue_limits_follow_config() {
        let mut queues = HashMap::new();
        queues.insert("wide".to_string(), QueueConfig { concurrency_limit: 4 });
        let registry = QueueRegistry::new(SchedulerConfig {
            default_concurrency_limit: 2,
            queues,
            ..SchedulerConfig::default()
        });

        assert_eq!(registry.queue("wide").concurrency_limit(), 4);
        assert_eq!(registry.queue("other").concurrency_limit(), 2);
    }

    #[test]
    fn stats_only_for_known_queues() {
        let registry = QueueRegistry::default();
        assert!(registry.stats("missing").is_none());

        registry.queue("present");
        let stats = registry.stats("present").unwrap();
        assert_eq!(stats.queue, "present");
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.concurrency_limit, 1);
    }

    #[test]
    fn unknown_queue_lists_no_tasks() {
        let registry = QueueRegistry::default();
        assert!(registry.tasks("nowhere").is_empty());
    }
}
