use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::watch;

use crate::broker::CompletionBroker;
use crate::registry::QueueRegistry;
use crate::types::{Priority, TaskStatus};

use super::{
    next_key, ArgsHook, CancelHook, ExecInfo, Hooks, MergeFn, Progress, Snapshots, Task, TaskInner,
    WorkFn,
};

/// Fluent builder for a [`Task`].
///
/// # Example
/// ```ignore
/// let task = Task::builder(vec![1, 2, 3], |args: Vec<u32>, exec: ExecInfo| async move {
///     let mut squares = Vec::new();
///     for n in args {
///         if exec.is_interrupted() {
///             break;
///         }
///         squares.push(n * n);
///     }
///     Ok(squares)
/// })
/// .priority(5.0)
/// .queue("math")
/// .build(&registry);
/// ```
pub struct TaskBuilder<A, R> {
    args: A,
    work: WorkFn<A, R>,
    priority: Priority,
    queue: Option<String>,
    delay: Option<Duration>,
    on_pause: Option<ArgsHook<A, R>>,
    on_resume: Option<ArgsHook<A, R>>,
    on_cancel: Option<CancelHook>,
    results_merge: Option<MergeFn<R>>,
}

impl<A, R> TaskBuilder<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    pub(super) fn new<F, Fut>(args: A, work: F) -> Self
    where
        F: Fn(A, ExecInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self {
            args,
            work: Box::new(move |args, exec| work(args, exec).boxed()),
            priority: Priority::default(),
            queue: None,
            delay: None,
            on_pause: None,
            on_resume: None,
            on_cancel: None,
            results_merge: None,
        }
    }

    /// Fixed priority (default 0). Higher runs first.
    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Priority computed anew at every queue comparison.
    pub fn dynamic_priority<F>(mut self, evaluator: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.priority = Priority::dynamic(evaluator);
        self
    }

    /// Queue to schedule on (default: the registry's default queue).
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queue = Some(name.into());
        self
    }

    /// Hold the first enqueue until `delay` after the task is built.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Arguments for the attempt after a pause (default: unchanged).
    pub fn on_pause<F>(mut self, hook: F) -> Self
    where
        F: Fn(&A, Option<&R>) -> A + Send + Sync + 'static,
    {
        self.on_pause = Some(Box::new(hook));
        self
    }

    /// Arguments for the attempt after a resume (default: unchanged).
    pub fn on_resume<F>(mut self, hook: F) -> Self
    where
        F: Fn(&A, Option<&R>) -> A + Send + Sync + 'static,
    {
        self.on_resume = Some(Box::new(hook));
        self
    }

    /// Called once when a cancel succeeds.
    pub fn on_cancel<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    /// How partial results combine (default: keep the newest).
    pub fn results_merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(Option<&R>, R) -> R + Send + Sync + 'static,
    {
        self.results_merge = Some(Box::new(merge));
        self
    }

    /// Create the task and list it on its queue in `registry`.
    pub fn build(self, registry: &QueueRegistry) -> Task<A, R> {
        let queue = self
            .queue
            .unwrap_or_else(|| registry.config().default_queue.clone());
        let scheduler = registry.queue(&queue);
        let (status, _) = watch::channel(TaskStatus::Pending);

        let inner = Arc::new(TaskInner {
            key: next_key(),
            queue,
            priority: Mutex::new(self.priority),
            progress: Mutex::new(Progress {
                args: self.args,
                result_so_far: None,
            }),
            status,
            not_before: self.delay.map(|delay| Instant::now() + delay),
            work: self.work,
            hooks: Hooks {
                on_pause: self
                    .on_pause
                    .unwrap_or_else(|| Box::new(keep_args::<A, R>) as ArgsHook<A, R>),
                on_resume: self
                    .on_resume
                    .unwrap_or_else(|| Box::new(keep_args::<A, R>) as ArgsHook<A, R>),
                on_cancel: self
                    .on_cancel
                    .unwrap_or_else(|| Box::new(|| {}) as CancelHook),
                results_merge: self
                    .results_merge
                    .unwrap_or_else(|| Box::new(keep_newest::<R>) as MergeFn<R>),
            },
            broker: CompletionBroker::new(),
            snapshots: Mutex::new(Snapshots::new()),
            merge_turn: tokio::sync::Mutex::new(()),
            scheduler,
            registry: registry.clone(),
        });

        let task = Task { inner };
        registry.track(task.job());
        task
    }
}

fn keep_args<A: Clone, R>(args: &A, _result_so_far: Option<&R>) -> A {
    args.clone()
}

fn keep_newest<R>(_result_so_far: Option<&R>, newest: R) -> R {
    newest
}
