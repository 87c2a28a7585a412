use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use ptask_scheduler::{ExecInfo, QueueRegistry, Task};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Square `1..=count`, pause once `pause_after` squares exist, then resume.
///
/// The work keeps the squares it produced before the pause; `on_pause` drops
/// the numbers already handled so the second attempt picks up where the
/// first stopped.
pub async fn squares(
    registry: &QueueRegistry,
    queue: Option<String>,
    count: u64,
    pause_after: usize,
    step: Duration,
) -> Result<Vec<u64>> {
    let (progress_tx, mut progress) = mpsc::unbounded_channel();
    let args: Vec<u64> = (1..=count).collect();

    let mut builder = Task::builder(args, move |args: Vec<u64>, exec: ExecInfo| {
        let progress = progress_tx.clone();
        async move {
            let mut out = Vec::with_capacity(args.len());
            for n in args {
                tokio::select! {
                    _ = tokio::time::sleep(step) => {}
                    _ = exec.interrupted() => break,
                }
                out.push(n * n);
                let _ = progress.send(n);
            }
            Ok(out)
        }
    })
    .on_pause(|args: &Vec<u64>, so_far: Option<&Vec<u64>>| {
        let done = so_far.map_or(0, Vec::len);
        args.iter().skip(done).copied().collect()
    })
    .results_merge(|so_far: Option<&Vec<u64>>, newest: Vec<u64>| {
        let mut merged = so_far.cloned().unwrap_or_default();
        merged.extend(newest);
        merged
    });
    if let Some(queue) = queue {
        builder = builder.queue(queue);
    }
    let task = builder.build(registry);

    let run = tokio::spawn({
        let task = task.clone();
        async move { task.run().await }
    });

    // The first attempt reports at most `count` squares.
    let wait_for = pause_after.min(usize::try_from(count).unwrap_or(usize::MAX));
    for _ in 0..wait_for {
        if progress.recv().await.is_none() {
            break;
        }
    }

    match task.pause().await {
        Ok(()) => {
            info!(
                task_key = task.key(),
                partial = ?task.result_so_far(),
                next_args = ?task.args(),
                "squares paused"
            );
            task.resume();
        }
        Err(err) => warn!(task_key = task.key(), %err, "squares finished before the pause"),
    }

    let squares = run.await.context("squares task panicked")??;
    info!(task_key = task.key(), ?squares, "squares done");
    Ok(squares)
}

/// Run one task per priority on a single queue and return the start order.
pub async fn priorities(
    registry: &QueueRegistry,
    queue: Option<String>,
    priorities: &[f64],
    work: Duration,
) -> Result<Vec<String>> {
    let order = Arc::new(Mutex::new(Vec::new()));
    let queue = queue.unwrap_or_else(|| registry.config().default_queue.clone());
    info!(
        queue = %queue,
        concurrency_limit = registry.queue(&queue).concurrency_limit(),
        tasks = priorities.len(),
        "running priority demo"
    );

    let tasks: Vec<Task<String, String>> = priorities
        .iter()
        .enumerate()
        .map(|(i, &priority)| {
            let order = Arc::clone(&order);
            let name = format!("task-{i} (priority {priority})");
            Task::builder(name, move |name: String, _: ExecInfo| {
                let order = Arc::clone(&order);
                async move {
                    if let Ok(mut order) = order.lock() {
                        order.push(name.clone());
                    }
                    tokio::time::sleep(work).await;
                    Ok(name)
                }
            })
            .priority(priority)
            .queue(queue.clone())
            .build(registry)
        })
        .collect();

    // Every task is enqueued on the first poll, before any is admitted.
    let results = futures::future::join_all(tasks.iter().map(|task| task.run())).await;
    for result in results {
        result?;
    }

    let order = order
        .lock()
        .map(|order| order.clone())
        .unwrap_or_default();
    Ok(order)
}
