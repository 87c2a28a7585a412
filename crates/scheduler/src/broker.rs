//! Fan-out of one task outcome to every caller waiting on it.
//!
//! A broker keeps independent waiter lists:
//! - [`Channel::Eventual`] receives the task's true final outcome
//! - [`Channel::Immediate`] receives the snapshot one attempt produces when
//!   it exits after being paused or aborted. Each attempt has its own list,
//!   so a snapshot only ever reaches the callers that detached that attempt.
//!
//! Settling one channel never touches another, so an attempt can hand its
//! partial result to a pauser while `run()` callers keep waiting for a later
//! attempt to finish.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use ptask_core::TaskError;
use tokio::sync::oneshot;

use crate::sync::lock;

/// Which waiter list a subscription or settlement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Eventual,
    /// Snapshot of the attempt with this id.
    Immediate(u64),
}

pub type Outcome<R> = Result<R, TaskError>;

type Waiter<R> = oneshot::Sender<Outcome<R>>;

struct Waiters<R> {
    eventual: Vec<Waiter<R>>,
    immediate: HashMap<u64, Vec<Waiter<R>>>,
}

impl<R> Waiters<R> {
    fn take(&mut self, channel: Channel) -> Vec<Waiter<R>> {
        match channel {
            Channel::Eventual => std::mem::take(&mut self.eventual),
            Channel::Immediate(attempt) => self.immediate.remove(&attempt).unwrap_or_default(),
        }
    }
}

pub struct CompletionBroker<R> {
    waiters: Mutex<Waiters<R>>,
}

impl<R: Clone> CompletionBroker<R> {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(Waiters {
                eventual: Vec::new(),
                immediate: HashMap::new(),
            }),
        }
    }

    /// Register a waiter on `channel` and return its handle.
    pub fn subscribe(&self, channel: Channel) -> ResultHandle<R> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = lock(&self.waiters);
        let list = match channel {
            Channel::Eventual => &mut waiters.eventual,
            Channel::Immediate(attempt) => waiters.immediate.entry(attempt).or_default(),
        };
        // Handles dropped before settlement leave closed senders behind.
        list.retain(|tx| !tx.is_closed());
        list.push(tx);
        ResultHandle { rx }
    }

    /// Deliver `outcome` to every waiter on `channel` and clear that list.
    ///
    /// Returns the number of waiters that received it.
    pub fn settle(&self, channel: Channel, outcome: Outcome<R>) -> usize {
        let waiters = lock(&self.waiters).take(channel);
        let mut delivered = 0;
        for tx in waiters {
            if tx.send(outcome.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Fail every waiter on every channel with `error`.
    pub fn reject_all(&self, error: TaskError) -> usize {
        let (eventual, immediate) = {
            let mut waiters = lock(&self.waiters);
            (
                std::mem::take(&mut waiters.eventual),
                std::mem::take(&mut waiters.immediate),
            )
        };
        eventual
            .into_iter()
            .chain(immediate.into_values().flatten())
            .filter(|tx| !tx.is_closed())
            .map(|tx| tx.send(Err(error.clone())).is_ok())
            .filter(|sent| *sent)
            .count()
    }
}

impl<R: Clone> Default for CompletionBroker<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaitable result of one subscription.
///
/// Resolves to [`TaskError::Dropped`] if the broker goes away unsettled.
#[must_use = "a ResultHandle does nothing unless awaited"]
pub struct ResultHandle<R> {
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R> Future for ResultHandle<R> {
    type Output = Outcome<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Dropped)))
    }
}
