//! Pending-task heap with lazy invalidation.
//!
//! Each push records a generation number for the entry's task key. Pushing the
//! same key again (re-prioritization) or removing it only updates the live
//! generation; the superseded heap entry stays in place and is discarded when
//! it surfaces. This keeps re-prioritization at O(log n).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::types::{Priority, TaskKey};

/// Anything the pending heap can order.
pub trait Queued: Clone {
    fn key(&self) -> TaskKey;
    fn priority(&self) -> Priority;
}

struct HeapEntry<T> {
    item: T,
    /// Captured at push time; dynamic priorities still re-evaluate on compare.
    priority: Priority,
    generation: u64,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first. Ties fall to heap order.
        self.priority.value().total_cmp(&other.priority.value())
    }
}

/// Minimum heap size before stale entries are compacted away.
const COMPACT_FLOOR: usize = 32;

pub struct PendingQueue<T> {
    heap: BinaryHeap<HeapEntry<T>>,
    /// Live generation and item per key.
    live: HashMap<TaskKey, (u64, T)>,
    next_generation: u64,
}

impl<T: Queued> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Insert `item`, superseding any live entry with the same key.
    pub fn push(&mut self, item: T) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.live.insert(item.key(), (generation, item.clone()));
        self.heap.push(HeapEntry {
            priority: item.priority(),
            item,
            generation,
        });
        self.compact_if_stale();
    }

    /// Extract the highest-priority live item, discarding stale entries.
    pub fn pop(&mut self) -> Option<T> {
        while let Some(entry) = self.heap.pop() {
            if self.is_live(&entry) {
                self.live.remove(&entry.item.key());
                return Some(entry.item);
            }
        }
        None
    }

    /// Remove `key` from the queue. The heap entry is left to go stale.
    pub fn remove(&mut self, key: TaskKey) -> Option<T> {
        self.live.remove(&key).map(|(_, item)| item)
    }

    /// Re-insert a live entry so its current priority takes effect.
    pub fn reprioritize(&mut self, key: TaskKey) -> bool {
        match self.live.get(&key).map(|(_, item)| item.clone()) {
            Some(item) => {
                self.push(item);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: TaskKey) -> Option<&T> {
        self.live.get(&key).map(|(_, item)| item)
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.live.contains_key(&key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Heap entries that no longer correspond to a live item.
    pub fn stale(&self) -> usize {
        self.heap.len() - self.live.len()
    }

    pub fn keys(&self) -> Vec<TaskKey> {
        self.live.keys().copied().collect()
    }

    fn is_live(&self, entry: &HeapEntry<T>) -> bool {
        self.live
            .get(&entry.item.key())
            .is_some_and(|(generation, _)| *generation == entry.generation)
    }

    fn compact_if_stale(&mut self) {
        if self.heap.len() < COMPACT_FLOOR || self.stale() <= self.live.len() {
            return;
        }
        let live = &self.live;
        self.heap.retain(|entry| {
            live.get(&entry.item.key())
                .is_some_and(|(generation, _)| *generation == entry.generation)
        });
    }
}

impl<T: Queued> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
