//! Bounded pending-task queue with overflow eviction.
//!
//! Tasks are ordered most-recently-submitted-first: during interactive
//! scrolling the freshest tiles are the ones still on screen, so workers
//! take from the front while overflow discards from the back — the
//! oldest-submitted pending task, which likely scrolled out of view long
//! ago.

use std::collections::VecDeque;

use crate::tile::TileKey;

/// A pending fetch, tagged with its submission sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTask {
    pub key: TileKey,
    pub seq: u64,
}

impl FetchTask {
    pub fn new(key: TileKey, seq: u64) -> Self {
        Self { key, seq }
    }
}

/// Double-ended pending queue with a fixed capacity.
///
/// Not thread-safe on its own; the pipeline wraps it in a mutex.
#[derive(Debug)]
pub struct PendingQueue {
    deque: VecDeque<FetchTask>,
    capacity: usize,
}

impl PendingQueue {
    /// Creates a queue holding at most `capacity` pending tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            deque: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Admits a task at the fresh end.
    ///
    /// When the queue is full, the oldest-submitted pending task is evicted
    /// and returned so the caller can retire its in-flight entry in the same
    /// step.
    pub fn admit(&mut self, task: FetchTask) -> Option<FetchTask> {
        let evicted = if self.deque.len() == self.capacity {
            self.deque.pop_back()
        } else {
            None
        };
        self.deque.push_front(task);
        evicted
    }

    /// Takes the most recently submitted task.
    pub fn take(&mut self) -> Option<FetchTask> {
        self.deque.pop_front()
    }

    /// Discards all pending tasks, returning them for bookkeeping.
    pub fn drain(&mut self) -> Vec<FetchTask> {
        self.deque.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
