//! # Bounded Worker Pool
//!
//! Runs one task per item with at most `min(items, cap)` tasks in flight and
//! returns only after every task has finished. Callers rely on that return as a
//! phase barrier.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Default upper bound on concurrently running tasks.
pub const DEFAULT_POOL_CAP: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    cap: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAP)
    }
}

impl WorkerPool {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of workers used for a batch of `items` tasks.
    pub fn size_for(&self, items: usize) -> usize {
        items.min(self.cap).max(1)
    }

    /// Runs `task` over every item and waits for all of them.
    ///
    /// Each item is moved into exactly one task. Results come back in completion
    /// order, not input order.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let workers = self.size_for(items.len());
        stream::iter(items)
            .map(task)
            .buffer_unordered(workers)
            .collect()
            .await
    }
}
