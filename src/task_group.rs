//! Fork/join over Tokio tasks.
//!
//! Every phase that fans out (queue reset, the two-queue stat fetch, the
//! batch sends) submits its units of work to a [`TaskGroup`] and then joins
//! the whole group, getting one result per unit back in submission order.

use std::future::Future;
use tokio::task::{JoinError, JoinHandle};

pub struct TaskGroup<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Start a unit of work immediately; there is no in-flight cap
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every unit and return their results in submission order
    ///
    /// A unit that panicked yields `Err(JoinError)` without affecting the
    /// others.
    pub async fn join_all(self) -> Vec<Result<T, JoinError>> {
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            results.push(handle.await);
        }
        results
    }
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}
