//! Bounded execution of scheduled requests.
//!
//! At most `max_concurrent` requests run at once; up to `max_queued` more
//! may wait for a worker. Work cancelled while waiting never starts.

use crate::base::neterror::NetError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How submitted work was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A worker slot was acquired; the work should run.
    Running,
    /// Cancelled before a slot was free; the work should only report that.
    Cancelled,
}

/// A reserved place in the wait queue. Dropping it frees the place.
#[derive(Debug)]
pub struct QueueSlot {
    waiting: Arc<AtomicUsize>,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    waiting: Arc<AtomicUsize>,
    max_queued: usize,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker: TaskTracker::new(),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_queued,
        }
    }

    /// Reserve a place in the queue.
    ///
    /// Fails with [`NetError::InsufficientResources`] when the queue is
    /// full or the pool has been shut down.
    pub fn reserve(&self) -> Result<QueueSlot, NetError> {
        if self.tracker.is_closed() {
            tracing::debug!("worker pool is shut down");
            return Err(NetError::InsufficientResources);
        }
        let before = self.waiting.fetch_add(1, Ordering::AcqRel);
        let slot = QueueSlot {
            waiting: self.waiting.clone(),
        };
        if before >= self.max_queued {
            tracing::debug!(queued = before, "worker pool queue full");
            return Err(NetError::InsufficientResources);
        }
        Ok(slot)
    }

    /// Run `work` once a worker is free, or with [`Admission::Cancelled`]
    /// if `cancel` fires first.
    pub fn spawn<F, Fut>(&self, slot: QueueSlot, cancel: CancellationToken, work: F)
    where
        F: FnOnce(Admission) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            drop(slot);
            match permit {
                Some(_permit) => work(Admission::Running).await,
                None => work(Admission::Cancelled).await,
            }
        });
    }

    /// Requests waiting for a worker.
    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Requests submitted and not yet finished, waiting or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait for everything submitted to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
