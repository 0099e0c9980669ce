// src/exec/pool.rs

//! Batch dispatch with a concurrency cap.
//!
//! Every job of a batch is spawned on the Tokio runtime at once; a shared
//! semaphore keeps at most `workers` of them past their start line. The
//! caller drains results with [`Batch::next`] in completion order and the
//! batch is over once it returns `None`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::errors::{Result, TaskmendError};

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    /// Pool running at most `workers` jobs at a time (at least one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn `work(job)` for every job.
    pub fn dispatch<J, F, Fut>(&self, jobs: impl IntoIterator<Item = J>, work: F) -> Batch<Fut::Output>
    where
        F: Fn(J) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let mut set = JoinSet::new();
        for job in jobs {
            let permits = Arc::clone(&self.permits);
            let fut = work(job);
            set.spawn(async move {
                // The semaphore is never closed, so this only fails if it is.
                let _permit = permits.acquire_owned().await.ok();
                fut.await
            });
        }
        debug!(jobs = set.len(), workers = self.workers, "batch dispatched");
        Batch { set }
    }
}

/// Jobs of one dispatched batch.
#[derive(Debug)]
pub struct Batch<R> {
    set: JoinSet<R>,
}

impl<R: Send + 'static> Batch<R> {
    /// Next finished job, `None` once the whole batch has returned.
    ///
    /// A job that panicked surfaces as [`TaskmendError::Other`].
    pub async fn next(&mut self) -> Option<Result<R>> {
        let joined = self.set.join_next().await?;
        Some(joined.map_err(|err| TaskmendError::Other(anyhow::anyhow!("worker task failed: {err}"))))
    }

    /// Jobs not yet returned.
    pub fn pending(&self) -> usize {
        self.set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_worker_cap() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut batch = pool.dispatch(0..6, |i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            }
        });

        let mut seen = Vec::new();
        while let Some(res) = batch.next().await {
            seen.push(res.unwrap());
        }
        seen.sort();

        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(batch.pending(), 0);
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let pool = WorkerPool::new(4);
        let mut batch = pool.dispatch([30u64, 1], |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms
        });

        assert_eq!(batch.next().await.unwrap().unwrap(), 1);
        assert_eq!(batch.next().await.unwrap().unwrap(), 30);
        assert!(batch.next().await.is_none());
    }

    #[tokio::test]
    async fn panicking_job_is_reported() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.workers(), 1);

        let mut batch = pool.dispatch([()], |_| async {
            panic!("boom");
        });
        let res: Option<Result<()>> = batch.next().await;
        assert!(matches!(res, Some(Err(TaskmendError::Other(_)))));
    }
}
