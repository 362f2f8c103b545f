//! Bounded task pool.
//!
//! Spawns every queued job onto a [`JoinSet`] immediately, but each job must
//! hold a permit from a shared [`Semaphore`] for its whole run. With `N`
//! permits at most `N` jobs execute at once; the rest wait in FIFO order
//! (tokio semaphores are fair).

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

pub struct TaskPool<T> {
    semaphore: Arc<Semaphore>,
    set: JoinSet<T>,
}

impl<T: Send + 'static> TaskPool<T> {
    /// `workers` is clamped to at least 1.
    pub fn new(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            set: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, job: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.set.spawn(async move {
            // Never closed, so acquire only fails if the pool is gone.
            let _permit = semaphore.acquire_owned().await;
            job.await
        });
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for every job. Outputs arrive in completion order; a job that
    /// panicked yields its `JoinError`.
    pub async fn join_all(mut self) -> Vec<Result<T, JoinError>> {
        let mut out = Vec::with_capacity(self.set.len());
        while let Some(res) = self.set.join_next().await {
            out.push(res);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_worker_count() {
        let running = Arc::new(AtomicUsize::new(0));
        let limit = 3;
        let mut pool = TaskPool::new(limit);

        for i in 0..limit * 8 {
            let running = running.clone();
            pool.spawn(async move {
                let watermark = running.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis((i % 4) as u64 * 3)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                watermark
            });
        }
        assert_eq!(pool.len(), limit * 8);

        let watermarks = pool.join_all().await;
        assert_eq!(watermarks.len(), limit * 8);
        for w in watermarks {
            let w = w.unwrap();
            assert!(w <= limit, "observed {} concurrent jobs", w);
        }
    }

    #[tokio::test]
    async fn panicking_job_surfaces_as_join_error() {
        let mut pool = TaskPool::new(2);
        let explode = || -> i32 { panic!("boom") };
        pool.spawn(async { 1 });
        pool.spawn(async move { explode() });

        let results = pool.join_all().await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn zero_workers_still_makes_progress() {
        let mut pool = TaskPool::new(0);
        pool.spawn(async { "done" });
        let results = pool.join_all().await;
        assert_eq!(results.into_iter().next().unwrap().unwrap(), "done");
    }
}
