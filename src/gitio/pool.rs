//! Bounded worker pool
//!
//! Jobs are queued per priority and dispatched high → normal → low, FIFO
//! within each class, by a fixed set of worker tasks. Submission returns a
//! receiver for the job's result; a dropped receiver never cancels the job.

use crate::error::{EngineError, EngineResult};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// Dispatch priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    fn index(&self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Queues {
    jobs: parking_lot::Mutex<[VecDeque<Job>; 3]>,
    notify: Notify,
    shutdown: AtomicBool,
}

impl Queues {
    fn pop(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        jobs.iter_mut().find_map(VecDeque::pop_front)
    }

    fn push(&self, priority: Priority, job: Job) {
        self.jobs.lock()[priority.index()].push_back(job);
        self.notify.notify_one();
    }
}

/// Fixed-width pool of worker tasks
pub struct WorkerPool {
    queues: Arc<Queues>,
    width: usize,
}

impl WorkerPool {
    /// Spawn `width` workers (at least one)
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        let queues = Arc::new(Queues {
            jobs: parking_lot::Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        });
        for _ in 0..width {
            let queues = queues.clone();
            tokio::spawn(async move {
                loop {
                    if queues.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(job) = queues.pop() {
                        job.await;
                        continue;
                    }
                    let notified = queues.notify.notified();
                    if queues.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(job) = queues.pop() {
                        job.await;
                        continue;
                    }
                    notified.await;
                }
            });
        }
        Self { queues, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Submit a job; the returned receiver resolves with the job's output.
    /// With `timeout_ms` set, the job is cut off and reports a timeout.
    pub fn submit<F, T>(
        &self,
        priority: Priority,
        timeout_ms: Option<u64>,
        job: F,
    ) -> oneshot::Receiver<EngineResult<T>>
    where
        F: Future<Output = EngineResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::pin(async move {
            let result = match timeout_ms {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), job).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::StepTimeout {
                        step: "job".to_string(),
                        timeout_ms: ms,
                    }),
                },
                None => job.await,
            };
            // The submitter may have gone away; that is not an error here
            let _ = tx.send(result);
        });
        self.queues.push(priority, wrapped);
        rx
    }

    /// Run a single closure-shaped job with a timeout, awaiting its result
    pub async fn execute_job<F, T>(&self, timeout_ms: u64, job: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self.submit(Priority::Normal, Some(timeout_ms), job).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::IoFailure(
                "worker pool dropped the job".to_string(),
            )),
        }
    }

    /// Stop accepting work; idle workers exit, queued jobs are dropped
    pub fn shutdown(&self) {
        self.queues.shutdown.store(true, Ordering::SeqCst);
        self.queues.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_submit_returns_result() {
        let pool = WorkerPool::new(2);
        let rx = pool.submit(Priority::Normal, None, async { Ok(21 * 2) });
        assert_eq!(rx.await.expect("recv").expect("job"), 42);
    }

    #[tokio::test]
    async fn test_job_timeout_reported() {
        let pool = WorkerPool::new(1);
        let result = pool
            .execute_job(20, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::StepTimeout { .. })));
    }

    #[tokio::test]
    async fn test_bounded_parallelism() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            receivers.push(pool.submit(Priority::Normal, None, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        for rx in receivers {
            rx.await.expect("recv").expect("job");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_high_priority_dispatched_first() {
        // Single worker: occupy it, queue low then high, observe order
        let pool = WorkerPool::new(1);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let gate = pool.submit(Priority::Normal, None, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let order_low = order.clone();
        let low = pool.submit(Priority::Low, None, async move {
            order_low.lock().push("low");
            Ok(())
        });
        let order_high = order.clone();
        let high = pool.submit(Priority::High, None, async move {
            order_high.lock().push("high");
            Ok(())
        });

        gate.await.expect("recv").expect("job");
        high.await.expect("recv").expect("job");
        low.await.expect("recv").expect("job");
        assert_eq!(*order.lock(), vec!["high", "low"]);
    }
}
