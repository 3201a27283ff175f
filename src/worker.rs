//! Bounded-queue worker pool.
//!
//! A fixed set of long-lived worker tasks consumes jobs from a single
//! bounded queue. Submission applies back-pressure: when the queue is full,
//! [`WorkerPool::submit`] waits until capacity frees, the pool's token is
//! cancelled, or the pool starts stopping. The pool lifecycle is
//! `unstarted → started → stopped`, and stopped is terminal.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A unit of work executed by the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Worker pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Worker count; `0` means the number of logical CPUs.
    pub num_workers: usize,
    /// Queue capacity = `num_workers × queue_factor`; minimum 1.
    pub queue_factor: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            queue_factor: 100,
        }
    }
}

/// Fixed-size pool of job-executing tasks over one bounded queue.
pub struct WorkerPool {
    num_workers: usize,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    rx: Mutex<Option<mpsc::Receiver<Job>>>,
    cancel: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopping: AtomicBool,
}

impl WorkerPool {
    /// Create a pool with `num_workers` workers (`0` → CPU count) and the
    /// default queue factor.
    pub fn new(num_workers: usize) -> Self {
        Self::with_config(PoolConfig {
            num_workers,
            ..PoolConfig::default()
        })
    }

    /// Create a pool from an explicit configuration.
    pub fn with_config(config: PoolConfig) -> Self {
        let num_workers = if config.num_workers == 0 {
            num_cpus::get()
        } else {
            config.num_workers
        };
        let capacity = num_workers * config.queue_factor.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            num_workers,
            capacity,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            cancel: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    /// Spawn the workers. A second start is a no-op.
    pub fn start(&self, parent: &CancellationToken) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let rx = match self.rx.lock().take() {
            Some(rx) => Arc::new(tokio::sync::Mutex::new(rx)),
            None => return,
        };
        let token = parent.child_token();

        let mut handles = Vec::with_capacity(self.num_workers);
        for _ in 0..self.num_workers {
            let rx = Arc::clone(&rx);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    // The receiver lock is released before the job runs, so
                    // only the dequeue is serialized, not the execution.
                    let job = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = token.cancelled() => None,
                            job = rx.recv() => job,
                        }
                    };
                    match job {
                        Some(job) => job.await,
                        None => return,
                    }
                }
            }));
        }

        *self.cancel.lock() = Some(token);
        *self.handles.lock() = handles;

        info!(workers = self.num_workers, "worker pool started");
    }

    /// Submit a job, waiting for queue capacity if necessary.
    ///
    /// Returns `false` when the pool is stopping, its token is cancelled, or
    /// the queue has been closed. Never deadlocks after [`stop`](Self::stop).
    pub async fn submit(&self, job: Job) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        let Some(tx) = self.tx.lock().clone() else {
            return false;
        };
        let Some(token) = self.cancel.lock().clone() else {
            return false;
        };

        tokio::select! {
            _ = token.cancelled() => false,
            sent = tx.send(job) => sent.is_ok(),
        }
    }

    /// Submit a job without waiting: a full queue refuses the job.
    pub fn try_submit(&self, job: Job) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        let Some(tx) = self.tx.lock().clone() else {
            return false;
        };
        tx.try_send(job).is_ok()
    }

    /// Stop the pool: refuse new submissions, unblock waiting senders, wait
    /// for workers to finish their in-flight job, then close the queue.
    ///
    /// A second stop is a no-op. The pool cannot be restarted.
    pub async fn stop(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }

        // Closing the queue after the workers are gone avoids a send racing
        // against the close.
        self.tx.lock().take();

        info!("worker pool stopped");
    }

    /// Number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Jobs currently queued (excluding in-flight ones).
    pub fn queue_size(&self) -> usize {
        match self.tx.lock().as_ref() {
            Some(tx) => self.capacity - tx.capacity(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    fn counting_job(counter: &Arc<AtomicU64>) -> Job {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    // -- basic execution ----------------------------------------------------

    #[tokio::test]
    async fn test_executes_submitted_jobs() {
        let pool = WorkerPool::new(4);
        let token = CancellationToken::new();
        pool.start(&token);

        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..100 {
            assert!(pool.submit(counting_job(&counter)).await);
        }

        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_zero_workers_defaults_to_cpu_count() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.num_workers(), num_cpus::get());
    }

    #[test]
    fn test_queue_capacity_from_factor() {
        let pool = WorkerPool::with_config(PoolConfig {
            num_workers: 2,
            queue_factor: 3,
        });
        assert_eq!(pool.capacity, 6);
        assert_eq!(pool.queue_size(), 0);
    }

    // -- lifecycle ----------------------------------------------------------

    #[tokio::test]
    async fn test_double_start_and_double_stop_are_noops() {
        let pool = WorkerPool::new(2);
        let token = CancellationToken::new();
        pool.start(&token);
        pool.start(&token);

        let counter = Arc::new(AtomicU64::new(0));
        assert!(pool.submit(counting_job(&counter)).await);

        pool.stop().await;
        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_after_stop_refused() {
        let pool = WorkerPool::new(2);
        let token = CancellationToken::new();
        pool.start(&token);
        pool.stop().await;

        let counter = Arc::new(AtomicU64::new(0));
        assert!(!pool.submit(counting_job(&counter)).await);
        assert!(!pool.try_submit(counting_job(&counter)));
    }

    #[tokio::test]
    async fn test_submit_before_start_refused() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicU64::new(0));
        assert!(!pool.submit(counting_job(&counter)).await);
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_submit() {
        // One slow worker and a tiny queue so submits back up.
        let pool = Arc::new(WorkerPool::with_config(PoolConfig {
            num_workers: 1,
            queue_factor: 1,
        }));
        let token = CancellationToken::new();
        pool.start(&token);

        let blocker: Job = Box::pin(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        assert!(pool.submit(blocker).await);

        // Fill the queue.
        let filler: Job = Box::pin(async {});
        assert!(pool.submit(filler).await);

        // This submit has no capacity; cancel the token while it waits.
        let pool2 = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let job: Job = Box::pin(async {});
            pool2.submit(job).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let submitted = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("submit must unblock on cancellation")
            .expect("task");
        assert!(!submitted);
    }

    #[tokio::test]
    async fn test_try_submit_refuses_when_full() {
        let pool = WorkerPool::with_config(PoolConfig {
            num_workers: 1,
            queue_factor: 1,
        });
        let token = CancellationToken::new();
        pool.start(&token);

        let blocker: Job = Box::pin(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        assert!(pool.submit(blocker).await);
        let filler: Job = Box::pin(async {});
        assert!(pool.submit(filler).await);

        // The worker is executing the blocker and the filler occupies the
        // queue's only slot, so an immediate submit has nowhere to go.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let refused: Job = Box::pin(async {});
        assert!(!pool.try_submit(refused));

        token.cancel();
    }
}
