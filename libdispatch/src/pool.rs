//! Fixed-size pool of persistent workers consuming one bounded task queue.
//!
//! The queue capacity is the only backpressure mechanism: producers block in
//! [`WorkerPool::add_task`] once it is full. Shutdown is cooperative — a
//! worker that is mid-task finishes that task, and the queue is drained
//! before workers exit, so every task enqueued before [`WorkerPool::stop`]
//! reaches exactly one worker.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::shutdown::{ShutdownEvent, ShutdownListener};

/// Queue capacity shared by every pool.
pub const QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool is stopped")]
pub struct PoolClosed;

pub struct WorkerPool<T> {
    tx: mpsc::Sender<T>,
    shutdown: ShutdownEvent,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool and immediately spawn `size` persistent workers, each
    /// running `job` for every task it receives. The pool never retries and
    /// never inspects job outcomes; error handling belongs to the job.
    pub fn new<F, Fut>(size: usize, job: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = ShutdownEvent::new();
        let job = Arc::new(job);

        let workers = (0..size)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let job = Arc::clone(&job);
                let listener = shutdown.subscribe();
                tokio::spawn(worker_loop(id, rx, job, listener))
            })
            .collect();

        Self {
            tx,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a task. Awaits while the queue is full — this blocking is the
    /// pool's backpressure. Fails once the pool has been stopped.
    pub async fn add_task(&self, task: T) -> Result<(), PoolClosed> {
        if self.shutdown.is_triggered() {
            return Err(PoolClosed);
        }
        self.tx.send(task).await.map_err(|_| PoolClosed)
    }

    /// Trigger shutdown and wait for every worker to drain the queue and
    /// exit. Idempotent: concurrent callers all block until quiescence, but
    /// only the first invocation triggers the broadcast.
    pub async fn stop(&self) {
        if self.shutdown.trigger() {
            debug!("stopping workers");
        }
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                error!("worker task failed: {e}");
            }
        }
    }
}

async fn worker_loop<T, F, Fut>(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    job: Arc<F>,
    mut listener: ShutdownListener,
) where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        // Biased toward the queue: pending tasks are handed out before the
        // shutdown signal is observed, so a stop drains instead of dropping.
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                task = rx.recv() => task,
                _ = listener.triggered() => None,
            }
        };
        match task {
            Some(task) => {
                debug!(worker = id, "handling task");
                job(task).await;
            }
            None => {
                debug!(worker = id, "worker exited");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::{Semaphore, mpsc};
    use tokio::time::timeout;

    use super::{PoolClosed, WorkerPool};

    fn counting_pool(size: usize) -> (Arc<Mutex<HashSet<u64>>>, WorkerPool<u64>) {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let pool = WorkerPool::new(size, {
            let seen = Arc::clone(&seen);
            move |task: u64| {
                let seen = Arc::clone(&seen);
                async move {
                    assert!(seen.lock().unwrap().insert(task), "task delivered twice");
                }
            }
        });
        (seen, pool)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delivers_every_task_exactly_once() {
        for size in [1, 4] {
            let (seen, pool) = counting_pool(size);
            for id in 0..500u64 {
                pool.add_task(id).await.unwrap();
            }
            pool.stop().await;
            assert_eq!(seen.lock().unwrap().len(), 500);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_drains_queued_tasks() {
        let (seen, pool) = counting_pool(1);
        for id in 0..100u64 {
            pool.add_task(id).await.unwrap();
        }
        pool.stop().await;
        assert_eq!(seen.lock().unwrap().len(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stop_never_panics() {
        let (seen, pool) = counting_pool(2);
        let pool = Arc::new(pool);
        for id in 0..50u64 {
            pool.add_task(id).await.unwrap();
        }

        let stops: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.stop().await })
            })
            .collect();
        for stop in stops {
            stop.await.unwrap();
        }

        assert_eq!(seen.lock().unwrap().len(), 50);
        assert_eq!(pool.add_task(50).await, Err(PoolClosed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_task_finishes_before_stop_returns() {
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, mut started_rx) = mpsc::channel::<()>(1);

        let pool = WorkerPool::new(1, {
            let finished = Arc::clone(&finished);
            move |_: u32| {
                let finished = Arc::clone(&finished);
                let started_tx = started_tx.clone();
                async move {
                    let _ = started_tx.send(()).await;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.store(true, Ordering::SeqCst);
                }
            }
        });

        pool.add_task(0).await.unwrap();
        started_rx.recv().await.unwrap();
        pool.stop().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn full_queue_blocks_producers() {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::channel::<()>(1);

        let pool = WorkerPool::new(1, {
            let gate = Arc::clone(&gate);
            move |_: u32| {
                let gate = Arc::clone(&gate);
                let started_tx = started_tx.clone();
                async move {
                    let _ = started_tx.try_send(());
                    gate.acquire().await.unwrap().forget();
                }
            }
        });

        // One task in flight, then exactly QUEUE_CAPACITY queued.
        pool.add_task(0).await.unwrap();
        started_rx.recv().await.unwrap();
        for id in 1..=(super::QUEUE_CAPACITY as u32) {
            pool.add_task(id).await.unwrap();
        }

        let blocked = timeout(Duration::from_millis(50), pool.add_task(u32::MAX)).await;
        assert!(blocked.is_err(), "producer should block on a full queue");

        gate.add_permits(super::QUEUE_CAPACITY * 2);
        pool.stop().await;
    }
}
