//! Worker pool: consumer threads driving the queue
//!
//! Each worker loops `queue.pop()`, handing every item to the supplied
//! handler, and exits when the queue reports closed. A handler panic is
//! confined to the item that caused it; the worker keeps serving.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::PoolConfig;
use crate::error::QueueClosed;
use crate::queue::WorkQueue;
use crate::{qdebug, qwarn};

/// A pool of consumer threads attached to one [`WorkQueue`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `config.num_workers` threads, each popping from `queue` and
    /// invoking `handler(worker_id, item)` per item.
    ///
    /// Fails if the configuration is invalid or a thread cannot be spawned.
    pub fn spawn<T, F>(
        queue: Arc<WorkQueue<T>>,
        config: &PoolConfig,
        handler: F,
    ) -> io::Result<Self>
    where
        T: Send + 'static,
        F: Fn(usize, T) + Send + Sync + 'static,
    {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(config.num_workers);

        for worker_id in 0..config.num_workers {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);

            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, worker_id));
            if let Some(bytes) = config.stack_size {
                builder = builder.stack_size(bytes);
            }

            handles.push(builder.spawn(move || worker_loop(worker_id, queue, handler))?);
        }

        Ok(Self { handles })
    }

    /// Number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Workers only exit after the queue is
    /// closed and drained, so `close()` the queue first.
    pub fn join(self) {
        for handle in self.handles {
            // A worker that panicked outside the handler guard already
            // logged through the panic hook; nothing more to do here.
            let _ = handle.join();
        }
    }
}

fn worker_loop<T, F>(worker_id: usize, queue: Arc<WorkQueue<T>>, handler: Arc<F>)
where
    T: Send + 'static,
    F: Fn(usize, T) + Send + Sync + 'static,
{
    qdebug!("worker {} started", worker_id);

    loop {
        match queue.pop() {
            Ok(item) => {
                if catch_unwind(AssertUnwindSafe(|| (*handler)(worker_id, item))).is_err() {
                    qwarn!("worker {}: handler panicked, item dropped", worker_id);
                }
            }
            Err(QueueClosed) => break,
        }
    }

    qdebug!("worker {} exiting, queue closed", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_pool_processes_all_items() {
        let queue = Arc::new(WorkQueue::new());
        let processed = Arc::new(AtomicUsize::new(0));
        let sum = Arc::new(AtomicUsize::new(0));

        let pool = {
            let processed = Arc::clone(&processed);
            let sum = Arc::clone(&sum);
            WorkerPool::spawn(
                Arc::clone(&queue),
                &PoolConfig::new().num_workers(4),
                move |_worker, item: usize| {
                    processed.fetch_add(1, Ordering::Relaxed);
                    sum.fetch_add(item, Ordering::Relaxed);
                },
            )
            .unwrap()
        };
        assert_eq!(pool.num_workers(), 4);

        const ITEMS: usize = 10_000;
        for i in 0..ITEMS {
            queue.push(i).unwrap();
        }
        queue.close();
        pool.join();

        assert_eq!(processed.load(Ordering::Relaxed), ITEMS);
        assert_eq!(sum.load(Ordering::Relaxed), ITEMS * (ITEMS - 1) / 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_handler_panic_does_not_kill_worker() {
        let queue = Arc::new(WorkQueue::new());
        let processed = Arc::new(AtomicUsize::new(0));

        let pool = {
            let processed = Arc::clone(&processed);
            WorkerPool::spawn(
                Arc::clone(&queue),
                &PoolConfig::new().num_workers(1),
                move |_worker, item: i32| {
                    if item < 0 {
                        panic!("bad item");
                    }
                    processed.fetch_add(1, Ordering::Relaxed);
                },
            )
            .unwrap()
        };

        queue.push(1).unwrap();
        queue.push(-1).unwrap(); // panics in the handler
        queue.push(2).unwrap(); // must still be processed
        queue.close();
        pool.join();

        assert_eq!(processed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let queue: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());
        let result = WorkerPool::spawn(queue, &PoolConfig::new().num_workers(0), |_, _| {});
        assert!(result.is_err());
    }

    #[test]
    fn test_workers_block_until_close() {
        let queue: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());
        let pool = WorkerPool::spawn(
            Arc::clone(&queue),
            &PoolConfig::new().num_workers(2),
            |_, _| {},
        )
        .unwrap();

        // Workers sit in pop() with nothing to do; closing releases them.
        std::thread::sleep(Duration::from_millis(50));
        queue.close();
        pool.join();
    }
}
