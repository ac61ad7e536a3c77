//! Blocking FIFO work queue
//!
//! A `WorkQueue` hands work items (typically accepted socket descriptors)
//! from producer threads to consumer threads:
//!
//! - `push` appends at the tail and wakes one waiting consumer. It never
//!   blocks on the queue, only contends briefly for the lock.
//! - `pop` removes from the head, blocking while the queue is empty.
//! - `close` ends the protocol: blocked consumers wake up and, once the
//!   queue has drained, `pop` reports [`QueueClosed`] instead of blocking.
//!
//! Delivery is strict FIFO: the N-th successful pop returns the N-th pushed
//! item. The mutex totally orders all push/pop critical sections, and its
//! release/acquire pairing makes a pushed item visible to any later pop on
//! another thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::error::{PushError, QueueClosed, TryPopError};

/// State guarded by the mutex. The deque and the closed flag are only ever
/// touched while holding the lock.
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO handoff queue with blocking pop.
///
/// Payload-agnostic: any `Send` type can flow through. The connection
/// handoff case uses `WorkQueue<RawFd>`.
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
    /// Mirror of the deque length, written only under the lock so `len()`
    /// can read it without taking the lock.
    len: AtomicUsize,
}

impl<T> WorkQueue<T> {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty queue with pre-allocated room for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cond: Condvar::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// Append `item` at the tail and wake one waiting consumer.
    ///
    /// Fails without touching queue state if the queue is closed or if the
    /// deque cannot grow; either way the item is handed back so the caller
    /// can reject the work cleanly (e.g. close the connection).
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return Err(PushError::Closed(item));
            }
            if inner.items.try_reserve(1).is_err() {
                return Err(PushError::AllocFailed(item));
            }
            inner.items.push_back(item);
            self.len.store(inner.items.len(), Ordering::Release);
        }
        // Signal outside the critical section so the woken consumer does
        // not immediately block on the lock we still hold.
        self.cond.notify_one();
        Ok(())
    }

    /// Remove and return the head item, blocking while the queue is empty.
    ///
    /// Returns `Err(QueueClosed)` once the queue is closed *and* drained;
    /// items pushed before `close()` are still delivered in order.
    pub fn pop(&self) -> Result<T, QueueClosed> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.len.store(inner.items.len(), Ordering::Release);
                return Ok(item);
            }
            if inner.closed {
                return Err(QueueClosed);
            }
            // Re-check on every wake: spurious wakeups happen, and another
            // consumer may have taken the item we were signaled for.
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// Non-blocking variant of [`pop`](Self::pop).
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.items.pop_front() {
            Some(item) => {
                self.len.store(inner.items.len(), Ordering::Release);
                Ok(item)
            }
            None if inner.closed => Err(TryPopError::Closed),
            None => Err(TryPopError::Empty),
        }
    }

    /// Close the queue: further pushes are rejected, and every consumer
    /// blocked in `pop` wakes up. Already-queued items remain poppable.
    /// Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.cond.notify_all();
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// True if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_fifo_order() {
        let q = WorkQueue::new();
        for v in [1, 2, 3, 4, 5] {
            q.push(v).unwrap();
        }
        for v in [1, 2, 3, 4, 5] {
            assert_eq!(q.pop(), Ok(v));
        }
    }

    #[test]
    fn test_push_pop_scenario() {
        // init -> push(5) -> push(7) -> pop()==5 -> pop()==7 -> empty
        let q = WorkQueue::new();
        q.push(5).unwrap();
        q.push(7).unwrap();
        assert_eq!(q.pop(), Ok(5));
        assert_eq!(q.pop(), Ok(7));
        assert!(q.is_empty());
        assert_eq!(q.try_pop(), Err(TryPopError::Empty));
    }

    #[test]
    fn test_len_tracks_push_pop() {
        let q = WorkQueue::new();
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());

        q.push(10).unwrap();
        q.push(20).unwrap();
        q.push(30).unwrap();
        assert_eq!(q.len(), 3);

        q.pop().unwrap();
        assert_eq!(q.len(), 2);
        q.pop().unwrap();
        q.pop().unwrap();
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let q = Arc::new(WorkQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let item = q.pop().unwrap();
                tx.send((item, Instant::now())).unwrap();
            })
        };

        // Consumer must still be blocked after a deliberate delay.
        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());

        let pushed_at = Instant::now();
        q.push(99).unwrap();

        let (item, returned_at) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(item, 99);
        assert!(returned_at >= pushed_at);
        consumer.join().unwrap();
    }

    #[test]
    fn test_one_item_wakes_exactly_one_consumer() {
        let q = Arc::new(WorkQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let q = Arc::clone(&q);
                let tx = tx.clone();
                thread::spawn(move || {
                    let result = q.pop();
                    tx.send(result).unwrap();
                    result
                })
            })
            .collect();

        // Let both consumers block, then hand over a single item.
        thread::sleep(Duration::from_millis(50));
        q.push(42).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, Ok(42));

        // The other consumer must still be blocked.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        // Unblock it via close so the test can finish.
        q.close();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second, Err(QueueClosed));

        let results: Vec<_> = consumers.into_iter().map(|c| c.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| **r == Ok(42)).count(), 1);
    }

    #[test]
    fn test_no_loss_no_double_delivery_mpmc() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 1000;

        let q = Arc::new(WorkQueue::new());

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Ok(item) = q.pop() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push((p * PER_PRODUCER + i) as u32).unwrap();
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        q.close();

        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);

        // Multiset equality with the pushed values: no loss, no duplicates.
        all.sort_unstable();
        for (i, v) in all.iter().enumerate() {
            assert_eq!(*v, i as u32);
        }
    }

    #[test]
    fn test_fifo_across_producers_single_consumer() {
        // Per-producer FIFO: each producer's items arrive in its own order.
        const PRODUCERS: usize = 3;
        const PER_PRODUCER: u32 = 500;

        let q = Arc::new(WorkQueue::new());
        let producers: Vec<_> = (0..PRODUCERS as u32)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push((p, i)).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        q.close();

        let mut next = [0u32; PRODUCERS];
        while let Ok((p, i)) = q.pop() {
            assert_eq!(i, next[p as usize]);
            next[p as usize] += 1;
        }
        assert_eq!(next, [PER_PRODUCER; PRODUCERS]);
    }

    #[test]
    fn test_close_wakes_all_blocked_consumers() {
        let q: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        q.close();

        for c in consumers {
            assert_eq!(c.join().unwrap(), Err(QueueClosed));
        }
    }

    #[test]
    fn test_close_drains_before_reporting_closed() {
        let q = WorkQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.close();

        assert_eq!(q.pop(), Ok(1));
        assert_eq!(q.pop(), Ok(2));
        assert_eq!(q.pop(), Err(QueueClosed));
        assert_eq!(q.try_pop(), Err(TryPopError::Closed));
    }

    #[test]
    fn test_push_after_close_returns_item() {
        let q = WorkQueue::new();
        q.close();
        assert!(q.is_closed());

        match q.push(7) {
            Err(PushError::Closed(item)) => assert_eq!(item, 7),
            other => panic!("expected Closed, got {:?}", other),
        }
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let q: WorkQueue<i32> = WorkQueue::new();
        q.close();
        q.close();
        assert!(q.is_closed());
        assert_eq!(q.pop(), Err(QueueClosed));
    }

    #[test]
    fn test_try_pop() {
        let q = WorkQueue::new();
        assert_eq!(q.try_pop(), Err(TryPopError::Empty));

        q.push(11).unwrap();
        assert_eq!(q.try_pop(), Ok(11));
        assert_eq!(q.try_pop(), Err(TryPopError::Empty));

        q.close();
        assert_eq!(q.try_pop(), Err(TryPopError::Closed));
    }

    #[test]
    fn test_with_capacity_starts_empty() {
        let q: WorkQueue<u64> = WorkQueue::with_capacity(128);
        assert_eq!(q.len(), 0);
        assert!(!q.is_closed());
    }
}
