//! # workq
//!
//! Thread-safe FIFO work queue for handing client connection descriptors
//! from an accept loop to a pool of worker threads.
//!
//! The producer side never blocks on the queue (it only contends briefly for
//! the internal lock); the consumer side blocks until an item arrives or the
//! queue is closed. Delivery is strict FIFO across the whole queue.
//!
//! ## Modules
//!
//! - `queue` - The `WorkQueue` itself (mutex + condvar, blocking pop)
//! - `pool` - `WorkerPool`: consumer threads driving `pop()` in a loop
//! - `config` - `PoolConfig` builder
//! - `error` - Error types
//! - `qlog` - Leveled stderr logging macros
//! - `env` - Environment variable utilities
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use workq::{PoolConfig, WorkQueue, WorkerPool};
//!
//! let queue = Arc::new(WorkQueue::new());
//! let config = PoolConfig::new().num_workers(4);
//!
//! let pool = WorkerPool::spawn(Arc::clone(&queue), &config, |_worker, fd: i32| {
//!     // handle the connection behind `fd`
//!     let _ = fd;
//! })
//! .unwrap();
//!
//! queue.push(42).unwrap();
//! queue.close(); // drains, then workers exit
//! pool.join();
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod pool;
pub mod qlog;
pub mod queue;

// Re-exports for convenience
pub use config::PoolConfig;
pub use error::{PushError, QueueClosed, TryPopError};
pub use pool::WorkerPool;
pub use queue::WorkQueue;
