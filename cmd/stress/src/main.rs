//! Stress test - many producers, many consumers
//!
//! Hammers one `WorkQueue` from P producer threads and C consumer threads,
//! then verifies delivery: every pushed value popped exactly once, nothing
//! lost, nothing duplicated.
//!
//! ## Usage
//!
//!     cargo run -p workq-stress --release -- [items_per_producer]
//!
//! Environment: `WQ_PRODUCERS` (default 4), `WQ_CONSUMERS` (default 4).

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use workq::env::env_get;
use workq::WorkQueue;

fn main() {
    let items_per_producer: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(250_000);
    let producers: usize = env_get("WQ_PRODUCERS", 4);
    let consumers: usize = env_get("WQ_CONSUMERS", 4);
    let total = producers * items_per_producer;

    println!("=== workq stress ===\n");
    println!(
        "producers={} consumers={} items_per_producer={} total={}",
        producers, consumers, items_per_producer, total
    );

    let queue: Arc<WorkQueue<u64>> = Arc::new(WorkQueue::with_capacity(1024));

    // One slot per value; each must be delivered exactly once.
    let delivered: Arc<Vec<AtomicU8>> = Arc::new((0..total).map(|_| AtomicU8::new(0)).collect());
    let popped_count = Arc::new(AtomicU64::new(0));

    let start = Instant::now();

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let delivered = Arc::clone(&delivered);
            let popped_count = Arc::clone(&popped_count);
            thread::spawn(move || {
                while let Ok(value) = queue.pop() {
                    let prev = delivered[value as usize].fetch_add(1, Ordering::Relaxed);
                    if prev != 0 {
                        panic!("value {} delivered more than once", value);
                    }
                    popped_count.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let base = (p * items_per_producer) as u64;
                for i in 0..items_per_producer as u64 {
                    queue.push(base + i).unwrap();
                }
            })
        })
        .collect();

    for h in producer_handles {
        h.join().unwrap();
    }
    let produce_time = start.elapsed();

    queue.close();
    for h in consumer_handles {
        h.join().unwrap();
    }
    let total_time = start.elapsed();

    // Verify: exactly `total` pops, every slot hit exactly once.
    let popped = popped_count.load(Ordering::Relaxed) as usize;
    let missing = delivered
        .iter()
        .filter(|slot| slot.load(Ordering::Relaxed) == 0)
        .count();

    println!("\n=== Results ===");
    println!("pushed:    {}", total);
    println!("popped:    {}", popped);
    println!("missing:   {}", missing);
    println!("produce:   {:?}", produce_time);
    println!("total:     {:?}", total_time);
    println!(
        "rate:      {:.0} items/sec",
        total as f64 / total_time.as_secs_f64()
    );

    assert_eq!(popped, total, "pop count mismatch");
    assert_eq!(missing, 0, "lost items");
    assert!(queue.is_empty());

    println!("\nOK: no loss, no double delivery");
}
