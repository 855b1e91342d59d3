//! RingMPMC - Bounded Multi-Producer Multi-Consumer Ring Buffer
//!
//! A fixed-capacity FIFO queue that any number of threads may push to and pop
//! from concurrently. Producers and consumers each claim slots with a CAS on a
//! reservation cursor and publish them by advancing a commit cursor in strict
//! reservation order, so a consumer never observes a half-written value.
//!
//! # Key Features
//!
//! - Four cache-line padded cursors (reserved/committed for each side)
//! - Any requested capacity, held in full (storage is masked over the next
//!   power of two)
//! - Non-blocking `try_*` API plus blocking and deadline variants
//! - Clean shutdown: `close()` waits out in-flight operations, then consumers
//!   drain what was committed
//! - [`ArrayQueue`]: a lock-free variant with compile-time capacity
//!
//! # Example
//!
//! ```
//! use ringmpmc_rs::{BoundedQueue, TryPopError};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(BoundedQueue::<u64>::new(1024).unwrap());
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             queue.push(i).unwrap();
//!         }
//!         queue.close();
//!     })
//! };
//!
//! let mut sum = 0;
//! while let Ok(v) = queue.pop() {
//!     sum += v;
//! }
//! producer.join().unwrap();
//!
//! assert_eq!(sum, 4950);
//! assert_eq!(queue.try_pop(), Err(TryPopError::Closed));
//! ```

mod array_queue;
mod backoff;
mod cache_padded;
mod config;
mod error;
mod gate;
mod invariants;
mod metrics;
mod queue;
mod retry;
mod source;
mod spin_lock;

pub use array_queue::ArrayQueue;
pub use backoff::{Backoff, CpuRelax, SpinHint};
pub use cache_padded::INTERFERENCE_SIZE;
pub use config::{Config, DEFAULT_CAPACITY, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::{PushError, QueueError, TryPopError, TryPushError};
pub use metrics::MetricsSnapshot;
pub use queue::BoundedQueue;
pub use source::{feed, FeedError, RecordSource, SourceError};
pub use spin_lock::{SpinLock, SpinLockGuard};
