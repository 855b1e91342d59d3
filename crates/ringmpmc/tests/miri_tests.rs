//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! Miri is an interpreter for Rust's MIR that detects undefined behavior:
//! - Use of uninitialized memory
//! - Out-of-bounds memory access
//! - Use-after-free and double drops
//! - Data races
//!
//! These tests exercise the unsafe slot handling in both queues with heap
//! owning values, so a leaked or double-dropped slot is reported.

use ringmpmc_rs::{ArrayQueue, BoundedQueue, TryPopError};
use std::sync::Arc;
use std::thread;

/// Basic owned-value round trip.
#[test]
fn miri_bounded_basic_operations() {
    let queue = BoundedQueue::<String>::new(4).unwrap();
    queue.push("alpha".to_owned()).unwrap();
    queue.push("beta".to_owned()).unwrap();

    assert_eq!(queue.try_pop().unwrap(), "alpha");
    assert_eq!(queue.try_pop().unwrap(), "beta");
    assert_eq!(queue.try_pop(), Err(TryPopError::Empty));
}

/// Wrap a non-power-of-two queue several times; slots past the requested
/// capacity must never be touched.
#[test]
fn miri_bounded_wrap_around() {
    let queue = BoundedQueue::<Box<u32>>::new(3).unwrap();

    for round in 0..4 {
        for i in 0..3 {
            queue.try_push(Box::new(round * 10 + i)).unwrap();
        }
        assert!(queue.try_push(Box::new(99)).is_err());
        for i in 0..3 {
            assert_eq!(*queue.try_pop().unwrap(), round * 10 + i);
        }
    }
}

/// Values left in the queue are dropped with it, including across a wrap.
#[test]
fn miri_bounded_drop_with_items() {
    let queue = BoundedQueue::<Vec<u8>>::new(5).unwrap();
    for i in 0..5 {
        queue.push(vec![i; 8]).unwrap();
    }
    for _ in 0..3 {
        drop(queue.try_pop().unwrap());
    }
    for i in 0..3 {
        queue.push(vec![i; 4]).unwrap();
    }
    // 5 live values straddle the wrap point when the queue is dropped.
    drop(queue);
}

/// Rejected values come back to the caller intact.
#[test]
fn miri_rejected_value_returned() {
    let queue = BoundedQueue::<String>::new(1).unwrap();
    queue.push("kept".to_owned()).unwrap();
    let rejected = queue.try_push("bounced".to_owned()).unwrap_err();
    assert_eq!(rejected.into_inner(), "bounced");

    queue.close();
    let closed = queue.push("late".to_owned()).unwrap_err();
    assert_eq!(closed.into_inner(), "late");
    assert_eq!(queue.pop().unwrap(), "kept");
}

/// Small concurrent run so miri's race detector sees the commit protocol.
#[test]
fn miri_bounded_two_threads() {
    let queue = Arc::new(BoundedQueue::<Box<u64>>::new(2).unwrap());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..8 {
                queue.push(Box::new(i)).unwrap();
            }
            queue.close();
        })
    };

    let mut sum = 0;
    while let Ok(v) = queue.pop() {
        sum += *v;
    }
    producer.join().unwrap();
    assert_eq!(sum, 28);
}

/// Same checks for the lock-free variant.
#[test]
fn miri_array_queue_wrap_and_drop() {
    let queue = ArrayQueue::<String, 2>::new();
    for i in 0..5 {
        queue.try_push(i.to_string()).unwrap();
        if i > 0 {
            assert_eq!(queue.try_pop().unwrap(), (i - 1).to_string());
        }
    }
    queue.try_push("5".to_owned()).unwrap();
    assert!(queue.try_push("6".to_owned()).is_err());
    assert_eq!(queue.len(), 2);
    drop(queue);
}
