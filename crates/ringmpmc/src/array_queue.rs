//! Lock-free MPMC queue with compile-time capacity.
//!
//! [`ArrayQueue<T, N>`] is the alternative point in the design space to
//! [`BoundedQueue<T>`](crate::BoundedQueue): no gate and no spin lock at all,
//! at the cost of a capacity fixed at compile time (and a power of two).
//!
//! # Algorithm
//!
//! Every slot carries a stamp telling which lap it is ready for:
//!
//! ```text
//!   stamp == pos          slot is free for the producer claiming `pos`
//!   stamp == pos + 1      slot holds the value written at `pos`
//!   stamp == pos + N      slot was emptied and is free for `pos + N`
//! ```
//!
//! A producer claims `pos` by CAS on `tail` only after seeing the slot free,
//! writes, then publishes by storing `pos + 1` (Release). Consumers mirror it
//! on `head`. Each slot hands itself over individually, so there is no
//! ordered-commit spin and no thread ever waits for another mid-operation.
//!
//! # Shutdown
//!
//! [`close`](ArrayQueue::close) is a single store. A push that passed its
//! closed check just before the store may still land afterward. Each push
//! counts itself in `in_flight` before that check, and pops report
//! [`TryPopError::Closed`] only when the queue is closed, no push is in
//! flight, and nothing is stored, so a late push is always drained. Use
//! [`BoundedQueue`](crate::BoundedQueue) when pushes must be fenced off at
//! the instant `close()` returns.

use crate::cache_padded::CachePadded;
use crate::config::DEFAULT_CAPACITY;
use crate::retry;
use crate::{PushError, QueueError, TryPopError, TryPushError};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(stamp: usize) -> Self {
        Self {
            stamp: AtomicUsize::new(stamp),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Lock-free bounded MPMC queue holding up to `N` values inline.
///
/// `N` must be a non-zero power of two; anything else fails to compile.
/// Large `N` makes the struct large, so box it (`Box::new(ArrayQueue::new())`)
/// or keep it in an `Arc` rather than on a thread stack.
#[repr(C)]
pub struct ArrayQueue<T, const N: usize = DEFAULT_CAPACITY> {
    /// Next position to pop.
    head: CachePadded<AtomicUsize>,
    /// Next position to push.
    tail: CachePadded<AtomicUsize>,
    closed: CachePadded<AtomicBool>,
    /// Pushes between their closed check and their stamp store.
    in_flight: CachePadded<AtomicUsize>,
    slots: [Slot<T>; N],
}

// Safety: a slot's value is only touched by the thread that won the CAS for
// its position, and the stamp's Release/Acquire pair hands it over.
unsafe impl<T: Send, const N: usize> Send for ArrayQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for ArrayQueue<T, N> {}

impl<T, const N: usize> ArrayQueue<T, N> {
    /// Compile-time check that `N` is usable for masking.
    const VALID_CAPACITY: () = assert!(
        N > 0 && N.is_power_of_two(),
        "ArrayQueue capacity must be a power of 2"
    );
    const MASK: usize = N - 1;

    /// Creates an empty queue.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            closed: CachePadded::new(AtomicBool::new(false)),
            in_flight: CachePadded::new(AtomicUsize::new(0)),
            slots: std::array::from_fn(Slot::new),
        }
    }

    /// Returns `N`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns an approximate count of stored values.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(N)
    }

    /// Returns true if no value appears to be stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the queue has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the queue. Idempotent.
    pub fn close(&self) {
        // SeqCst pairs with the `in_flight` increment in `try_push`.
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(capacity = N, "array queue closed");
        }
    }

    /// Attempts to enqueue `value` once.
    pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
        // Either this increment is visible to a pop that saw `closed`, or this
        // push sees `closed` below.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = if self.closed.load(Ordering::SeqCst) {
            Err(TryPushError::Closed(value))
        } else {
            self.push_slot(value)
        };
        // Release publishes the `tail` advance to pops that read zero.
        self.in_flight.fetch_sub(1, Ordering::Release);
        result
    }

    fn push_slot(&self, value: T) -> Result<(), TryPushError<T>> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail & Self::MASK];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let lag = stamp.wrapping_sub(tail) as isize;

            if lag == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS on `tail` made this thread the only
                        // writer for `tail`, and the stamp (Acquire) shows the
                        // previous lap's value has been moved out.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => tail = current,
                }
            } else if lag < 0 {
                // The slot still holds the value from one lap ago.
                return Err(TryPushError::Full(value));
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to dequeue one value.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head & Self::MASK];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let lag = stamp.wrapping_sub(head.wrapping_add(1)) as isize;

            if lag == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS on `head` made this thread the only
                        // reader for `head`, and the stamp (Acquire) shows the
                        // producer's write is complete.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp.store(head.wrapping_add(N), Ordering::Release);
                        return Ok(value);
                    }
                    Err(current) => head = current,
                }
            } else if lag < 0 {
                // Nothing published here yet. A push in flight or a claimed
                // but unwritten slot keeps this `Empty` even after close.
                let closed = self.closed.load(Ordering::SeqCst);
                let in_flight = self.in_flight.load(Ordering::SeqCst);
                let tail = self.tail.load(Ordering::Acquire);
                return if closed && in_flight == 0 && tail == head {
                    Err(TryPopError::Closed)
                } else {
                    Err(TryPopError::Empty)
                };
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Enqueues `value`, backing off while full.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        retry::push_until(value, None, |v| self.try_push(v))
    }

    /// Like [`push`](Self::push) but gives up at `deadline`.
    pub fn push_deadline(&self, value: T, deadline: Instant) -> Result<(), PushError<T>> {
        retry::push_until(value, Some(deadline), |v| self.try_push(v))
    }

    /// Like [`push`](Self::push) but gives up after `timeout`.
    pub fn push_timeout(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        retry::push_until(value, retry::deadline_after(timeout), |v| self.try_push(v))
    }

    /// Dequeues one value, backing off while empty.
    pub fn pop(&self) -> Result<T, QueueError> {
        retry::pop_until(None, || Some(self.try_pop()))
    }

    /// Like [`pop`](Self::pop) but gives up at `deadline`.
    pub fn pop_deadline(&self, deadline: Instant) -> Result<T, QueueError> {
        retry::pop_until(Some(deadline), || Some(self.try_pop()))
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        retry::pop_until(retry::deadline_after(timeout), || Some(self.try_pop()))
    }
}

impl<T, const N: usize> Default for ArrayQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for ArrayQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayQueue")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T, const N: usize> Drop for ArrayQueue<T, N> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();

        while head != tail {
            let slot = &mut self.slots[head & Self::MASK];
            // SAFETY: with exclusive access every claim has completed, so each
            // position in [head, tail) holds an initialized value.
            unsafe { slot.value.get_mut().assume_init_drop() };
            head = head.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_in_order() {
        let q = ArrayQueue::<u32, 4>::new();
        assert_eq!(q.try_pop(), Err(TryPopError::Empty));
        for i in 0..4 {
            q.try_push(i).unwrap();
        }
        assert!(matches!(q.try_push(99), Err(TryPushError::Full(99))));
        assert_eq!(q.len(), 4);
        for i in 0..4 {
            assert_eq!(q.try_pop(), Ok(i));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_many_laps() {
        let q = ArrayQueue::<usize, 2>::new();
        for i in 0..100 {
            q.try_push(i).unwrap();
            assert_eq!(q.try_pop(), Ok(i));
        }
    }

    #[test]
    fn test_close() {
        let q = ArrayQueue::<u8, 8>::new();
        q.push(1).unwrap();
        q.close();
        q.close();
        assert!(q.try_push(2).unwrap_err().is_closed());
        assert_eq!(q.pop(), Ok(1));
        assert_eq!(q.try_pop(), Err(TryPopError::Closed));
        assert_eq!(q.pop(), Err(QueueError::Closed));
    }

    #[test]
    fn test_close_waits_for_push_in_flight() {
        let q = ArrayQueue::<u8, 4>::new();
        // A push that passed its closed check but has not claimed a slot yet.
        q.in_flight.fetch_add(1, Ordering::SeqCst);
        q.close();
        assert_eq!(q.try_pop(), Err(TryPopError::Empty));
        assert_eq!(q.pop_timeout(Duration::from_millis(5)), Err(QueueError::Timeout));

        // It lands after close and is still delivered.
        q.push_slot(7).unwrap();
        q.in_flight.fetch_sub(1, Ordering::Release);
        assert_eq!(q.try_pop(), Ok(7));
        assert_eq!(q.try_pop(), Err(TryPopError::Closed));
    }

    #[test]
    fn test_drop_releases_remaining() {
        let q = ArrayQueue::<String, 4>::new();
        q.push("a".to_owned()).unwrap();
        q.push("b".to_owned()).unwrap();
        assert_eq!(q.pop().as_deref(), Ok("a"));
        drop(q);
    }
}
