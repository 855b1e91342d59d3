use crate::cache_padded::CachePadded;
use crate::gate::ShutdownGate;
use crate::invariants::{
    debug_assert_cursor_order, debug_assert_monotonic, debug_assert_reservation_bound,
    debug_assert_slot_in_storage,
};
use crate::metrics::Metrics;
use crate::retry;
use crate::{Backoff, Config, MetricsSnapshot, PushError, QueueError, TryPopError, TryPushError};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

// =============================================================================
// RESERVE / COMMIT PROTOCOL
// =============================================================================
//
// Each side (push and pop) owns two unbounded u64 cursors:
//
//   reserved  - next position a thread may claim (CAS, any thread)
//   committed - everything below it is visible to the other side
//
// A single attempt moves through three states:
//
//   Idle ──CAS reserved──▶ Reserved(Claim) ──move value──▶ ──CAS committed──▶ Committed
//
// The committed CAS only succeeds when `committed == claim.position`, so a
// thread that finished its copy early waits for every earlier claim on the
// same side to commit first. Commits therefore become visible strictly in
// reservation order even though copies into disjoint slots run concurrently.
//
// ## Memory Ordering Protocol
//
// **Producer:**
// 1. Load `pop_committed` with Acquire (slot's previous value fully moved out)
// 2. CAS `push_reserved` with Relaxed (ownership only, nothing published yet)
// 3. Write the slot
// 4. CAS `push_committed` with Release (publishes the write; later commits
//    extend the release sequence, so one Acquire of a later value covers all
//    earlier slots)
//
// **Consumer:** mirror image with `push_committed` (Acquire) and
// `pop_committed` (Release).
//
// ## Wraparound
//
// Storage holds exactly `capacity` slots; indices are `position & (ring - 1)`
// with `ring = capacity.next_power_of_two()`. Advancing onto a masked index
// in `[capacity, ring)` jumps straight to the next multiple of `ring`, so the
// padding region is never addressed.
//
// =============================================================================

/// Bounded multi-producer multi-consumer FIFO queue.
///
/// Producers and consumers claim slots by CAS on independent cursors and
/// publish in claim order. A shared/exclusive gate fences [`close`] against
/// in-flight operations; each push or pop holds it for one attempt only.
///
/// [`close`]: BoundedQueue::close
#[repr(C)]
pub struct BoundedQueue<T> {
    // === PRODUCER HOT ===
    /// Positions below this are visible to consumers.
    push_committed: CachePadded<AtomicU64>,
    /// Next position a producer may claim.
    push_reserved: CachePadded<AtomicU64>,

    // === CONSUMER HOT ===
    /// Positions below this have been fully moved out.
    pop_committed: CachePadded<AtomicU64>,
    /// Next position a consumer may claim.
    pop_reserved: CachePadded<AtomicU64>,

    // === SHUTDOWN ===
    closed: CachePadded<AtomicBool>,
    /// Set while a close() is waiting for the exclusive gate.
    closing: AtomicBool,
    gate: ShutdownGate,

    // === COLD STATE ===
    metrics: Metrics,
    config: Config,
    capacity: u64,
    ring_capacity: u64,
    mask: u64,

    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: values are moved in and out by exactly one thread per claimed slot;
// cursor CAS and the commit ordering protocol hand slots between threads.
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

/// A claimed but not yet committed position. Must be committed exactly once.
#[must_use]
#[derive(Debug)]
struct Claim {
    position: u64,
    next: u64,
}

/// Outcome of a pop-side reservation attempt.
enum PopReservation {
    Claimed(Claim),
    Empty,
    Closed,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding up to `capacity` values.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidCapacity`] if `capacity` is zero or too large to
    /// round up to a power of two.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(Config::new(capacity))
    }

    /// Creates a queue from a full configuration.
    pub fn with_config(config: Config) -> Result<Self, QueueError> {
        let ring_capacity = config.ring_capacity().ok_or(QueueError::InvalidCapacity {
            requested: config.capacity,
        })?;

        let buffer: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..config.capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        tracing::debug!(
            capacity = config.capacity,
            ring_capacity,
            metrics = config.enable_metrics,
            "bounded queue created"
        );

        Ok(Self {
            push_committed: CachePadded::new(AtomicU64::new(0)),
            push_reserved: CachePadded::new(AtomicU64::new(0)),
            pop_committed: CachePadded::new(AtomicU64::new(0)),
            pop_reserved: CachePadded::new(AtomicU64::new(0)),
            closed: CachePadded::new(AtomicBool::new(false)),
            closing: AtomicBool::new(false),
            gate: ShutdownGate::new(),
            metrics: Metrics::new(),
            config,
            capacity: config.capacity as u64,
            ring_capacity: ring_capacity as u64,
            mask: ring_capacity as u64 - 1,
            buffer,
        })
    }

    // ---------------------------------------------------------------------
    // CONSTANTS & STATUS
    // ---------------------------------------------------------------------

    /// Returns the number of value slots requested at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the power-of-two span used for index masking.
    #[inline]
    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity as usize
    }

    /// Returns true once [`close`](Self::close) has completed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the number of committed values.
    ///
    /// Takes the gate exclusively, so it waits for in-flight operations and
    /// briefly stalls new ones. The result is stale as soon as it returns.
    pub fn size(&self) -> usize {
        let _exclusive = self.gate.exclusive();
        let pop_committed = self.pop_committed.load(Ordering::Acquire);
        let pop_reserved = self.pop_reserved.load(Ordering::Acquire);
        let push_committed = self.push_committed.load(Ordering::Acquire);
        let push_reserved = self.push_reserved.load(Ordering::Acquire);
        debug_assert_cursor_order!(pop_committed, pop_reserved, push_committed, push_reserved);
        self.occupancy(pop_committed, push_committed)
    }

    /// Returns true if no committed value is waiting.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Get a snapshot of metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Attempts to enqueue `value` once, without waiting for space.
    ///
    /// On failure the value is returned inside the error and no cursor or
    /// slot has been touched.
    pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
        let _shared = self.gate.shared();
        if self.closed.load(Ordering::Acquire) {
            return Err(TryPushError::Closed(value));
        }

        let Some(claim) = self.reserve_push() else {
            self.record(Metrics::add_full_rejection);
            return Err(TryPushError::Full(value));
        };

        // SAFETY: the claim gives this thread exclusive ownership of the slot.
        // `pop_committed` was observed (Acquire) past the slot's previous
        // occupant, so that value has already been moved out.
        unsafe { (*self.slot(claim.position)).write(value) };
        self.commit_push(claim);
        self.record(Metrics::add_push);
        Ok(())
    }

    /// Enqueues `value`, backing off while the queue is full.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] (with the value) if the queue is closed.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        retry::push_until(value, None, |v| self.try_push(v))
    }

    /// Like [`push`](Self::push) but gives up at `deadline` with
    /// [`QueueError::Timeout`].
    pub fn push_deadline(&self, value: T, deadline: Instant) -> Result<(), PushError<T>> {
        retry::push_until(value, Some(deadline), |v| self.try_push(v))
    }

    /// Like [`push`](Self::push) but gives up after `timeout`.
    pub fn push_timeout(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        retry::push_until(value, retry::deadline_after(timeout), |v| self.try_push(v))
    }

    /// Claims the next push position, or `None` if the queue is full.
    fn reserve_push(&self) -> Option<Claim> {
        let mut backoff = Backoff::new();
        let mut reserved = self.push_reserved.load(Ordering::Relaxed);
        loop {
            let next = self.advance(reserved);
            let released = self.pop_committed.load(Ordering::Acquire);
            // A stale `reserved` can trail `released`; the CAS below rejects it.
            if next.saturating_sub(released) > self.ring_capacity {
                return None;
            }
            match self.push_reserved.compare_exchange_weak(
                reserved,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    debug_assert_reservation_bound!(next, released, self.ring_capacity);
                    return Some(Claim {
                        position: reserved,
                        next,
                    });
                }
                Err(current) => {
                    if current != reserved {
                        self.record(Metrics::add_reserve_conflict);
                    }
                    reserved = current;
                    backoff.wait();
                }
            }
        }
    }

    /// Publishes a claimed push once every earlier claim has been published.
    fn commit_push(&self, claim: Claim) {
        debug_assert_monotonic!("push_committed", claim.position, claim.next);
        let mut backoff = Backoff::new();
        while self
            .push_committed
            .compare_exchange_weak(claim.position, claim.next, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            backoff.wait();
        }
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Attempts to dequeue one value without waiting.
    ///
    /// Returns [`TryPopError::Closed`] only once the queue is closed *and*
    /// drained; committed values are still delivered after close.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let _shared = self.gate.shared();

        let claim = match self.reserve_pop() {
            PopReservation::Claimed(claim) => claim,
            PopReservation::Empty => {
                self.record(Metrics::add_empty_poll);
                return Err(TryPopError::Empty);
            }
            PopReservation::Closed => return Err(TryPopError::Closed),
        };

        // SAFETY: the claim gives this thread exclusive ownership of the slot,
        // and `push_committed` was observed (Acquire) past it, so the
        // producer's write is complete and visible. Reading moves the value
        // out; the slot is logically uninitialized until the next producer.
        let value = unsafe { (*self.slot(claim.position)).assume_init_read() };
        self.commit_pop(claim);
        self.record(Metrics::add_pop);
        Ok(value)
    }

    /// Dequeues one value, backing off while the queue is empty.
    ///
    /// Does not attempt a pop while a [`close`](Self::close) is in progress.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] once the queue is closed and drained.
    pub fn pop(&self) -> Result<T, QueueError> {
        retry::pop_until(None, || self.pop_attempt())
    }

    /// Like [`pop`](Self::pop) but gives up at `deadline` with
    /// [`QueueError::Timeout`].
    pub fn pop_deadline(&self, deadline: Instant) -> Result<T, QueueError> {
        retry::pop_until(Some(deadline), || self.pop_attempt())
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        retry::pop_until(retry::deadline_after(timeout), || self.pop_attempt())
    }

    /// One round of a blocking pop; skipped while a close is in progress.
    fn pop_attempt(&self) -> Option<Result<T, TryPopError>> {
        if self.closing.load(Ordering::Acquire) {
            None
        } else {
            Some(self.try_pop())
        }
    }

    fn reserve_pop(&self) -> PopReservation {
        let mut backoff = Backoff::new();
        let mut reserved = self.pop_reserved.load(Ordering::Relaxed);
        loop {
            let published = self.push_committed.load(Ordering::Acquire);
            if reserved == published {
                // `closed` cannot change while the gate is held shared.
                return if self.closed.load(Ordering::Acquire) {
                    PopReservation::Closed
                } else {
                    PopReservation::Empty
                };
            }
            let next = self.advance(reserved);
            match self.pop_reserved.compare_exchange_weak(
                reserved,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return PopReservation::Claimed(Claim {
                        position: reserved,
                        next,
                    });
                }
                Err(current) => {
                    if current != reserved {
                        self.record(Metrics::add_reserve_conflict);
                    }
                    reserved = current;
                    backoff.wait();
                }
            }
        }
    }

    /// Releases a claimed pop slot once every earlier pop claim has released.
    fn commit_pop(&self, claim: Claim) {
        debug_assert_monotonic!("pop_committed", claim.position, claim.next);
        let mut backoff = Backoff::new();
        while self
            .pop_committed
            .compare_exchange_weak(claim.position, claim.next, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            backoff.wait();
        }
    }

    // ---------------------------------------------------------------------
    // LIFECYCLE
    // ---------------------------------------------------------------------

    /// Closes the queue.
    ///
    /// Waits for in-flight pushes and pops to finish, then refuses all
    /// further pushes. Values already committed can still be popped. Only one
    /// concurrent caller performs the close; the others wait for it.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        if self.closing.swap(true, Ordering::AcqRel) {
            let mut backoff = Backoff::new();
            while !self.is_closed() {
                backoff.wait();
            }
            return;
        }

        if !self.is_closed() {
            tracing::debug!(
                capacity = self.config.capacity,
                "closing queue, waiting for in-flight operations"
            );
            let _exclusive = self.gate.exclusive();
            self.closed.store(true, Ordering::Release);
        }
        self.closing.store(false, Ordering::Release);
        tracing::debug!(capacity = self.config.capacity, "queue closed");
    }

    // ---------------------------------------------------------------------
    // INDEXING
    // ---------------------------------------------------------------------

    /// Returns the position after `position`, skipping the padding region.
    #[inline]
    fn advance(&self, position: u64) -> u64 {
        let next = position + 1;
        if next & self.mask >= self.capacity {
            next + (self.ring_capacity - self.capacity)
        } else {
            next
        }
    }

    /// Masked storage index of `position`.
    #[inline]
    fn index(&self, position: u64) -> usize {
        let index = (position & self.mask) as usize;
        debug_assert_slot_in_storage!(index, self.buffer.len());
        index
    }

    #[inline]
    fn slot(&self, position: u64) -> *mut MaybeUninit<T> {
        self.buffer[self.index(position)].get()
    }

    /// Number of valid positions in `[pop, push)`.
    fn occupancy(&self, pop: u64, push: u64) -> usize {
        if pop == push {
            return 0;
        }
        let head = pop & self.mask;
        let tail = push & self.mask;
        let count = if tail > head {
            tail - head
        } else {
            // Equal masked indices with distinct cursors means a full ring.
            self.capacity - (head - tail)
        };
        count as usize
    }

    #[inline]
    fn record(&self, counter: fn(&Metrics)) {
        if self.config.enable_metrics {
            counter(&self.metrics);
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.config.capacity)
            .field("ring_capacity", &self.ring_capacity)
            .field("push_committed", &self.push_committed.load(Ordering::Relaxed))
            .field("pop_committed", &self.pop_committed.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        // No thread can be mid-operation, so reserved == committed on both sides.
        let mut position = *self.pop_committed.get_mut();
        let end = *self.push_committed.get_mut();

        while position != end {
            let index = (position & self.mask) as usize;
            // SAFETY: every position in [pop_committed, push_committed) holds a
            // value that was written and never moved out.
            unsafe {
                ptr::drop_in_place(self.buffer[index].get_mut().as_mut_ptr());
            }
            position = self.advance(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_padded::INTERFERENCE_SIZE;
    use std::mem::offset_of;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_rejects_zero_capacity() {
        assert_eq!(
            BoundedQueue::<u64>::new(0).unwrap_err(),
            QueueError::InvalidCapacity { requested: 0 }
        );
        assert!(BoundedQueue::<u64>::new(usize::MAX).is_err());
    }

    #[test]
    fn test_cursors_on_separate_lines() {
        let offsets = [
            offset_of!(BoundedQueue<u64>, push_committed),
            offset_of!(BoundedQueue<u64>, push_reserved),
            offset_of!(BoundedQueue<u64>, pop_committed),
            offset_of!(BoundedQueue<u64>, pop_reserved),
            offset_of!(BoundedQueue<u64>, closed),
        ];
        for pair in offsets.windows(2) {
            assert!(pair[1] - pair[0] >= INTERFERENCE_SIZE, "{offsets:?}");
        }
        for offset in offsets {
            assert_eq!(offset % INTERFERENCE_SIZE, 0);
        }
    }

    #[test]
    fn test_advance_skips_padding() {
        let q = BoundedQueue::<u8>::new(10).unwrap();
        assert_eq!(q.ring_capacity(), 16);
        assert_eq!(q.advance(0), 1);
        assert_eq!(q.advance(8), 9);
        assert_eq!(q.advance(9), 16);
        assert_eq!(q.advance(25), 32);

        let pow2 = BoundedQueue::<u8>::new(8).unwrap();
        assert_eq!(pow2.advance(7), 8);
        assert_eq!(pow2.advance(15), 16);

        let single = BoundedQueue::<u8>::new(1).unwrap();
        assert_eq!(single.advance(0), 1);
        assert_eq!(single.advance(1), 2);
    }

    #[test]
    fn test_occupancy_across_wrap() {
        let q = BoundedQueue::<u8>::new(10).unwrap();
        assert_eq!(q.occupancy(0, 0), 0);
        assert_eq!(q.occupancy(0, 5), 5);
        assert_eq!(q.occupancy(0, 16), 10);
        assert_eq!(q.occupancy(8, 18), 4);
        assert_eq!(q.occupancy(16, 32), 10);
    }

    #[test]
    fn test_fills_to_requested_capacity() {
        for capacity in [1usize, 3, 8, 10, 17] {
            let q = BoundedQueue::new(capacity).unwrap();
            for i in 0..capacity {
                assert!(q.try_push(i).is_ok(), "capacity {capacity}, push {i}");
            }
            assert_eq!(q.size(), capacity);
            assert!(matches!(q.try_push(usize::MAX), Err(TryPushError::Full(usize::MAX))));
            for i in 0..capacity {
                assert_eq!(q.try_pop(), Ok(i));
            }
            assert_eq!(q.try_pop(), Err(TryPopError::Empty));
        }
    }

    #[test]
    fn test_wraparound_fifo() {
        let q = BoundedQueue::new(10).unwrap();
        let mut next_pop = 0;
        for i in 0..35u32 {
            if q.try_push(i).is_err() {
                assert_eq!(q.size(), 10);
                assert_eq!(q.try_pop(), Ok(next_pop));
                next_pop += 1;
                q.try_push(i).unwrap();
            }
            assert!(q.size() <= 10);
        }
        while let Ok(v) = q.try_pop() {
            assert_eq!(v, next_pop);
            next_pop += 1;
        }
        assert_eq!(next_pop, 35);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let q = BoundedQueue::new(4).unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.close();
        assert!(q.is_closed());

        let err = q.try_push(3).unwrap_err();
        assert!(err.is_closed());
        assert_eq!(err.into_inner(), 3);
        assert_eq!(q.push(4).unwrap_err().kind, QueueError::Closed);

        assert_eq!(q.try_pop(), Ok(1));
        assert_eq!(q.pop(), Ok(2));
        assert_eq!(q.try_pop(), Err(TryPopError::Closed));
        assert_eq!(q.pop(), Err(QueueError::Closed));

        q.close();
        assert!(q.is_closed());
    }

    #[test]
    fn test_blocking_pop_pauses_while_closing() {
        let q = BoundedQueue::new(4).unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();

        q.closing.store(true, Ordering::Release);
        assert_eq!(q.pop_timeout(Duration::from_millis(5)), Err(QueueError::Timeout));
        assert_eq!(q.pop_deadline(Instant::now()), Err(QueueError::Timeout));
        assert_eq!(q.size(), 2);
        // Non-blocking pops are not held back.
        assert_eq!(q.try_pop(), Ok(1));

        q.closing.store(false, Ordering::Release);
        assert_eq!(q.pop(), Ok(2));
    }

    #[test]
    fn test_deadlines() {
        let q = BoundedQueue::new(1).unwrap();
        assert_eq!(q.pop_timeout(Duration::from_millis(5)), Err(QueueError::Timeout));
        q.push(1).unwrap();
        let err = q.push_timeout(2, Duration::from_millis(5)).unwrap_err();
        assert_eq!(err.kind, QueueError::Timeout);
        assert_eq!(err.into_inner(), 2);
        assert_eq!(q.size(), 1);
        assert_eq!(q.pop_deadline(Instant::now()), Ok(1));
    }

    #[test]
    fn test_metrics_counted_when_enabled() {
        let q = BoundedQueue::with_config(Config::new(2).with_metrics(true)).unwrap();
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        assert!(q.try_push(3).is_err());
        q.try_pop().unwrap();
        q.try_pop().unwrap();
        assert!(q.try_pop().is_err());

        let m = q.metrics();
        assert_eq!(m.pushes, 2);
        assert_eq!(m.pops, 2);
        assert_eq!(m.full_rejections, 1);
        assert_eq!(m.empty_polls, 1);

        let quiet = BoundedQueue::new(2).unwrap();
        quiet.try_push(1).unwrap();
        assert_eq!(quiet.metrics(), MetricsSnapshot::default());
    }

    #[test]
    fn test_drop_releases_remaining_values() {
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropTracker;

        impl Drop for DropTracker {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROP_COUNT.store(0, Ordering::SeqCst);
        {
            let q = BoundedQueue::new(5).unwrap();
            for _ in 0..12 {
                if let Err(rejected) = q.try_push(DropTracker) {
                    drop(q.try_pop().unwrap());
                    assert!(q.try_push(rejected.into_inner()).is_ok());
                }
            }
            // 7 popped and dropped, 5 still queued
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 7);
        }
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 12);
    }
}
