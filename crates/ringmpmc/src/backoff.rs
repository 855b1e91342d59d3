use std::marker::PhantomData;
use std::thread;

/// CPU-level busy hint issued by spin loops.
///
/// Implementations must not yield or block. The default [`CpuRelax`] maps to
/// [`std::hint::spin_loop`], which compiles to `PAUSE`/`YIELD` where the target
/// has one and to nothing elsewhere.
pub trait SpinHint {
    /// Issue one hint.
    fn hint();
}

/// Default hint: [`std::hint::spin_loop`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuRelax;

impl SpinHint for CpuRelax {
    #[inline]
    fn hint() {
        std::hint::spin_loop();
    }
}

/// Adaptive backoff strategy.
///
/// Spins with an exponentially growing number of hints (1, 2, 4, 8, 16), then
/// yields the rest of the time slice on every further call. One instance per
/// waiting thread; there is no shared state.
#[derive(Debug)]
pub struct Backoff<H: SpinHint = CpuRelax> {
    repetitions: u32,
    _hint: PhantomData<H>,
}

impl Backoff {
    /// Creates a new backoff instance using [`CpuRelax`].
    #[inline]
    pub fn new() -> Self {
        Self::with_hint()
    }
}

impl<H: SpinHint> Backoff<H> {
    const SPIN_LIMIT: u32 = 16; // largest single burst before yielding

    /// Creates a backoff instance issuing `H` as its spin hint.
    #[inline]
    pub fn with_hint() -> Self {
        Self {
            repetitions: 1,
            _hint: PhantomData,
        }
    }

    /// Wait once: a burst of spin hints while under the limit, a yield afterward.
    #[inline]
    pub fn wait(&mut self) {
        if self.repetitions <= Self::SPIN_LIMIT {
            for _ in 0..self.repetitions {
                H::hint();
            }
            self.repetitions <<= 1;
        } else {
            thread::yield_now();
        }
    }

    /// Returns true once further waits yield to the scheduler.
    #[inline]
    pub fn is_yielding(&self) -> bool {
        self.repetitions > Self::SPIN_LIMIT
    }

    /// Reset for next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.repetitions = 1;
    }
}

impl<H: SpinHint> Default for Backoff<H> {
    fn default() -> Self {
        Self::with_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static HINTS: Cell<u32> = const { Cell::new(0) };
    }

    struct CountingHint;

    impl SpinHint for CountingHint {
        fn hint() {
            HINTS.with(|h| h.set(h.get() + 1));
        }
    }

    fn hints() -> u32 {
        HINTS.with(Cell::get)
    }

    #[test]
    fn test_backoff_doubles_spins() {
        let mut b = Backoff::<CountingHint>::with_hint();
        let mut expected = hints();
        for burst in [1, 2, 4, 8, 16] {
            assert!(!b.is_yielding());
            b.wait();
            expected += burst;
            assert_eq!(hints(), expected);
        }
        assert!(b.is_yielding());
    }

    #[test]
    fn test_backoff_yields_without_spinning_past_limit() {
        let mut b = Backoff::<CountingHint>::with_hint();
        while !b.is_yielding() {
            b.wait();
        }
        let before = hints();
        for _ in 0..100 {
            b.wait();
        }
        assert_eq!(hints(), before);
        assert!(b.is_yielding());
    }

    #[test]
    fn test_backoff_reset() {
        let mut b: Backoff = Backoff::default();
        for _ in 0..10 {
            b.wait();
        }
        assert!(b.is_yielding());
        b.reset();
        assert!(!b.is_yielding());
    }
}
