//! Test-and-set spin lock with a tiered acquisition policy.
//!
//! The lock guards no data of its own. The shutdown gate uses it to serialize
//! exclusive holders; queue slots are protected by cursor CAS, not by this lock.

use crate::backoff::{CpuRelax, SpinHint};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Minimal mutual-exclusion lock over a single atomic flag.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Plain retries with no pause hint.
    const FAST_TRIES: u32 = 5;
    /// Retries each followed by one pause hint.
    const PAUSED_TRIES: u32 = 10;
    /// Retries per burst in the final tier, each followed by `BURST_PAUSES` hints.
    const BURST_TRIES: u32 = 3000;
    const BURST_PAUSES: u32 = 10;

    /// Creates an unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock, spinning through three tiers before yielding.
    ///
    /// The final tier (long pause bursts, then a yield) repeats until the
    /// lock is acquired.
    pub fn lock(&self) {
        for _ in 0..Self::FAST_TRIES {
            if self.try_lock() {
                return;
            }
        }

        for _ in 0..Self::PAUSED_TRIES {
            if self.try_lock() {
                return;
            }
            CpuRelax::hint();
        }

        loop {
            for _ in 0..Self::BURST_TRIES {
                if self.try_lock() {
                    return;
                }
                for _ in 0..Self::BURST_PAUSES {
                    CpuRelax::hint();
                }
            }
            tracing::trace!("spin lock contended, yielding");
            thread::yield_now();
        }
    }

    /// Attempts to acquire the lock once. Returns `true` if the flag was unset.
    #[inline]
    pub fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    /// Releases the lock.
    ///
    /// Calling this without holding the lock releases someone else's
    /// acquisition; prefer [`SpinLock::guard`].
    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Returns true if the lock is currently held by anyone.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    pub fn guard(&self) -> SpinLockGuard<'_> {
        self.lock();
        SpinLockGuard { lock: self }
    }
}

/// RAII guard returned by [`SpinLock::guard`].
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
