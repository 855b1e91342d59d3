//! Shared/exclusive handshake fencing shutdown against in-flight operations.
//!
//! Every push and pop holds the gate in shared mode for the duration of one
//! attempt; any number of shared holders coexist. `close()` and `size()` take
//! it in exclusive mode, which stops new shared entries and waits until the
//! current ones have left.
//!
//! ```text
//!   reader                          writer
//!   ------                          ------
//!   readers += 1        (SeqCst)    lock writer spin lock
//!   load writer_active  (SeqCst)    writer_active = true   (SeqCst)
//!   -> set: readers -= 1, wait      wait until readers == 0 (SeqCst)
//!   -> clear: enter                 ... exclusive section ...
//! ```
//!
//! The SeqCst pairing guarantees at least one side observes the other, so a
//! reader never enters while the writer believes the gate is drained.

use crate::backoff::Backoff;
use crate::cache_padded::CachePadded;
use crate::spin_lock::SpinLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct ShutdownGate {
    readers: CachePadded<AtomicUsize>,
    writer_active: CachePadded<AtomicBool>,
    writer: SpinLock,
}

impl ShutdownGate {
    pub(crate) fn new() -> Self {
        Self {
            readers: CachePadded::new(AtomicUsize::new(0)),
            writer_active: CachePadded::new(AtomicBool::new(false)),
            writer: SpinLock::new(),
        }
    }

    /// Enter in shared mode, waiting out any exclusive holder.
    pub(crate) fn shared(&self) -> SharedGuard<'_> {
        let mut backoff = Backoff::new();
        loop {
            self.readers.fetch_add(1, Ordering::SeqCst);
            if !self.writer_active.load(Ordering::SeqCst) {
                return SharedGuard { gate: self };
            }
            self.readers.fetch_sub(1, Ordering::Release);
            while self.writer_active.load(Ordering::Acquire) {
                backoff.wait();
            }
        }
    }

    /// Enter in exclusive mode once every shared holder has left.
    pub(crate) fn exclusive(&self) -> ExclusiveGuard<'_> {
        self.writer.lock();
        self.writer_active.store(true, Ordering::SeqCst);
        let mut backoff = Backoff::new();
        while self.readers.load(Ordering::SeqCst) != 0 {
            backoff.wait();
        }
        ExclusiveGuard { gate: self }
    }

    /// Returns true while an exclusive holder is present or waiting.
    #[cfg(test)]
    fn is_exclusive_pending(&self) -> bool {
        self.writer_active.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn shared_holders(&self) -> usize {
        self.readers.load(Ordering::SeqCst)
    }
}

#[must_use]
pub(crate) struct SharedGuard<'a> {
    gate: &'a ShutdownGate,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.gate.readers.fetch_sub(1, Ordering::Release);
    }
}

#[must_use]
pub(crate) struct ExclusiveGuard<'a> {
    gate: &'a ShutdownGate,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.gate.writer_active.store(false, Ordering::Release);
        self.gate.writer.unlock();
    }
}
