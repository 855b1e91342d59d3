use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for monitoring queue behavior.
///
/// Updated with relaxed atomics only when [`Config::enable_metrics`](crate::Config)
/// is set; read through [`Metrics::snapshot`].
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pushes: AtomicU64,
    pops: AtomicU64,
    full_rejections: AtomicU64,
    empty_polls: AtomicU64,
    reserve_conflicts: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_pop(&self) {
        self.pops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_reserve_conflict(&self) {
        self.reserve_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            pops: self.pops.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            reserve_conflicts: self.reserve_conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful pushes.
    pub pushes: u64,
    /// Successful pops.
    pub pops: u64,
    /// `try_push` attempts rejected because the queue was full.
    pub full_rejections: u64,
    /// `try_pop` attempts that found the queue empty.
    pub empty_polls: u64,
    /// Lost CAS races on either reservation cursor.
    pub reserve_conflicts: u64,
}
