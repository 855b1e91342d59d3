//! Error types for queue operations.

use std::fmt;
use thiserror::Error;

/// Terminal errors from construction and the blocking API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The requested capacity is zero or cannot be rounded up to a power of two.
    #[error("invalid queue capacity {requested}")]
    InvalidCapacity {
        /// The capacity that was requested.
        requested: usize,
    },

    /// The queue has been closed.
    #[error("queue is closed")]
    Closed,

    /// A deadline passed before the operation could complete.
    #[error("operation timed out")]
    Timeout,
}

impl QueueError {
    /// Returns `true` if the queue is permanently unusable for this operation.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::InvalidCapacity { .. })
    }
}

/// Rejected `try_push`. The value is handed back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TryPushError<T> {
    /// Every slot is occupied; retry after a consumer makes progress.
    Full(T),
    /// The queue has been closed.
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Recovers the rejected value.
    #[inline]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }

    /// Returns `true` if retrying may succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns `true` if the queue is closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

// Manual impls so that `T` needs no `Debug` bound.
impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("queue is full"),
            Self::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

impl<T> std::error::Error for TryPushError<T> {}

/// Rejected `try_pop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryPopError {
    /// No committed value is available; retry after a producer makes progress.
    #[error("queue is empty")]
    Empty,
    /// The queue is closed and fully drained.
    #[error("queue is closed")]
    Closed,
}

impl TryPopError {
    /// Returns `true` if retrying may succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Failed blocking push. Carries the value back for `Closed` and `Timeout`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PushError<T> {
    /// The value that could not be enqueued.
    pub value: T,
    /// Why the push failed: [`QueueError::Closed`] or [`QueueError::Timeout`].
    pub kind: QueueError,
}

impl<T> PushError<T> {
    /// Recovers the rejected value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push failed: {}", self.kind)
    }
}

impl<T> std::error::Error for PushError<T> {}

impl<T> From<PushError<T>> for QueueError {
    fn from(err: PushError<T>) -> Self {
        err.kind
    }
}
