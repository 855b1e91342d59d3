//! Blocking wrappers shared by both queue flavors.
//!
//! `Full`/`Empty` turn into a backoff and another attempt; `Closed` and an
//! expired deadline end the loop. Stopping between attempts is always safe:
//! a failed attempt never leaves a claimed slot behind.

use crate::{Backoff, PushError, QueueError, TryPopError, TryPushError};
use std::time::{Duration, Instant};

/// Deadline `timeout` from now; `None` (no deadline) if it would overflow.
#[inline]
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[inline]
fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

pub(crate) fn push_until<T>(
    mut value: T,
    deadline: Option<Instant>,
    mut attempt: impl FnMut(T) -> Result<(), TryPushError<T>>,
) -> Result<(), PushError<T>> {
    let mut backoff = Backoff::new();
    loop {
        match attempt(value) {
            Ok(()) => return Ok(()),
            Err(TryPushError::Closed(rejected)) => {
                return Err(PushError {
                    value: rejected,
                    kind: QueueError::Closed,
                });
            }
            Err(TryPushError::Full(rejected)) => value = rejected,
        }
        if expired(deadline) {
            tracing::debug!("push deadline expired");
            return Err(PushError {
                value,
                kind: QueueError::Timeout,
            });
        }
        backoff.wait();
    }
}

/// `attempt` returns `None` to skip a round without popping.
pub(crate) fn pop_until<T>(
    deadline: Option<Instant>,
    mut attempt: impl FnMut() -> Option<Result<T, TryPopError>>,
) -> Result<T, QueueError> {
    let mut backoff = Backoff::new();
    loop {
        match attempt() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(TryPopError::Closed)) => return Err(QueueError::Closed),
            Some(Err(TryPopError::Empty)) | None => {}
        }
        if expired(deadline) {
            tracing::debug!("pop deadline expired");
            return Err(QueueError::Timeout);
        }
        backoff.wait();
    }
}
