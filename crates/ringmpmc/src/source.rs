//! Record sources that feed a queue.
//!
//! A [`RecordSource`] yields records one at a time until end of stream.
//! [`feed`] drains a source into a [`BoundedQueue`], blocking while the
//! queue is full.

use crate::BoundedQueue;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error from a record source.
pub type SourceError = Box<dyn StdError + Send + Sync + 'static>;

/// Producer-side input: a stream of records that may fail.
pub trait RecordSource {
    /// Record type handed to the queue.
    type Record;
    /// Failure type of the underlying input.
    type Error;

    /// Returns the next record, `Ok(None)` at end of stream.
    fn next_record(&mut self) -> Result<Option<Self::Record>, Self::Error>;
}

impl<I, R, E> RecordSource for I
where
    I: Iterator<Item = Result<R, E>>,
{
    type Record = R;
    type Error = E;

    #[inline]
    fn next_record(&mut self) -> Result<Option<R>, E> {
        self.next().transpose()
    }
}

/// Why [`feed`] stopped before end of stream.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The source reported an error.
    #[error("record source failed after {pushed} records: {source}")]
    Source {
        /// Records enqueued before the failure.
        pushed: usize,
        /// The source's error.
        source: SourceError,
    },

    /// The queue was closed. The record in hand is dropped.
    #[error("queue closed after {pushed} records")]
    Closed {
        /// Records enqueued before the queue closed.
        pushed: usize,
    },
}

impl FeedError {
    /// Number of records that made it into the queue.
    #[inline]
    pub fn pushed(&self) -> usize {
        match self {
            Self::Source { pushed, .. } | Self::Closed { pushed } => *pushed,
        }
    }
}

/// Pushes every record from `source` into `queue` until end of stream.
///
/// Returns the number of records enqueued.
pub fn feed<S>(mut source: S, queue: &BoundedQueue<S::Record>) -> Result<usize, FeedError>
where
    S: RecordSource,
    S::Error: Into<SourceError>,
{
    let mut pushed = 0usize;
    loop {
        let record = match source.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(err) => {
                let source: SourceError = err.into();
                tracing::warn!(pushed, error = %source, "record source failed");
                return Err(FeedError::Source { pushed, source });
            }
        };

        if queue.push(record).is_err() {
            // Blocking push has no deadline, so the only failure is closure.
            tracing::warn!(pushed, "queue closed during feed");
            return Err(FeedError::Closed { pushed });
        }
        pushed += 1;
    }

    tracing::debug!(pushed, "record source exhausted");
    Ok(pushed)
}
