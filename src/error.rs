use std::io;

use snafu::Snafu;

/// Error surfaced by any fallible [`Queue`][crate::Queue] operation.
///
/// One variant per failure kind described in the file format's error handling design: callers
/// are expected to match on `Empty`, `Full`, and `TaskDoneMismatch` as part of normal control
/// flow, while `Corrupt` and `Io` indicate the queue's backing file can no longer be trusted.
#[derive(Debug, Snafu)]
pub enum QueueError {
    /// `get`/`peek` found no item available, either because the call was non-blocking or because
    /// a timeout elapsed while waiting.
    #[snafu(display("queue is empty"))]
    Empty,

    /// `put` could not make room for another record, either because the call was non-blocking or
    /// because a timeout elapsed while waiting for the consumer to make progress.
    #[snafu(display("queue is full"))]
    Full,

    /// The queue has been closed; no further operations will succeed.
    #[snafu(display("queue is closed"))]
    Closed,

    /// `task_done` was called more times than there were successful `put`s to account for.
    #[snafu(display("task_done() called too many times"))]
    TaskDoneMismatch,

    /// The on-disk header or a record's framing is inconsistent with the queue's invariants.
    #[snafu(display("corrupt file: {}", reason))]
    Corrupt { reason: String },

    /// The encoded form of a value exceeded the maximum representable record length (2^32 - 1
    /// bytes).
    #[snafu(display("payload too large: {} bytes exceeds the maximum of {}", size, limit))]
    PayloadTooLarge { size: usize, limit: usize },

    /// The caller-supplied codec failed to encode a value.
    #[snafu(display("failed to encode value: {}", source))]
    Encode {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The caller-supplied codec failed to decode a value.
    #[snafu(display("failed to decode value: {}", source))]
    Decode {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An underlying I/O error occurred while touching the backing file.
    #[snafu(display("I/O error: {}", source))]
    Io { source: io::Error },
}

impl From<io::Error> for QueueError {
    fn from(source: io::Error) -> Self {
        QueueError::Io { source }
    }
}

impl QueueError {
    /// Returns `true` if this error represents an expected, recoverable condition (`Empty`,
    /// `Full`, or `TaskDoneMismatch`) rather than a structural problem with the queue itself.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            QueueError::Empty | QueueError::Full | QueueError::TaskDoneMismatch
        )
    }
}

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, QueueError>;
