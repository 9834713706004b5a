use std::path::{Path, PathBuf};

// Below this size, `flush` is a no-op: rewriting the file isn't worth the I/O.
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 1024 * 1024;

/// Configuration for a [`Queue`][crate::Queue].
///
/// Built through [`QueueConfigBuilder`] rather than constructed directly, so that invalid
/// combinations (a negative `max_size`, for instance) are normalized before a queue is ever
/// opened.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Path to the single file backing this queue.
    pub(crate) path: PathBuf,

    /// Maximum number of records the queue will hold before `put` blocks or fails with `Full`.
    ///
    /// Zero means unbounded.
    pub(crate) max_size: u64,

    /// Size, in bytes, of the dead prefix (`head_offset - 8`) below which `flush` is a no-op.
    pub(crate) flush_threshold: u64,
}

impl QueueConfig {
    /// Starts building a [`QueueConfig`] for the file at `path`.
    pub fn from_path<P>(path: P) -> QueueConfigBuilder
    where
        P: AsRef<Path>,
    {
        QueueConfigBuilder {
            path: path.as_ref().to_path_buf(),
            max_size: None,
            flush_threshold: None,
        }
    }

    /// The path this configuration is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured maximum number of records, or `0` for unbounded.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// The configured flush threshold, in bytes.
    pub fn flush_threshold(&self) -> u64 {
        self.flush_threshold
    }
}

/// Builder for [`QueueConfig`].
#[derive(Clone, Debug)]
pub struct QueueConfigBuilder {
    path: PathBuf,
    max_size: Option<u64>,
    flush_threshold: Option<u64>,
}

impl QueueConfigBuilder {
    /// Sets the maximum number of records the queue can hold before producers block or fail.
    ///
    /// A negative value (passed as `i64` to mirror callers coming from a signed count) is
    /// normalized to `0`, meaning unbounded. Defaults to `0`.
    #[must_use]
    pub fn max_size(mut self, amount: i64) -> Self {
        let normalized = if amount < 0 { 0 } else { amount as u64 };
        self.max_size = Some(normalized);
        self
    }

    /// Sets the maximum number of records using an already-unsigned amount.
    ///
    /// Equivalent to [`max_size`][Self::max_size] but avoids the sign check for callers who
    /// already have a `u64` in hand.
    #[must_use]
    pub fn max_size_unsigned(mut self, amount: u64) -> Self {
        self.max_size = Some(amount);
        self
    }

    /// Sets the size, in bytes, of the dead prefix below which [`flush`][crate::Queue::flush] is
    /// a no-op.
    ///
    /// Defaults to 1 MiB.
    #[must_use]
    pub fn flush_threshold(mut self, bytes: u64) -> Self {
        self.flush_threshold = Some(bytes);
        self
    }

    /// Consumes this builder and constructs a [`QueueConfig`].
    ///
    /// This does not touch the filesystem; opening the backing file happens when the config is
    /// handed to [`Queue::open`][crate::Queue::open].
    #[must_use]
    pub fn build(self) -> QueueConfig {
        QueueConfig {
            path: self.path,
            max_size: self.max_size.unwrap_or(0),
            flush_threshold: self.flush_threshold.unwrap_or(DEFAULT_FLUSH_THRESHOLD),
        }
    }
}
