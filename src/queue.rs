//! The queue itself: lock ordering, blocking put/get, and lifecycle.
//!
//! # Lock ordering
//!
//! Three `parking_lot` primitives coordinate access, always acquired in this order when more
//! than one is needed:
//!
//! 1. `put_lock` / `get_lock` — serialises producers among themselves, and consumers among
//!    themselves. Acquired first.
//! 2. `file_lock` — guards the backing [`Storage`]. Acquired second.
//! 3. `all_tasks_done_cv`'s mutex — guards the unfinished-task counter. Independent of the above;
//!    never held at the same time as `file_lock`.
//!
//! None of the locks here are reentrant. Where the original design this queue is modeled on would
//! have `get` call `peek` and rely on a recursive lock, this implementation instead factors the
//! shared logic into a private `*_locked` helper that assumes its caller already holds the
//! relevant lock, and has both public methods call that helper directly.

use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    compactor,
    config::QueueConfig,
    encoding::Codec,
    error::{QueueError, Result},
    record::{self, RawRecord},
    storage::Storage,
};

/// A single-file, crash-recoverable FIFO queue.
///
/// `Queue` is generic over a value type `T` and a [`Codec<T>`] that knows how to turn values into
/// bytes and back. The queue itself never interprets a record's payload; it only frames and
/// stores opaque bytes.
pub struct Queue<T, C> {
    config: QueueConfig,
    codec: C,

    storage: Mutex<Storage>,
    count: Mutex<u32>,

    get_lock: Mutex<()>,
    put_lock: Mutex<()>,

    put_event: Condvar,
    get_event: Condvar,

    unfinished_tasks: Mutex<i64>,
    all_tasks_done_cv: Condvar,

    closed: AtomicBool,

    _value: std::marker::PhantomData<fn() -> T>,
}

impl<T, C> Queue<T, C>
where
    C: Codec<T>,
{
    /// Opens (or creates) the queue file described by `config`, using `codec` to translate
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Io`] if the file cannot be opened, and
    /// [`QueueError::Corrupt`] if an existing file's header is malformed.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %config.path().display()))]
    pub fn open(config: QueueConfig, codec: C) -> Result<Self> {
        let mut storage = Storage::open_or_create(config.path())?;
        let header = storage.read_header()?;

        Ok(Queue {
            config,
            codec,
            storage: Mutex::new(storage),
            count: Mutex::new(header.count),
            get_lock: Mutex::new(()),
            put_lock: Mutex::new(()),
            put_event: Condvar::new(),
            get_event: Condvar::new(),
            unfinished_tasks: Mutex::new(0),
            all_tasks_done_cv: Condvar::new(),
            closed: AtomicBool::new(false),
            _value: std::marker::PhantomData,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    // ---- put -----------------------------------------------------------------------------

    /// Enqueues `value`, blocking until space is available (or `timeout` elapses) if the queue is
    /// bounded and full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] if the queue is bounded, full, and either non-blocking or
    /// timed out; [`QueueError::Closed`] if the queue has been closed; [`QueueError::Encode`] if
    /// the codec fails; [`QueueError::PayloadTooLarge`] if the encoded value exceeds the record
    /// format's size limit.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn put(&self, value: &T, block: bool, timeout: Option<Duration>) -> Result<()> {
        self.ensure_open()?;

        let mut buffer = bytes::BytesMut::with_capacity(self.codec.encoded_size(value).unwrap_or(64));
        self.codec
            .encode(value, &mut buffer)
            .map_err(|source| QueueError::Encode {
                source: Box::new(source),
            })?;

        let mut framed = bytes::BytesMut::new();
        record::frame(&buffer, &mut framed)?;

        let deadline = timeout.map(|d| Instant::now() + d);
        let mut put_guard = self.put_lock.lock();

        loop {
            self.ensure_open()?;

            let bounded_full = self.config.max_size() > 0
                && *self.count.lock() as u64 >= self.config.max_size();

            if !bounded_full {
                break;
            }

            if !block {
                return Err(QueueError::Full);
            }

            let wait_result = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Full);
                    }
                    let timed_out = self
                        .get_event
                        .wait_for(&mut put_guard, deadline - now)
                        .timed_out();
                    if timed_out {
                        return Err(QueueError::Full);
                    }
                    Ok(())
                }
                None => {
                    self.get_event.wait(&mut put_guard);
                    Ok(())
                }
            };
            wait_result?;
        }

        {
            let mut storage = self.storage.lock();
            storage.append_record(&framed)?;

            let mut count = self.count.lock();
            *count += 1;
            storage.write_header_count(*count)?;
        }

        *self.unfinished_tasks.lock() += 1;
        self.put_event.notify_all();

        #[cfg(feature = "metrics")]
        {
            crate::usage::record_put(&self.config.path().to_string_lossy(), framed.len() as u64);
            crate::usage::set_depth(&self.config.path().to_string_lossy(), *self.count.lock());
        }

        tracing::trace!("put completed");
        Ok(())
    }

    /// Enqueues `value` without blocking; fails immediately with [`QueueError::Full`] if there is
    /// no room.
    pub fn put_nowait(&self, value: &T) -> Result<()> {
        self.put(value, false, None)
    }

    // ---- get / peek ------------------------------------------------------------------------

    /// Reads and removes the item at the head of the queue.
    ///
    /// Blocks (subject to `timeout`) if the queue is empty and `block` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] if the queue is empty and either non-blocking or timed out;
    /// [`QueueError::Closed`] if the queue has been closed; [`QueueError::Decode`] if the codec
    /// fails.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn get(&self, block: bool, timeout: Option<Duration>) -> Result<T> {
        let mut get_guard = self.get_lock.lock();
        self.wait_for_available_locked(&mut get_guard, block, timeout)?;
        self.get_locked()
    }

    /// Reads and removes an item without blocking; fails immediately with
    /// [`QueueError::Empty`] if the queue is empty.
    pub fn get_nowait(&self) -> Result<T> {
        self.get(false, None)
    }

    /// Reads, but does not remove, the item at the head of the queue.
    ///
    /// Blocks (subject to `timeout`) if the queue is empty and `block` is `true`. Defaults to
    /// non-blocking, matching the spec's asymmetry between `get` (blocks by default) and `peek`
    /// (does not).
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn peek(&self, block: bool, timeout: Option<Duration>) -> Result<T> {
        let mut get_guard = self.get_lock.lock();
        self.wait_for_available_locked(&mut get_guard, block, timeout)?;

        let mut storage = self.storage.lock();
        let header = storage.read_header()?;
        let (raw, _next_offset) = storage.read_record_at(u64::from(header.head_offset))?;
        drop(storage);

        self.decode(raw)
    }

    /// Waits, under `get_guard`, until the queue has at least one item, the deadline passes, or
    /// the queue is closed.
    fn wait_for_available_locked(
        &self,
        get_guard: &mut parking_lot::MutexGuard<'_, ()>,
        block: bool,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.ensure_open()?;
        let deadline = timeout.map(|d| Instant::now() + d);

        loop {
            self.ensure_open()?;

            if *self.count.lock() > 0 {
                return Ok(());
            }

            if !block {
                return Err(QueueError::Empty);
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Empty);
                    }
                    if self
                        .put_event
                        .wait_for(get_guard, deadline - now)
                        .timed_out()
                    {
                        return Err(QueueError::Empty);
                    }
                }
                None => {
                    self.put_event.wait(get_guard);
                }
            }
        }
    }

    /// Performs the actual destructive read, assuming `get_lock` is already held and
    /// availability has already been confirmed.
    fn get_locked(&self) -> Result<T> {
        let raw = {
            let mut storage = self.storage.lock();
            let header = storage.read_header()?;
            let (raw, next_offset) = storage.read_record_at(u64::from(header.head_offset))?;

            storage.write_header_head(next_offset as u32)?;

            let mut count = self.count.lock();
            *count -= 1;
            storage.write_header_count(*count)?;

            raw
        };

        self.get_event.notify_all();

        #[cfg(feature = "metrics")]
        {
            crate::usage::record_get(&self.config.path().to_string_lossy());
            crate::usage::set_depth(&self.config.path().to_string_lossy(), *self.count.lock());
        }

        tracing::trace!("get completed");
        self.decode(raw)
    }

    fn decode(&self, raw: RawRecord) -> Result<T> {
        self.codec
            .decode(bytes::Bytes::from(raw.payload))
            .map_err(|source| QueueError::Decode {
                source: Box::new(source),
            })
    }

    // ---- delete ----------------------------------------------------------------------------

    /// Discards up to `n` items from the head of the queue without decoding them.
    ///
    /// `n` greater than the current length is clamped to the current length; `n == 0` is a no-op.
    /// Unlike `get`, this does not affect the unfinished-task counter.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn delete(&self, n: u32) -> Result<()> {
        self.ensure_open()?;
        if n == 0 {
            return Ok(());
        }

        let _get_guard = self.get_lock.lock();
        let mut storage = self.storage.lock();

        let header = storage.read_header()?;
        let to_delete = n.min(header.count);

        let mut offset = u64::from(header.head_offset);
        for _ in 0..to_delete {
            offset = storage.skip_record_at(offset)?;
        }

        storage.write_header_head(offset as u32)?;
        let new_count = header.count - to_delete;
        storage.write_header_count(new_count)?;
        *self.count.lock() = new_count;

        drop(storage);
        self.get_event.notify_all();
        Ok(())
    }

    // ---- clear / copy / flush ---------------------------------------------------------------

    /// Discards every item and resets the file to its freshly-created state.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let _get_guard = self.get_lock.lock();
        let mut storage = self.storage.lock();

        storage.truncate_and_reset()?;
        *self.count.lock() = 0;

        drop(storage);
        self.get_event.notify_all();
        tracing::debug!("queue cleared");
        Ok(())
    }

    /// Flushes durability, then performs a bytewise filesystem copy of the current file to
    /// `new_path`, and returns a new queue instance opened on `new_path` with the same codec and
    /// `flush_threshold`/`max_size` configuration as this queue.
    ///
    /// The origin queue is left untouched and unaffected by the copy.
    #[tracing::instrument(level = "debug", skip_all, fields(new_path = %new_path.as_ref().display()))]
    pub fn copy(&self, new_path: impl AsRef<Path>) -> Result<Queue<T, C>>
    where
        C: Clone,
    {
        self.ensure_open()?;
        let new_path = new_path.as_ref();

        let mut storage = self.storage.lock();
        storage.sync()?;
        fs::copy(self.config.path(), new_path)?;
        drop(storage);

        let new_config = QueueConfig::from_path(new_path)
            .max_size_unsigned(self.config.max_size())
            .flush_threshold(self.config.flush_threshold())
            .build();

        Queue::open(new_config, self.codec.clone())
    }

    /// Reclaims the dead prefix left behind by consumed records, if it exceeds this queue's
    /// configured `flush_threshold`.
    ///
    /// No-op if the threshold has not been reached.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let _get_guard = self.get_lock.lock();
        let mut storage = self.storage.lock();

        let compacted = compactor::maybe_compact(
            &mut storage,
            self.config.path(),
            self.config.flush_threshold(),
        )?;

        if compacted {
            tracing::debug!("flush compacted the queue file");
            #[cfg(feature = "metrics")]
            metrics::counter!("filequeue_flushes_total").increment(1);
        }

        Ok(())
    }

    // ---- introspection -----------------------------------------------------------------------

    /// Number of items currently in the queue.
    pub fn qsize(&self) -> u32 {
        *self.count.lock()
    }

    /// Alias for [`qsize`][Self::qsize], matching general container naming conventions.
    pub fn len(&self) -> u32 {
        self.qsize()
    }

    /// `true` if the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.qsize() == 0
    }

    /// `true` if the queue currently holds no items. Alias kept for parity with the original
    /// queue's vocabulary.
    pub fn empty(&self) -> bool {
        self.is_empty()
    }

    /// `true` if the queue is bounded and currently at capacity.
    pub fn full(&self) -> bool {
        self.config.max_size() > 0 && u64::from(self.qsize()) >= self.config.max_size()
    }

    // ---- task tracking -----------------------------------------------------------------------

    /// Signals that a previously retrieved item has been fully processed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TaskDoneMismatch`] if called more times than there have been
    /// successful `put`s since the counter last reached zero.
    pub fn task_done(&self) -> Result<()> {
        let mut unfinished = self.unfinished_tasks.lock();
        *unfinished -= 1;

        if *unfinished < 0 {
            *unfinished += 1;
            return Err(QueueError::TaskDoneMismatch);
        }

        if *unfinished == 0 {
            self.all_tasks_done_cv.notify_all();
        }

        Ok(())
    }

    /// Blocks until every item put so far has had a matching `task_done` call.
    pub fn join(&self) {
        let mut unfinished = self.unfinished_tasks.lock();
        while *unfinished > 0 {
            self.all_tasks_done_cv.wait(&mut unfinished);
        }
    }

    // ---- lifecycle ---------------------------------------------------------------------------

    /// Closes the queue. Idempotent: calling `close` more than once is a no-op.
    ///
    /// After closing, every mutating operation and every blocking read fails with
    /// [`QueueError::Closed`]; waiters blocked in `get`/`peek`/`put` are woken and observe this
    /// error rather than `Empty`/`Full`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.put_event.notify_all();
        self.get_event.notify_all();
        tracing::debug!("queue closed");
    }

    /// Path to the file this queue is bound to.
    pub fn path(&self) -> &Path {
        self.config.path()
    }
}
