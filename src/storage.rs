//! File layout, header encode/decode, and the positional storage engine.
//!
//! This module owns the single backing file: opening/creating it, reading and writing the
//! 8-byte header, and appending/reading records at arbitrary offsets. It does not know anything
//! about FIFO semantics, blocking, or locking beyond "every public method here assumes the
//! caller already holds whatever lock the operation requires" — that discipline lives in
//! [`crate::queue`].
//!
//! ## Durability
//!
//! Every method that mutates the file documents exactly what it fsyncs and when. Callers must
//! not reorder these calls: the header must never be made durable before the data it describes.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use bytes::{Buf, BufMut, BytesMut};

use crate::{
    error::{QueueError, Result},
    record::{RawRecord, LENGTH_PREFIX_SIZE},
};
#[cfg(test)]
use crate::record::parse_record;

/// Size, in bytes, of the fixed header at the start of the file.
pub const HEADER_SIZE: u64 = 8;
/// Byte offset of the `count` field within the header.
pub const COUNT_OFFSET: u64 = 0;
/// Byte offset of the `head_offset` field within the header.
pub const HEAD_OFFSET_OFFSET: u64 = 4;
/// Byte offset of the first record in a freshly created file.
pub const FIRST_RECORD_OFFSET: u64 = HEADER_SIZE;

/// The two fields persisted in the file's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub count: u32,
    pub head_offset: u32,
}

impl Header {
    const fn fresh() -> Self {
        Header {
            count: 0,
            head_offset: FIRST_RECORD_OFFSET as u32,
        }
    }

    fn encode(self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_u32_le(self.count);
        buf.put_u32_le(self.head_offset);
        let mut out = [0u8; HEADER_SIZE as usize];
        out.copy_from_slice(&buf);
        out
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(QueueError::Corrupt {
                reason: format!(
                    "header truncated: need {} bytes, found {}",
                    HEADER_SIZE,
                    buf.len()
                ),
            });
        }
        let count = buf.get_u32_le();
        let head_offset = buf.get_u32_le();
        if (head_offset as u64) < HEADER_SIZE {
            return Err(QueueError::Corrupt {
                reason: format!(
                    "head_offset {} is before the first record offset {}",
                    head_offset, HEADER_SIZE
                ),
            });
        }
        Ok(Header { count, head_offset })
    }
}

/// Owns the single mutable file backing a queue, and the low-level operations against it.
///
/// None of `Storage`'s methods take a lock: [`crate::queue::Queue`] is responsible for holding
/// `file_lock` (and, where the spec requires it, `get_lock`/`put_lock`) around every call here.
#[derive(Debug)]
pub struct Storage {
    file: File,
}

impl Storage {
    /// Opens the file at `path`, creating it with a fresh header if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Io`] if the file cannot be opened or created, and
    /// [`QueueError::Corrupt`] if an existing file's header cannot be parsed.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if existed {
            // Existing file: validate that the header is at least well-formed. We don't walk the
            // full record chain here; `Queue::open` is responsible for that if it cares to.
            let mut buf = [0u8; HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            Header::decode(&buf)?;
        } else {
            tracing::debug!("creating new queue file with fresh header");
            file.set_len(0)?;
            Self::write_fresh_header(&mut file)?;
        }

        Ok(Storage { file })
    }

    fn write_fresh_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&Header::fresh().encode())?;
        file.sync_all()?;
        Ok(())
    }

    /// Truncates the file to zero length and rewrites a fresh header, fsyncing before return.
    ///
    /// Used by `clear`. Does not close or reopen the file handle itself; the caller (`Queue`) is
    /// responsible for that if it wants a brand new `File` object.
    pub fn truncate_and_reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        Self::write_fresh_header(&mut self.file)?;
        Ok(())
    }

    /// Reads the current header.
    pub fn read_header(&mut self) -> Result<Header> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Header::decode(&buf)
    }

    /// Writes and fsyncs the `count` field only.
    pub fn write_header_count(&mut self, count: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.file.write_all(&count.to_le_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Writes and fsyncs the `head_offset` field only.
    pub fn write_header_head(&mut self, head_offset: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(HEAD_OFFSET_OFFSET))?;
        self.file.write_all(&head_offset.to_le_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Current size of the file, in bytes.
    pub fn file_size(&mut self) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    /// Appends a framed record to the end of the file and fsyncs the data.
    ///
    /// The header is **not** touched here; the caller must bump and fsync `count` separately,
    /// after this call returns, per the durability ordering rules.
    pub fn append_record(&mut self, framed: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(framed)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Reads one record starting at `offset`, returning the decoded record and the offset of the
    /// byte immediately following it.
    ///
    /// Does not advance `head_offset` or touch the count; purely a positional read.
    pub fn read_record_at(&mut self, offset: u64) -> Result<(RawRecord, u64)> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut length_buf = [0u8; LENGTH_PREFIX_SIZE];
        self.file.read_exact(&mut length_buf).map_err(|source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                QueueError::Corrupt {
                    reason: format!("truncated record at offset {offset}: missing length prefix"),
                }
            } else {
                source.into()
            }
        })?;
        let length = u32::from_le_bytes(length_buf) as usize;

        let mut payload = vec![0u8; length];
        self.file.read_exact(&mut payload).map_err(|source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                QueueError::Corrupt {
                    reason: format!(
                        "truncated record at offset {offset}: declared length {length} but payload was short"
                    ),
                }
            } else {
                source.into()
            }
        })?;

        let next_offset = offset + LENGTH_PREFIX_SIZE as u64 + length as u64;
        Ok((RawRecord { payload }, next_offset))
    }

    /// Reads just the framing of a record at `offset` and returns the offset immediately
    /// following it, without copying the payload bytes into memory.
    ///
    /// Used by `delete`, which discards records without decoding them.
    pub fn skip_record_at(&mut self, offset: u64) -> Result<u64> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut length_buf = [0u8; LENGTH_PREFIX_SIZE];
        self.file.read_exact(&mut length_buf).map_err(|source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                QueueError::Corrupt {
                    reason: format!("truncated record at offset {offset}: missing length prefix"),
                }
            } else {
                source.into()
            }
        })?;
        let length = u64::from(u32::from_le_bytes(length_buf));

        let next_offset = offset + LENGTH_PREFIX_SIZE as u64 + length;
        let actual_size = self.file_size()?;
        if next_offset > actual_size {
            return Err(QueueError::Corrupt {
                reason: format!(
                    "record at offset {offset} declares length {length}, which runs past end of file ({actual_size})"
                ),
            });
        }

        Ok(next_offset)
    }

    /// Copies `len` bytes starting at `src_offset` in this file into `dst`, in fixed-size chunks,
    /// starting at `dst`'s current position.
    ///
    /// Used by the compactor. The loop is the deliberately straightforward "read up to
    /// `min(chunk, remaining)`, write it, subtract" form — see [`crate::compactor`] for why that
    /// matters.
    pub fn copy_chunked(&mut self, src_offset: u64, len: u64, dst: &mut File) -> Result<()> {
        const CHUNK_SIZE: usize = 4096;

        self.file.seek(SeekFrom::Start(src_offset))?;

        let mut remaining = len;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        while remaining > 0 {
            let to_read = std::cmp::min(CHUNK_SIZE as u64, remaining) as usize;
            self.file.read_exact(&mut chunk[..to_read])?;
            dst.write_all(&chunk[..to_read])?;
            remaining -= to_read as u64;
        }

        Ok(())
    }

    /// Flushes and fsyncs the file without any other side effects.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    fn temp_path(dir: &TempDir, name: &str) -> std::path::PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn fresh_file_has_zero_count_and_head_at_first_record() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "q.db");
        let mut storage = Storage::open_or_create(&path).unwrap();
        let header = storage.read_header().unwrap();
        assert_eq!(header.count, 0);
        assert_eq!(header.head_offset, FIRST_RECORD_OFFSET as u32);
        assert_eq!(storage.file_size().unwrap(), HEADER_SIZE);
    }

    #[test]
    fn reopen_preserves_header() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "q.db");
        {
            let mut storage = Storage::open_or_create(&path).unwrap();
            storage.write_header_count(3).unwrap();
            storage.write_header_head(42).unwrap();
        }
        let mut storage = Storage::open_or_create(&path).unwrap();
        let header = storage.read_header().unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.head_offset, 42);
    }

    #[test]
    fn append_and_read_record_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "q.db");
        let mut storage = Storage::open_or_create(&path).unwrap();

        let mut framed = BytesMut::new();
        crate::record::frame(b"payload", &mut framed).unwrap();
        storage.append_record(&framed).unwrap();

        let (record, next_offset) = storage.read_record_at(FIRST_RECORD_OFFSET).unwrap();
        assert_eq!(record.payload, b"payload");
        assert_eq!(next_offset, storage.file_size().unwrap());
    }

    #[test]
    fn skip_record_matches_read_record_offset() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "q.db");
        let mut storage = Storage::open_or_create(&path).unwrap();

        let mut framed = BytesMut::new();
        crate::record::frame(b"abc", &mut framed).unwrap();
        storage.append_record(&framed).unwrap();

        let (_, via_read) = storage.read_record_at(FIRST_RECORD_OFFSET).unwrap();
        let via_skip = storage.skip_record_at(FIRST_RECORD_OFFSET).unwrap();
        assert_eq!(via_read, via_skip);
    }

    #[test]
    fn truncate_and_reset_restores_fresh_header() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "q.db");
        let mut storage = Storage::open_or_create(&path).unwrap();

        let mut framed = BytesMut::new();
        crate::record::frame(b"abc", &mut framed).unwrap();
        storage.append_record(&framed).unwrap();
        storage.write_header_count(1).unwrap();

        storage.truncate_and_reset().unwrap();
        let header = storage.read_header().unwrap();
        assert_eq!(header.count, 0);
        assert_eq!(header.head_offset, FIRST_RECORD_OFFSET as u32);
        assert_eq!(storage.file_size().unwrap(), HEADER_SIZE);
    }

    #[test]
    fn copy_chunked_handles_multi_chunk_copies() {
        let dir = TempDir::new().unwrap();
        let src_path = temp_path(&dir, "src.db");
        let mut storage = Storage::open_or_create(&src_path).unwrap();

        // Write enough data to span multiple 4096-byte chunks.
        let payload = vec![0x5Au8; 10_000];
        let mut framed = BytesMut::new();
        crate::record::frame(&payload, &mut framed).unwrap();
        storage.append_record(&framed).unwrap();

        let dst_path = temp_path(&dir, "dst.db");
        let mut dst = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&dst_path)
            .unwrap();

        let live_len = storage.file_size().unwrap() - FIRST_RECORD_OFFSET;
        storage
            .copy_chunked(FIRST_RECORD_OFFSET, live_len, &mut dst)
            .unwrap();

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut copied = Vec::new();
        dst.read_to_end(&mut copied).unwrap();

        let record = parse_record(&copied).unwrap();
        assert_eq!(record.payload, payload);
    }
}
