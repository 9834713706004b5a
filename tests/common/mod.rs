use std::convert::Infallible;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use filequeue::Codec;
use temp_dir::TempDir;

/// Runs `f` with the path to a fresh queue file inside a freshly created temp directory.
///
/// The directory (and everything under it) is removed when the returned guard drops, which
/// happens after `f` returns.
pub fn with_queue_path<F, V>(f: F) -> V
where
    F: FnOnce(&Path) -> V,
{
    let dir = TempDir::new().expect("cannot recover from failure to create temp dir");
    let path = dir.path().join("queue.db");
    f(&path)
}

/// A codec for `u32` values, used by tests that only care about ordering and don't want to carry
/// string-encoding overhead.
#[derive(Clone, Copy, Debug, Default)]
pub struct U32Codec;

impl Codec<u32> for U32Codec {
    type EncodeError = Infallible;
    type DecodeError = Corrupted;

    fn encode<B: BufMut>(&self, value: &u32, buffer: &mut B) -> Result<(), Self::EncodeError> {
        buffer.put_u32_le(*value);
        Ok(())
    }

    fn encoded_size(&self, _value: &u32) -> Option<usize> {
        Some(4)
    }

    fn decode<B: Buf>(&self, mut buffer: B) -> Result<u32, Self::DecodeError> {
        if buffer.remaining() < 4 {
            return Err(Corrupted);
        }
        Ok(buffer.get_u32_le())
    }
}

/// A codec for raw byte blobs, used by tests that want to push arbitrarily sized payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    type EncodeError = Infallible;
    type DecodeError = Infallible;

    fn encode<B: BufMut>(&self, value: &Vec<u8>, buffer: &mut B) -> Result<(), Self::EncodeError> {
        buffer.put_slice(value);
        Ok(())
    }

    fn encoded_size(&self, value: &Vec<u8>) -> Option<usize> {
        Some(value.len())
    }

    fn decode<B: Buf>(&self, mut buffer: B) -> Result<Vec<u8>, Self::DecodeError> {
        Ok(buffer.copy_to_bytes(buffer.remaining()).to_vec())
    }
}

#[derive(Debug)]
pub struct Corrupted;

impl std::fmt::Display for Corrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "corrupted record")
    }
}

impl std::error::Error for Corrupted {}

#[allow(dead_code)]
pub fn queue_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
