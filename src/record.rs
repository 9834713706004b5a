//! Record framing: the `u32 LE length || payload` unit that every entry in the queue's data
//! region is packed as.
//!
//! # Warning
//!
//! This is the on-disk wire format. Do not change the width or endianness of the length prefix;
//! doing so breaks every file already written by a previous version of this crate.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{QueueError, Result};

/// Width, in bytes, of a record's length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload a record can carry, bounded by the width of the length prefix.
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Frames `payload` as `length || payload` into `buffer`, appending to whatever is already there.
///
/// # Errors
///
/// Returns [`QueueError::PayloadTooLarge`] if `payload` is too large to be represented by the
/// 32-bit length prefix.
pub fn frame(payload: &[u8], buffer: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(QueueError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    buffer.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buffer.put_u32_le(payload.len() as u32);
    buffer.put_slice(payload);
    Ok(())
}

/// A record as read back from disk: its decoded length and the raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub payload: Vec<u8>,
}

impl RawRecord {
    /// Total on-disk size of this record, including its length prefix.
    pub fn framed_len(&self) -> u64 {
        (LENGTH_PREFIX_SIZE + self.payload.len()) as u64
    }
}

/// Parses a single framed record out of the front of `buf`.
///
/// `buf` must contain at least the length prefix; if it is shorter than the length prefix plus
/// the payload length it declares, this is a truncated/corrupt record.
///
/// # Errors
///
/// Returns [`QueueError::Corrupt`] if `buf` is too short to contain a well-formed record.
pub fn parse_record(mut buf: &[u8]) -> Result<RawRecord> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Err(QueueError::Corrupt {
            reason: format!(
                "truncated record: need {} bytes for length prefix, found {}",
                LENGTH_PREFIX_SIZE,
                buf.len()
            ),
        });
    }

    let length = buf.get_u32_le() as usize;
    if buf.remaining() < length {
        return Err(QueueError::Corrupt {
            reason: format!(
                "truncated record: declared length {} but only {} bytes available",
                length,
                buf.remaining()
            ),
        });
    }

    let payload = buf[..length].to_vec();
    Ok(RawRecord { payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_then_parse_round_trips() {
        let mut buffer = BytesMut::new();
        frame(b"hello", &mut buffer).unwrap();
        assert_eq!(buffer.len(), LENGTH_PREFIX_SIZE + 5);

        let record = parse_record(&buffer).unwrap();
        assert_eq!(record.payload, b"hello");
        assert_eq!(record.framed_len(), (LENGTH_PREFIX_SIZE + 5) as u64);
    }

    #[test]
    fn frame_empty_payload() {
        let mut buffer = BytesMut::new();
        frame(b"", &mut buffer).unwrap();
        let record = parse_record(&buffer).unwrap();
        assert!(record.payload.is_empty());
    }

    #[test]
    fn parse_rejects_short_length_prefix() {
        let err = parse_record(&[1, 2]).unwrap_err();
        assert!(matches!(err, QueueError::Corrupt { .. }));
    }

    #[test]
    fn parse_rejects_truncated_payload() {
        let mut buffer = BytesMut::new();
        buffer.put_u32_le(10);
        buffer.put_slice(b"short");
        let err = parse_record(&buffer).unwrap_err();
        assert!(matches!(err, QueueError::Corrupt { .. }));
    }

    #[test]
    fn frame_at_four_kib_chunk_boundary() {
        let payload = vec![0xAB; 4096 - LENGTH_PREFIX_SIZE];
        let mut buffer = BytesMut::new();
        frame(&payload, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 4096);
        let record = parse_record(&buffer).unwrap();
        assert_eq!(record.payload, payload);
    }
}
