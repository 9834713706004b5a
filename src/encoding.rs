use std::error;

use bytes::{Buf, BufMut};

/// An object that can encode and decode values to and from a buffer, on behalf of a
/// [`Queue`][crate::Queue].
///
/// The queue itself never inspects the bytes a [`Codec`] produces or consumes: every record is
/// stored as an opaque, length-prefixed blob, and it is entirely up to the codec to give those
/// bytes meaning. This mirrors the original queue's two free functions, `dumps`/`loads`, but
/// expressed as a single capability so a queue can be parameterized by one type instead of two
/// loose callables.
pub trait Codec<T>: Send + Sync {
    /// Error returned when encoding a value fails.
    type EncodeError: error::Error + Send + Sync + 'static;

    /// Error returned when decoding a value fails.
    type DecodeError: error::Error + Send + Sync + 'static;

    /// Encodes `value` into `buffer`.
    ///
    /// # Errors
    ///
    /// If the value cannot be represented by this codec, an error variant describing the failure
    /// is returned. The queue does not retry encoding.
    fn encode<B: BufMut>(&self, value: &T, buffer: &mut B) -> Result<(), Self::EncodeError>;

    /// Gets the encoded size, in bytes, of `value`, if this codec can compute it without
    /// actually encoding.
    ///
    /// Used only to pre-size an internal scratch buffer; returning `None` is always correct, just
    /// potentially slower.
    fn encoded_size(&self, _value: &T) -> Option<usize> {
        None
    }

    /// Decodes a value from `buffer`.
    ///
    /// # Errors
    ///
    /// If `buffer` does not hold a value this codec recognizes, an error variant describing the
    /// failure is returned.
    fn decode<B: Buf>(&self, buffer: B) -> Result<T, Self::DecodeError>;
}
