//! A single-file, crash-recoverable, FIFO persistent queue.
//!
//! A queue is backed by exactly one file: an 8-byte header (`count`, `head_offset`) followed by
//! a sequence of length-prefixed records. Producers append; consumers advance a logical head
//! pointer. Durability is driven entirely by `fsync` ordering — data is synced before the header
//! is updated to acknowledge it — so a crash at any point leaves the file in a state that is safe
//! to reopen and resume from.
//!
//! ```no_run
//! use std::time::Duration;
//! use filequeue::{Codec, Queue, QueueConfig};
//!
//! struct StringCodec;
//!
//! impl Codec<String> for StringCodec {
//!     type EncodeError = std::convert::Infallible;
//!     type DecodeError = std::str::Utf8Error;
//!
//!     fn encode<B: bytes::BufMut>(&self, value: &String, buffer: &mut B) -> Result<(), Self::EncodeError> {
//!         buffer.put_slice(value.as_bytes());
//!         Ok(())
//!     }
//!
//!     fn decode<B: bytes::Buf>(&self, mut buffer: B) -> Result<String, Self::DecodeError> {
//!         let bytes = buffer.copy_to_bytes(buffer.remaining());
//!         Ok(std::str::from_utf8(&bytes)?.to_owned())
//!     }
//! }
//!
//! let config = QueueConfig::from_path("/tmp/my-queue.db").build();
//! let queue = Queue::open(config, StringCodec).unwrap();
//! queue.put(&"hello".to_string(), true, Some(Duration::from_secs(1))).unwrap();
//! assert_eq!(queue.get(true, None).unwrap(), "hello");
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate tracing;

pub mod compactor;
pub mod config;
pub mod encoding;
pub mod error;
pub mod queue;
pub mod record;
pub mod storage;

#[cfg(feature = "metrics")]
pub mod usage;

pub use config::{QueueConfig, QueueConfigBuilder};
pub use encoding::Codec;
pub use error::{QueueError, Result};
pub use queue::Queue;
