//! Binary object codec and resumable message framing.
//!
//! Two layers share one wire vocabulary:
//!
//! - [`serialization`]: self-describing values, each a one-byte tag followed
//!   by a little-endian payload, marshalled through [`BinaryMarshaller`].
//! - [`protocol`]: ordered-field [`Message`]s written into and read from
//!   fixed-size buffers, suspending when a buffer is exhausted and resuming
//!   on the next call.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod serialization;

pub use config::{CodecConfig, CodecConfigBuilder};
pub use error::{GridwireError, Result};
pub use protocol::{Message, MessageCodec, MessageFactoryRegistry, ReadSession, WriteSession};
pub use serialization::{BinaryMarshaller, FromValue, Value};
