//! Error types for codec and framing operations.

use std::io;
use thiserror::Error;

/// The main error type for gridwire operations.
///
/// Running out of buffer space or input bytes while framing a message is not
/// an error: framer calls report it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum GridwireError {
    /// A value's runtime type has no wire binding and no registered capability.
    #[error("unknown type: {0} has no wire binding")]
    UnknownType(String),

    /// A wire tag byte with no registered read routine.
    #[error("unknown wire tag: {0}")]
    UnknownTag(u8),

    /// The requested result type does not match what the wire carries.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A deferred type reference could not be resolved on this node.
    #[error("unresolved type: {0}")]
    Unresolved(String),

    /// A standalone buffer ended before the value did.
    #[error("truncated input: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required by the pending read.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// Malformed payload (bad lengths, invalid text, out-of-range values).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Framing violations (unknown message type, nesting too deep).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid codec configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GridwireError {
    /// Returns true if the error only means the input ended early.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

/// A specialized `Result` type for gridwire operations.
pub type Result<T> = std::result::Result<T, GridwireError>;
