//! Framing constants.

/// Type byte written in place of an absent nested message.
pub const NULL_MESSAGE_TYPE: u8 = 0xFF;

/// Length written in place of an absent length-prefixed field.
pub const NULL_LENGTH: i32 = -1;

/// Size of an element count or length prefix.
pub const SIZE_OF_LENGTH: usize = 4;

/// Size of an encoded UUID.
pub const SIZE_OF_UUID: usize = 16;

/// Widest unit the framer writes or reads as a whole: a presence byte
/// followed by a UUID.
///
/// A buffer with at least this much room always admits progress.
pub const MAX_ATOMIC_UNIT: usize = 1 + SIZE_OF_UUID;

/// Presence marker for a non-null UUID field.
pub const PRESENT: u8 = 1;

/// Presence marker for a null UUID field.
pub const ABSENT: u8 = 0;
