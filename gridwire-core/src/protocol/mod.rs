//! Resumable message framing.
//!
//! A [`Message`] is an ordered list of fields written into, and read from,
//! caller-supplied buffers of any size. When a buffer fills up or runs dry,
//! the session records how far it got in a stack of [`Frame`]s, one per
//! nesting level, and the next call picks up from there. Nothing already
//! written is written again and no atomic value is ever split.

mod codec;
pub mod constants;
mod cursor;
mod field;
mod message;
mod reader;
mod session;
mod state;
mod types;
mod writer;

pub use codec::MessageCodec;
pub use constants::*;
pub use cursor::{ReadCursor, WriteCursor};
pub use field::{Element, MessageField};
pub use message::{downcast_message, Message, MessageFactory, MessageFactoryRegistry};
pub use reader::MessageReader;
pub use session::{ReadProgress, ReadSession, WriteProgress, WriteSession};
pub use state::{Frame, MessageState};
pub use types::{BitSet, GridUuid};
pub use writer::MessageWriter;
