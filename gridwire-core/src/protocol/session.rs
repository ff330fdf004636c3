//! Encode and decode sessions: one message in flight each.

use std::sync::Arc;

use tracing::{debug, warn};

use super::constants::NULL_MESSAGE_TYPE;
use super::cursor::{ReadCursor, WriteCursor};
use super::message::{downcast_message, Message, MessageFactoryRegistry};
use super::reader::MessageReader;
use super::state::MessageState;
use super::writer::MessageWriter;
use crate::error::{GridwireError, Result};
use crate::serialization::BinaryMarshaller;

/// Outcome of one [`WriteSession::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteProgress {
    /// Bytes written into the buffer.
    pub written: usize,
    /// The message is completely written.
    pub finished: bool,
}

/// Writes one message at a time across as many buffers as it takes.
///
/// The caller passes the same message on every call until it reports
/// completion, and must not modify it in between.
#[derive(Debug)]
pub struct WriteSession {
    state: MessageState,
    marshaller: Arc<BinaryMarshaller>,
    active: bool,
}

impl WriteSession {
    /// Creates a session using `marshaller` for object fields.
    pub fn new(marshaller: Arc<BinaryMarshaller>) -> Self {
        let max_depth = marshaller.config().max_nesting_depth();
        Self {
            state: MessageState::new(max_depth),
            marshaller,
            active: false,
        }
    }

    /// Returns `true` while a message is partially written.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the resumption state.
    pub fn state(&self) -> &MessageState {
        &self.state
    }

    /// Writes as much of `message` as fits, returning `Ok(true)` once it is
    /// completely written.
    ///
    /// On error the session is reset and the message must be started over.
    pub fn write(&mut self, message: &dyn Message, cursor: &mut WriteCursor<'_>) -> Result<bool> {
        if !self.active {
            debug!(direct_type = message.direct_type(), "message write started");
            self.active = true;
        }
        let result = {
            let mut writer = MessageWriter::new(cursor, &mut self.state, &self.marshaller);
            message.write_to(&mut writer)
        };
        match result {
            Ok(true) => {
                debug!(direct_type = message.direct_type(), "message write finished");
                self.reset();
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                warn!(direct_type = message.direct_type(), error = %e, "message write failed");
                self.reset();
                Err(e)
            }
        }
    }

    /// Writes into a plain buffer.
    pub fn encode(&mut self, message: &dyn Message, buf: &mut [u8]) -> Result<WriteProgress> {
        let mut cursor = WriteCursor::new(buf);
        let finished = self.write(message, &mut cursor)?;
        Ok(WriteProgress {
            written: cursor.position(),
            finished,
        })
    }

    /// Abandons the message in flight.
    pub fn reset(&mut self) {
        self.state.reset();
        self.active = false;
    }
}

/// Outcome of one [`ReadSession::decode`] call.
#[derive(Debug)]
pub struct ReadProgress {
    /// Bytes consumed from the input.
    pub consumed: usize,
    /// The decoded message, once complete.
    pub message: Option<Box<dyn Message>>,
}

impl ReadProgress {
    /// Takes the decoded message as `M`.
    ///
    /// Returns `None` if nothing was completed or the message is of another
    /// type.
    pub fn into_message<M: Message>(self) -> Option<Box<M>> {
        downcast_message(self.message?)
    }
}

/// Reads one message at a time from as many buffers as it takes.
///
/// The type byte of each root message selects a factory from the registry.
/// Bytes not consumed by a call must be presented again, followed by new
/// data, on the next call.
#[derive(Debug)]
pub struct ReadSession {
    state: MessageState,
    marshaller: Arc<BinaryMarshaller>,
    factories: Arc<MessageFactoryRegistry>,
    current: Option<Box<dyn Message>>,
}

impl ReadSession {
    /// Creates a session decoding the message types in `factories`.
    pub fn new(marshaller: Arc<BinaryMarshaller>, factories: Arc<MessageFactoryRegistry>) -> Self {
        let max_depth = marshaller.config().max_nesting_depth();
        Self {
            state: MessageState::new(max_depth),
            marshaller,
            factories,
            current: None,
        }
    }

    /// Returns `true` while a message is partially read.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Returns the resumption state.
    pub fn state(&self) -> &MessageState {
        &self.state
    }

    /// Reads as much as `cursor` holds, returning the message once it is
    /// complete.
    ///
    /// # Errors
    ///
    /// `Protocol` for a null or unregistered root type, or for malformed
    /// nested data. The session is reset on any error.
    pub fn read(&mut self, cursor: &mut ReadCursor<'_>) -> Result<Option<Box<dyn Message>>> {
        let mut message = match self.current.take() {
            Some(message) => message,
            None => {
                let Some(direct_type) = cursor.take::<u8>() else {
                    return Ok(None);
                };
                if direct_type == NULL_MESSAGE_TYPE {
                    return Err(GridwireError::Protocol(
                        "null message marker at top level".to_string(),
                    ));
                }
                let message = self.factories.create(direct_type).ok_or_else(|| {
                    GridwireError::Protocol(format!("no factory for message type {direct_type}"))
                })?;
                debug!(direct_type, "message read started");
                message
            }
        };
        let result = {
            let mut reader =
                MessageReader::new(cursor, &mut self.state, &self.marshaller, &self.factories);
            message.read_from(&mut reader)
        };
        match result {
            Ok(true) => {
                debug!(direct_type = message.direct_type(), "message read finished");
                self.state.reset();
                Ok(Some(message))
            }
            Ok(false) => {
                self.current = Some(message);
                Ok(None)
            }
            Err(e) => {
                warn!(direct_type = message.direct_type(), error = %e, "message read failed");
                self.reset();
                Err(e)
            }
        }
    }

    /// Reads from a plain buffer.
    pub fn decode(&mut self, data: &[u8]) -> Result<ReadProgress> {
        let mut cursor = ReadCursor::new(data);
        let message = self.read(&mut cursor)?;
        Ok(ReadProgress {
            consumed: cursor.position(),
            message,
        })
    }

    /// Abandons the message in flight.
    pub fn reset(&mut self) {
        self.state.reset();
        self.current = None;
    }
}
