//! Resumable field writer.

use std::any::Any;
use std::collections::HashMap;

use tracing::trace;
use uuid::Uuid;

use super::constants::{ABSENT, MAX_ATOMIC_UNIT, NULL_LENGTH, NULL_MESSAGE_TYPE, PRESENT, SIZE_OF_UUID};
use super::cursor::WriteCursor;
use super::field::{Element, MessageField};
use super::message::Message;
use super::state::MessageState;
use super::types::{BitSet, GridUuid};
use crate::error::{GridwireError, Result};
use crate::serialization::{BinaryMarshaller, ObjectDataOutput, Primitive, Value};

pub(crate) fn length_prefix(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        GridwireError::Serialization(format!("length {len} does not fit in a 32-bit prefix"))
    })
}

pub(crate) fn uuid_bytes(id: &Uuid) -> [u8; SIZE_OF_UUID] {
    let bits = id.as_u128();
    let mut raw = [0u8; SIZE_OF_UUID];
    raw[..8].copy_from_slice(&((bits >> 64) as u64).to_le_bytes());
    raw[8..].copy_from_slice(&(bits as u64).to_le_bytes());
    raw
}

fn changed_while_writing() -> GridwireError {
    GridwireError::Protocol("field value changed while it was being written".to_string())
}

/// Writes one payload chunk after its length prefix.
fn put_chunk(
    cursor: &mut WriteCursor<'_>,
    header_done: &mut bool,
    offset: &mut usize,
    bytes: &[u8],
) -> Result<bool> {
    if !*header_done {
        if !cursor.put(length_prefix(bytes.len())?) {
            return Ok(false);
        }
        *header_done = true;
    }
    let rest = bytes.get(*offset..).ok_or_else(changed_while_writing)?;
    *offset += cursor.put_partial(rest);
    Ok(*offset == bytes.len())
}

/// Writes the fields of a message and its nested messages into a cursor.
///
/// Every `write_*` method takes the field's declaration index. A field below
/// the frame's completed count is skipped, so a message can simply be
/// written again from the top after a suspension.
pub struct MessageWriter<'a, 'b> {
    cursor: &'a mut WriteCursor<'b>,
    state: &'a mut MessageState,
    marshaller: &'a BinaryMarshaller,
}

impl<'a, 'b> MessageWriter<'a, 'b> {
    pub(crate) fn new(
        cursor: &'a mut WriteCursor<'b>,
        state: &'a mut MessageState,
        marshaller: &'a BinaryMarshaller,
    ) -> Self {
        Self {
            cursor,
            state,
            marshaller,
        }
    }

    /// Returns the marshaller used for object fields.
    pub fn marshaller(&self) -> &BinaryMarshaller {
        self.marshaller
    }

    /// Returns the space left in the current buffer.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Returns the current nesting depth.
    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    /// Writes the message type byte, once per message.
    pub fn write_header(&mut self, message: &dyn Message) -> Result<bool> {
        let frame = self.state.current_mut();
        if frame.header_written {
            return Ok(true);
        }
        if !self.cursor.put(message.direct_type()) {
            return Ok(false);
        }
        frame.header_written = true;
        Ok(true)
    }

    fn field(
        &mut self,
        index: u8,
        name: &str,
        write: impl FnOnce(&mut Self) -> Result<bool>,
    ) -> Result<bool> {
        if index < self.state.current().state {
            return Ok(true);
        }
        let done = write(self)?;
        if done {
            let frame = self.state.current_mut();
            frame.state = index + 1;
            frame.field.reset();
        } else {
            trace!(
                field = name,
                index,
                depth = self.state.depth(),
                "field write suspended"
            );
        }
        Ok(done)
    }

    /// Writes a field whose type knows its own encoding.
    pub fn write_field<F: MessageField>(&mut self, index: u8, name: &str, value: &F) -> Result<bool> {
        self.field(index, name, |w| value.write_field(w))
    }

    /// Writes a field holding a marshalled object.
    pub fn write_object(&mut self, index: u8, name: &str, value: &dyn Any) -> Result<bool> {
        self.field(index, name, |w| w.put_object(value))
    }

    /// Writes a nested message field.
    pub fn write_message<M: Message>(
        &mut self,
        index: u8,
        name: &str,
        message: Option<&M>,
    ) -> Result<bool> {
        self.field(index, name, |w| {
            w.put_message(message.map(|m| m as &dyn Message))
        })
    }

    /// Writes a nested message field of any registered type.
    pub fn write_dyn_message(
        &mut self,
        index: u8,
        name: &str,
        message: Option<&dyn Message>,
    ) -> Result<bool> {
        self.field(index, name, |w| w.put_message(message))
    }

    /// Writes an array of nested messages.
    pub fn write_messages<M: Message>(
        &mut self,
        index: u8,
        name: &str,
        messages: Option<&[M]>,
    ) -> Result<bool> {
        self.field(index, name, |w| {
            let Some(messages) = messages else {
                return Ok(w.cursor.put(NULL_LENGTH));
            };
            if !w.begin_count(messages.len())? {
                return Ok(false);
            }
            while let Some(message) = messages.get(w.element_index()) {
                if !w.descend(message)? {
                    return Ok(false);
                }
                w.element_done();
            }
            Ok(true)
        })
    }

    /// Writes a map whose values are nested messages.
    pub fn write_message_map<K: Element, M: Message>(
        &mut self,
        index: u8,
        name: &str,
        messages: Option<&HashMap<K, M>>,
    ) -> Result<bool> {
        self.field(index, name, |w| {
            let Some(messages) = messages else {
                return Ok(w.cursor.put(NULL_LENGTH));
            };
            if !w.begin_count(messages.len())? {
                return Ok(false);
            }
            for (key, message) in messages.iter().skip(w.element_index()) {
                if !w.key_done() {
                    if !key.write_element(w)? {
                        return Ok(false);
                    }
                    w.set_key_done();
                }
                if !w.descend(message)? {
                    return Ok(false);
                }
                w.element_done();
            }
            Ok(true)
        })
    }

    fn descend(&mut self, message: &dyn Message) -> Result<bool> {
        self.state.forward()?;
        let result = message.write_to(self);
        self.state.backward(matches!(result, Ok(true)));
        result
    }

    /// Writes a type byte and fields, or the null-message marker.
    pub fn put_message(&mut self, message: Option<&dyn Message>) -> Result<bool> {
        match message {
            Some(message) => self.descend(message),
            None => Ok(self.cursor.put(NULL_MESSAGE_TYPE)),
        }
    }

    /// Writes a primitive if it fits entirely.
    pub fn put<T: Primitive>(&mut self, v: T) -> bool {
        self.cursor.put(v)
    }

    /// Writes a character as one UTF-16 unit.
    pub fn put_char(&mut self, c: char) -> Result<bool> {
        let mut units = [0u16; 2];
        match c.encode_utf16(&mut units) {
            [unit] => Ok(self.cursor.put(*unit)),
            _ => Err(GridwireError::Serialization(format!(
                "character U+{:04X} is outside the basic multilingual plane",
                c as u32
            ))),
        }
    }

    /// Writes a length-prefixed byte payload, `None` as the null length.
    ///
    /// The payload may be split at any byte.
    pub fn put_bytes(&mut self, bytes: Option<&[u8]>) -> Result<bool> {
        let Some(bytes) = bytes else {
            return Ok(self.cursor.put(NULL_LENGTH));
        };
        let chunk = &mut self.state.current_mut().field.chunk;
        let done = put_chunk(self.cursor, &mut chunk.header_done, &mut chunk.offset, bytes)?;
        if done {
            chunk.reset();
        }
        Ok(done)
    }

    /// Writes a length-prefixed primitive array, split only between elements.
    pub fn put_array<T: Primitive>(&mut self, items: Option<&[T]>) -> Result<bool> {
        let Some(items) = items else {
            return Ok(self.cursor.put(NULL_LENGTH));
        };
        if !self.begin_count(items.len())? {
            return Ok(false);
        }
        let fp = &mut self.state.current_mut().field;
        while let Some(item) = items.get(fp.index) {
            if !self.cursor.put(*item) {
                return Ok(false);
            }
            fp.index += 1;
        }
        Ok(true)
    }

    /// Writes a UUID as 16 bytes, all or nothing.
    pub fn put_uuid(&mut self, id: &Uuid) -> bool {
        self.cursor.put_all(&uuid_bytes(id))
    }

    /// Writes a presence byte and, when present, the UUID, all or nothing.
    pub fn put_nullable_uuid(&mut self, id: Option<&Uuid>) -> bool {
        let Some(id) = id else {
            return self.cursor.put(ABSENT);
        };
        let mut unit = [0u8; MAX_ATOMIC_UNIT];
        unit[0] = PRESENT;
        unit[1..].copy_from_slice(&uuid_bytes(id));
        self.cursor.put_all(&unit)
    }

    /// Writes a bit set as a length-prefixed array of its words.
    pub fn put_bit_set(&mut self, bits: Option<&BitSet>) -> Result<bool> {
        self.put_array(bits.map(BitSet::words))
    }

    /// Writes a grid id as the nullable UUID unit of its global part
    /// followed by the local counter.
    pub fn put_grid_uuid(&mut self, id: Option<&GridUuid>) -> Result<bool> {
        if !self.state.current().field.chunk.header_done {
            if !self.put_nullable_uuid(id.map(GridUuid::global_id).as_ref()) {
                return Ok(false);
            }
            if id.is_none() {
                return Ok(true);
            }
            self.state.current_mut().field.chunk.header_done = true;
        }
        let id = id.ok_or_else(changed_while_writing)?;
        if !self.cursor.put(id.local_id()) {
            return Ok(false);
        }
        self.state.current_mut().field.chunk.header_done = false;
        Ok(true)
    }

    /// Writes a dynamic value as a length-prefixed marshalled blob.
    ///
    /// [`Value::Null`] is written as the null length.
    pub fn put_value(&mut self, value: &Value) -> Result<bool> {
        if value.is_null() {
            return Ok(self.cursor.put(NULL_LENGTH));
        }
        self.put_staged(|marshaller, out| marshaller.marshal_value(out, value))
    }

    /// Writes any marshallable value as a length-prefixed blob.
    pub fn put_object(&mut self, value: &dyn Any) -> Result<bool> {
        self.put_staged(|marshaller, out| marshaller.marshal_dyn(out, value))
    }

    /// Marshals once into the frame, then streams the staged bytes.
    fn put_staged(
        &mut self,
        marshal: impl FnOnce(&BinaryMarshaller, &mut ObjectDataOutput) -> Result<()>,
    ) -> Result<bool> {
        let chunk = &mut self.state.current_mut().field.chunk;
        if !chunk.staged {
            let mut out = ObjectDataOutput::new();
            marshal(self.marshaller, &mut out)?;
            chunk.buf = out.into_bytes();
            chunk.staged = true;
        }
        let done = put_chunk(self.cursor, &mut chunk.header_done, &mut chunk.offset, &chunk.buf)?;
        if done {
            chunk.reset();
        }
        Ok(done)
    }

    /// Writes the element count of a container, once per field.
    pub(crate) fn begin_count(&mut self, len: usize) -> Result<bool> {
        let fp = &mut self.state.current_mut().field;
        if fp.started {
            return Ok(true);
        }
        if !self.cursor.put(length_prefix(len)?) {
            return Ok(false);
        }
        fp.started = true;
        Ok(true)
    }

    pub(crate) fn element_index(&self) -> usize {
        self.state.current().field.index
    }

    pub(crate) fn element_done(&mut self) {
        let fp = &mut self.state.current_mut().field;
        fp.index += 1;
        fp.key_done = false;
    }

    pub(crate) fn key_done(&self) -> bool {
        self.state.current().field.key_done
    }

    pub(crate) fn set_key_done(&mut self) {
        self.state.current_mut().field.key_done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_writer<R>(buf: &mut [u8], f: impl FnOnce(&mut MessageWriter<'_, '_>) -> R) -> (R, usize) {
        let marshaller = BinaryMarshaller::default();
        let mut state = MessageState::new(8);
        let mut cursor = WriteCursor::new(buf);
        let result = {
            let mut writer = MessageWriter::new(&mut cursor, &mut state, &marshaller);
            f(&mut writer)
        };
        (result, cursor.position())
    }

    #[test]
    fn test_put_bytes_resumes() {
        let marshaller = BinaryMarshaller::default();
        let mut state = MessageState::new(8);
        let payload = [1u8, 2, 3, 4, 5, 6];
        let mut out = Vec::new();

        let mut first = [0u8; 6];
        let mut cursor = WriteCursor::new(&mut first);
        let done = MessageWriter::new(&mut cursor, &mut state, &marshaller)
            .put_bytes(Some(&payload))
            .unwrap();
        assert!(!done);
        out.extend_from_slice(cursor.written());

        let mut second = [0u8; 6];
        let mut cursor = WriteCursor::new(&mut second);
        let done = MessageWriter::new(&mut cursor, &mut state, &marshaller)
            .put_bytes(Some(&payload))
            .unwrap();
        assert!(done);
        out.extend_from_slice(cursor.written());

        assert_eq!(out, vec![6, 0, 0, 0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_null_bytes() {
        let mut buf = [0u8; 4];
        let (done, written) = with_writer(&mut buf, |w| w.put_bytes(None).unwrap());
        assert!(done);
        assert_eq!(written, 4);
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn test_put_array_splits_between_elements() {
        let mut buf = [0u8; 10];
        let (done, written) = with_writer(&mut buf, |w| w.put_array(Some(&[1i32, 2, 3])).unwrap());
        assert!(!done);
        // prefix and one element; the second would straddle the boundary
        assert_eq!(written, 8);
    }

    #[test]
    fn test_nullable_uuid_is_atomic() {
        let id = Uuid::from_u128(1);
        let mut buf = [0u8; 16];
        let (done, written) = with_writer(&mut buf, |w| w.put_nullable_uuid(Some(&id)));
        assert!(!done);
        assert_eq!(written, 0);

        let mut buf = [0u8; 17];
        let (done, _) = with_writer(&mut buf, |w| w.put_nullable_uuid(Some(&id)));
        assert!(done);
        assert_eq!(buf[0], PRESENT);
        assert_eq!(buf[9], 1);
    }

    #[test]
    fn test_grid_uuid_splits_after_global_part() {
        let marshaller = BinaryMarshaller::default();
        let mut state = MessageState::new(8);
        let id = GridUuid::new(Uuid::from_u128(7), -2);

        let mut first = [0u8; 20];
        let mut cursor = WriteCursor::new(&mut first);
        let done = MessageWriter::new(&mut cursor, &mut state, &marshaller)
            .put_grid_uuid(Some(&id))
            .unwrap();
        assert!(!done);
        assert_eq!(cursor.position(), 17);

        let mut second = [0u8; 8];
        let mut cursor = WriteCursor::new(&mut second);
        let done = MessageWriter::new(&mut cursor, &mut state, &marshaller)
            .put_grid_uuid(Some(&id))
            .unwrap();
        assert!(done);
        assert_eq!(second, (-2i64).to_le_bytes());

        let mut buf = [0u8; 1];
        let (done, written) = with_writer(&mut buf, |w| w.put_grid_uuid(None).unwrap());
        assert!(done);
        assert_eq!((written, buf[0]), (1, ABSENT));
    }

    #[test]
    fn test_put_char_rejects_supplementary() {
        let mut buf = [0u8; 4];
        let (result, _) = with_writer(&mut buf, |w| w.put_char('🚀'));
        assert!(result.is_err());
    }

    #[test]
    fn test_put_object_marshals_once() {
        let mut buf = [0u8; 64];
        let (done, written) = with_writer(&mut buf, |w| w.put_object(&42i64).unwrap());
        assert!(done);
        assert_eq!(written, 4 + 9);
        assert_eq!(&buf[..4], &9i32.to_le_bytes());
    }

    #[test]
    fn test_put_object_unknown_type() {
        struct Opaque;
        let mut buf = [0u8; 64];
        let (result, written) = with_writer(&mut buf, |w| w.put_object(&Opaque));
        assert!(matches!(result, Err(GridwireError::UnknownType(_))));
        assert_eq!(written, 0);
    }
}
