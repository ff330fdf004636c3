//! Resumable field reader.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;
use uuid::Uuid;

use super::constants::{ABSENT, MAX_ATOMIC_UNIT, NULL_LENGTH, NULL_MESSAGE_TYPE, PRESENT, SIZE_OF_UUID};
use super::cursor::ReadCursor;
use super::field::{Element, MessageField};
use super::message::{Message, MessageFactoryRegistry};
use super::state::MessageState;
use super::types::{BitSet, GridUuid};
use crate::error::{GridwireError, Result};
use crate::serialization::{BinaryMarshaller, FromValue, Primitive, Value};

/// Containers are preallocated up to this many elements; the rest grow on
/// demand as elements actually arrive.
const PREALLOCATION_LIMIT: usize = 1024;

/// Outcome of reading a container's count.
pub(crate) enum Start {
    Pending,
    Null,
    Ready,
}

pub(crate) fn checked_length(raw: i32, max: usize) -> Result<usize> {
    let len = usize::try_from(raw)
        .map_err(|_| GridwireError::Serialization(format!("negative length {raw}")))?;
    if len > max {
        return Err(GridwireError::Serialization(format!(
            "length {len} exceeds the limit of {max}"
        )));
    }
    Ok(len)
}

pub(crate) fn uuid_from_bytes(raw: &[u8]) -> Uuid {
    let mut msb = [0u8; 8];
    let mut lsb = [0u8; 8];
    msb.copy_from_slice(&raw[..8]);
    lsb.copy_from_slice(&raw[8..SIZE_OF_UUID]);
    Uuid::from_u64_pair(u64::from_le_bytes(msb), u64::from_le_bytes(lsb))
}

fn unexpected_progress() -> GridwireError {
    GridwireError::Protocol("unexpected progress state for field".to_string())
}

fn progress_mut<T: 'static>(slot: &mut Option<Box<dyn Any + Send>>) -> Result<&mut T> {
    slot.as_mut()
        .and_then(|progress| progress.downcast_mut::<T>())
        .ok_or_else(unexpected_progress)
}

fn take_progress<T: 'static>(slot: &mut Option<Box<dyn Any + Send>>) -> Result<T> {
    let progress = slot.take().ok_or_else(unexpected_progress)?;
    progress
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| unexpected_progress())
}

/// Reads the fields of a message and its nested messages from a cursor.
///
/// Mirrors [`MessageWriter`](super::MessageWriter): fields below the frame's
/// completed count are skipped, partially read containers and nested
/// messages are parked in the frame until more bytes arrive.
pub struct MessageReader<'a, 'b> {
    cursor: &'a mut ReadCursor<'b>,
    state: &'a mut MessageState,
    marshaller: &'a BinaryMarshaller,
    factories: &'a MessageFactoryRegistry,
}

impl<'a, 'b> MessageReader<'a, 'b> {
    pub(crate) fn new(
        cursor: &'a mut ReadCursor<'b>,
        state: &'a mut MessageState,
        marshaller: &'a BinaryMarshaller,
        factories: &'a MessageFactoryRegistry,
    ) -> Self {
        Self {
            cursor,
            state,
            marshaller,
            factories,
        }
    }

    /// Returns the marshaller used for object fields.
    pub fn marshaller(&self) -> &BinaryMarshaller {
        self.marshaller
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Returns the current nesting depth.
    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    fn field(
        &mut self,
        index: u8,
        name: &str,
        read: impl FnOnce(&mut Self) -> Result<bool>,
    ) -> Result<bool> {
        if index < self.state.current().state {
            return Ok(true);
        }
        let done = read(self)?;
        if done {
            let frame = self.state.current_mut();
            frame.state = index + 1;
            frame.field.reset();
        } else {
            trace!(
                field = name,
                index,
                depth = self.state.depth(),
                "field read suspended"
            );
        }
        Ok(done)
    }

    /// Reads a field whose type knows its own encoding.
    pub fn read_field<F: MessageField>(&mut self, index: u8, name: &str, slot: &mut F) -> Result<bool> {
        self.field(index, name, |r| match F::read_field(r)? {
            Some(value) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Reads a field holding a marshalled object.
    pub fn read_object<T: FromValue>(&mut self, index: u8, name: &str, slot: &mut T) -> Result<bool> {
        self.field(index, name, |r| match r.take_object::<T>()? {
            Some(value) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Reads a nested message field.
    pub fn read_message<M: Message + Default>(
        &mut self,
        index: u8,
        name: &str,
        slot: &mut Option<M>,
    ) -> Result<bool> {
        self.field(index, name, |r| match r.take_message::<M>()? {
            Some(message) => {
                *slot = message;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Reads a nested message field of any registered type.
    pub fn read_dyn_message(
        &mut self,
        index: u8,
        name: &str,
        slot: &mut Option<Box<dyn Message>>,
    ) -> Result<bool> {
        self.field(index, name, |r| match r.take_dyn_message()? {
            Some(message) => {
                *slot = message;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Reads an array of nested messages. A null array reads as empty.
    pub fn read_messages<M: Message + Default>(
        &mut self,
        index: u8,
        name: &str,
        slot: &mut Vec<M>,
    ) -> Result<bool> {
        self.field(index, name, |r| {
            match r.begin_container(Vec::<M>::with_capacity)? {
                Start::Pending => return Ok(false),
                Start::Null => {
                    slot.clear();
                    return Ok(true);
                }
                Start::Ready => {}
            }
            while r.has_more_elements() {
                let Some(message) = r.take_message::<M>()? else {
                    return Ok(false);
                };
                let message = message.ok_or_else(null_element)?;
                r.container_mut::<Vec<M>>()?.push(message);
                r.element_done();
            }
            *slot = r.finish_container()?;
            Ok(true)
        })
    }

    /// Reads a map whose values are nested messages. A null map reads as
    /// empty.
    pub fn read_message_map<K, M>(
        &mut self,
        index: u8,
        name: &str,
        slot: &mut HashMap<K, M>,
    ) -> Result<bool>
    where
        K: Element + Eq + Hash,
        M: Message + Default,
    {
        self.field(index, name, |r| {
            match r.begin_container(HashMap::<K, M>::with_capacity)? {
                Start::Pending => return Ok(false),
                Start::Null => {
                    slot.clear();
                    return Ok(true);
                }
                Start::Ready => {}
            }
            while r.has_more_elements() {
                if !r.has_key() {
                    let Some(key) = K::read_element(r)? else {
                        return Ok(false);
                    };
                    r.stash_key(key);
                }
                let Some(message) = r.take_message::<M>()? else {
                    return Ok(false);
                };
                let message = message.ok_or_else(null_element)?;
                let key = r.take_key::<K>()?;
                r.container_mut::<HashMap<K, M>>()?.insert(key, message);
                r.element_done();
            }
            *slot = r.finish_container()?;
            Ok(true)
        })
    }

    fn descend(&mut self, message: &mut dyn Message) -> Result<bool> {
        self.state.forward()?;
        let result = message.read_from(self);
        self.state.backward(matches!(result, Ok(true)));
        result
    }

    /// Reads a nested message of type `M`.
    ///
    /// Returns `Ok(None)` while more bytes are needed and `Ok(Some(None))`
    /// for the null-message marker.
    pub fn take_message<M: Message + Default>(&mut self) -> Result<Option<Option<M>>> {
        let mut message: Box<M> = match self.state.current_mut().field.element.take() {
            Some(progress) => progress.downcast::<M>().map_err(|_| unexpected_progress())?,
            None => {
                let Some(direct_type) = self.cursor.take::<u8>() else {
                    return Ok(None);
                };
                if direct_type == NULL_MESSAGE_TYPE {
                    return Ok(Some(None));
                }
                let message = M::default();
                if message.direct_type() != direct_type {
                    return Err(GridwireError::Protocol(format!(
                        "expected message type {} but found {direct_type}",
                        message.direct_type()
                    )));
                }
                Box::new(message)
            }
        };
        if self.descend(message.as_mut())? {
            Ok(Some(Some(*message)))
        } else {
            self.state.current_mut().field.element = Some(message);
            Ok(None)
        }
    }

    /// Reads a nested message created by the registered factory for its
    /// type byte.
    pub fn take_dyn_message(&mut self) -> Result<Option<Option<Box<dyn Message>>>> {
        let mut message: Box<dyn Message> = match self.state.current_mut().field.element.take() {
            Some(progress) => take_progress::<Box<dyn Message>>(&mut Some(progress))?,
            None => {
                let Some(direct_type) = self.cursor.take::<u8>() else {
                    return Ok(None);
                };
                if direct_type == NULL_MESSAGE_TYPE {
                    return Ok(Some(None));
                }
                self.factories.create(direct_type).ok_or_else(|| {
                    GridwireError::Protocol(format!("no factory for message type {direct_type}"))
                })?
            }
        };
        if self.descend(message.as_mut())? {
            Ok(Some(Some(message)))
        } else {
            self.state.current_mut().field.element = Some(Box::new(message));
            Ok(None)
        }
    }

    /// Reads a primitive if all its bytes are available.
    pub fn take<T: Primitive>(&mut self) -> Option<T> {
        self.cursor.take()
    }

    /// Reads a character stored as one UTF-16 unit.
    pub fn take_char(&mut self) -> Result<Option<char>> {
        let Some(unit) = self.cursor.take::<u16>() else {
            return Ok(None);
        };
        char::from_u32(u32::from(unit)).map(Some).ok_or_else(|| {
            GridwireError::Serialization(format!("unpaired surrogate 0x{unit:04X}"))
        })
    }

    /// Reads a length-prefixed byte payload.
    ///
    /// Returns `Ok(None)` while more bytes are needed and `Ok(Some(None))`
    /// for the null length.
    pub fn take_bytes(&mut self) -> Result<Option<Option<Vec<u8>>>> {
        let max = self.marshaller.config().max_array_length();
        let chunk = &mut self.state.current_mut().field.chunk;
        if !chunk.header_done {
            let Some(raw) = self.cursor.take::<i32>() else {
                return Ok(None);
            };
            if raw == NULL_LENGTH {
                return Ok(Some(None));
            }
            chunk.len = checked_length(raw, max)?;
            chunk.header_done = true;
            chunk.buf.reserve(chunk.len.min(self.cursor.remaining()));
        }
        let wanted = chunk.len - chunk.buf.len();
        chunk.buf.extend_from_slice(self.cursor.take_partial(wanted));
        if chunk.buf.len() < chunk.len {
            return Ok(None);
        }
        let bytes = std::mem::take(&mut chunk.buf);
        chunk.reset();
        Ok(Some(Some(bytes)))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn take_string(&mut self) -> Result<Option<Option<String>>> {
        match self.take_bytes()? {
            Some(Some(bytes)) => String::from_utf8(bytes).map(|s| Some(Some(s))).map_err(|e| {
                GridwireError::Serialization(format!("invalid UTF-8 in string field: {e}"))
            }),
            Some(None) => Ok(Some(None)),
            None => Ok(None),
        }
    }

    /// Reads a length-prefixed primitive array.
    pub fn take_array<T: Primitive>(&mut self) -> Result<Option<Option<Vec<T>>>> {
        match self.begin_container(Vec::<T>::with_capacity)? {
            Start::Pending => return Ok(None),
            Start::Null => return Ok(Some(None)),
            Start::Ready => {}
        }
        let fp = &mut self.state.current_mut().field;
        let items = progress_mut::<Vec<T>>(&mut fp.partial)?;
        while items.len() < fp.len {
            let Some(item) = self.cursor.take::<T>() else {
                return Ok(None);
            };
            items.push(item);
        }
        let items = take_progress::<Vec<T>>(&mut fp.partial)?;
        fp.reset();
        Ok(Some(Some(items)))
    }

    /// Reads a 16-byte UUID once all of it is available.
    pub fn take_uuid(&mut self) -> Option<Uuid> {
        self.cursor.take_exact(SIZE_OF_UUID).map(uuid_from_bytes)
    }

    /// Reads a presence byte followed by a UUID, once the whole unit is
    /// available.
    pub fn take_nullable_uuid(&mut self) -> Result<Option<Option<Uuid>>> {
        let Some(&marker) = self.cursor.remaining_slice().first() else {
            return Ok(None);
        };
        match marker {
            ABSENT => {
                self.cursor.advance(1);
                Ok(Some(None))
            }
            PRESENT => {
                let Some(unit) = self.cursor.take_exact(MAX_ATOMIC_UNIT) else {
                    return Ok(None);
                };
                Ok(Some(Some(uuid_from_bytes(&unit[1..]))))
            }
            other => Err(GridwireError::Protocol(format!(
                "invalid presence marker 0x{other:02X}"
            ))),
        }
    }

    /// Reads a bit set framed as a length-prefixed word array.
    pub fn take_bit_set(&mut self) -> Result<Option<Option<BitSet>>> {
        Ok(self
            .take_array::<u64>()?
            .map(|words| words.map(BitSet::from_words)))
    }

    /// Reads a grid id. The global part is parked in the frame until the
    /// local counter arrives.
    pub fn take_grid_uuid(&mut self) -> Result<Option<Option<GridUuid>>> {
        let global_id = match self.state.current_mut().field.element.take() {
            Some(parked) => take_progress::<Uuid>(&mut Some(parked))?,
            None => match self.take_nullable_uuid()? {
                Some(Some(id)) => id,
                Some(None) => return Ok(Some(None)),
                None => return Ok(None),
            },
        };
        let Some(local_id) = self.cursor.take::<i64>() else {
            self.state.current_mut().field.element = Some(Box::new(global_id));
            return Ok(None);
        };
        Ok(Some(Some(GridUuid::new(global_id, local_id))))
    }

    /// Reads a marshalled blob as a dynamic value; the null length is
    /// [`Value::Null`].
    pub fn take_value(&mut self) -> Result<Option<Value>> {
        match self.take_bytes()? {
            Some(Some(bytes)) => self.marshaller.unmarshal_value(&bytes).map(Some),
            Some(None) => Ok(Some(Value::Null)),
            None => Ok(None),
        }
    }

    /// Reads a marshalled blob as `T`.
    pub fn take_object<T: FromValue>(&mut self) -> Result<Option<T>> {
        match self.take_bytes()? {
            Some(Some(bytes)) => self.marshaller.unmarshal::<T>(&bytes).map(Some),
            Some(None) => T::from_value(Value::Null).map(Some),
            None => Ok(None),
        }
    }

    /// Reads the element count of a container once and parks an empty
    /// container in the frame.
    pub(crate) fn begin_container<C: Any + Send>(
        &mut self,
        create: impl FnOnce(usize) -> C,
    ) -> Result<Start> {
        let max = self.marshaller.config().max_array_length();
        let fp = &mut self.state.current_mut().field;
        if fp.started {
            return Ok(Start::Ready);
        }
        let Some(raw) = self.cursor.take::<i32>() else {
            return Ok(Start::Pending);
        };
        if raw == NULL_LENGTH {
            return Ok(Start::Null);
        }
        fp.len = checked_length(raw, max)?;
        fp.started = true;
        fp.partial = Some(Box::new(create(fp.len.min(PREALLOCATION_LIMIT))));
        Ok(Start::Ready)
    }

    pub(crate) fn has_more_elements(&self) -> bool {
        let fp = &self.state.current().field;
        fp.index < fp.len
    }

    pub(crate) fn container_mut<C: 'static>(&mut self) -> Result<&mut C> {
        progress_mut(&mut self.state.current_mut().field.partial)
    }

    pub(crate) fn element_done(&mut self) {
        let fp = &mut self.state.current_mut().field;
        fp.index += 1;
        fp.key = None;
    }

    pub(crate) fn finish_container<C: 'static>(&mut self) -> Result<C> {
        take_progress(&mut self.state.current_mut().field.partial)
    }

    pub(crate) fn has_key(&self) -> bool {
        self.state.current().field.key.is_some()
    }

    pub(crate) fn stash_key<K: Any + Send>(&mut self, key: K) {
        self.state.current_mut().field.key = Some(Box::new(key));
    }

    pub(crate) fn take_key<K: 'static>(&mut self) -> Result<K> {
        take_progress(&mut self.state.current_mut().field.key)
    }
}

fn null_element() -> GridwireError {
    GridwireError::Protocol("null element in message collection".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all<R>(data: &[u8], f: impl FnOnce(&mut MessageReader<'_, '_>) -> R) -> (R, usize) {
        let marshaller = BinaryMarshaller::default();
        let factories = MessageFactoryRegistry::new();
        let mut state = MessageState::new(8);
        let mut cursor = ReadCursor::new(data);
        let result = {
            let mut reader = MessageReader::new(&mut cursor, &mut state, &marshaller, &factories);
            f(&mut reader)
        };
        (result, cursor.position())
    }

    #[test]
    fn test_take_bytes_resumes() {
        let marshaller = BinaryMarshaller::default();
        let factories = MessageFactoryRegistry::new();
        let mut state = MessageState::new(8);
        let data = [3u8, 0, 0, 0, 7, 8, 9];

        let mut cursor = ReadCursor::new(&data[..5]);
        let first = MessageReader::new(&mut cursor, &mut state, &marshaller, &factories)
            .take_bytes()
            .unwrap();
        assert_eq!(first, None);
        assert_eq!(cursor.position(), 5);

        let mut cursor = ReadCursor::new(&data[5..]);
        let second = MessageReader::new(&mut cursor, &mut state, &marshaller, &factories)
            .take_bytes()
            .unwrap();
        assert_eq!(second, Some(Some(vec![7, 8, 9])));
    }

    #[test]
    fn test_take_bytes_null_and_negative() {
        let (result, _) = read_all(&[0xFF; 4], |r| r.take_bytes().unwrap());
        assert_eq!(result, Some(None));

        let (result, _) = read_all(&(-2i32).to_le_bytes(), |r| r.take_bytes());
        assert!(matches!(result, Err(GridwireError::Serialization(_))));
    }

    #[test]
    fn test_take_array_rejects_oversized_length() {
        let (result, _) = read_all(&i32::MAX.to_le_bytes(), |r| r.take_array::<i64>());
        assert!(matches!(result, Err(GridwireError::Serialization(_))));
    }

    #[test]
    fn test_take_array_waits_for_whole_elements() {
        let mut data = 2i32.to_le_bytes().to_vec();
        data.extend_from_slice(&5i32.to_le_bytes());
        data.extend_from_slice(&[6, 0]);
        let (result, consumed) = read_all(&data, |r| r.take_array::<i32>().unwrap());
        assert_eq!(result, None);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn test_nullable_uuid_needs_whole_unit() {
        let id = Uuid::from_u64_pair(1, 2);
        let mut data = vec![PRESENT];
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&2u64.to_le_bytes());

        let (result, consumed) = read_all(&data[..10], |r| r.take_nullable_uuid().unwrap());
        assert_eq!(result, None);
        assert_eq!(consumed, 0);

        let (result, consumed) = read_all(&data, |r| r.take_nullable_uuid().unwrap());
        assert_eq!(result, Some(Some(id)));
        assert_eq!(consumed, 17);

        let (result, _) = read_all(&[ABSENT], |r| r.take_nullable_uuid().unwrap());
        assert_eq!(result, Some(None));

        let (result, _) = read_all(&[9], |r| r.take_nullable_uuid());
        assert!(matches!(result, Err(GridwireError::Protocol(_))));
    }

    #[test]
    fn test_take_grid_uuid_resumes_after_global_part() {
        let marshaller = BinaryMarshaller::default();
        let factories = MessageFactoryRegistry::new();
        let mut state = MessageState::new(8);
        let mut data = vec![PRESENT];
        data.extend_from_slice(&3u64.to_le_bytes());
        data.extend_from_slice(&4u64.to_le_bytes());
        data.extend_from_slice(&99i64.to_le_bytes());

        let mut cursor = ReadCursor::new(&data[..20]);
        let first = MessageReader::new(&mut cursor, &mut state, &marshaller, &factories)
            .take_grid_uuid()
            .unwrap();
        assert_eq!(first, None);
        assert_eq!(cursor.position(), 17);

        let mut cursor = ReadCursor::new(&data[17..]);
        let second = MessageReader::new(&mut cursor, &mut state, &marshaller, &factories)
            .take_grid_uuid()
            .unwrap();
        assert_eq!(second, Some(Some(GridUuid::new(Uuid::from_u64_pair(3, 4), 99))));

        let (result, _) = read_all(&[ABSENT], |r| r.take_grid_uuid().unwrap());
        assert_eq!(result, Some(None));
    }

    #[test]
    fn test_take_bit_set() {
        let mut data = 2i32.to_le_bytes().to_vec();
        data.extend_from_slice(&5u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        let (result, consumed) = read_all(&data, |r| r.take_bit_set().unwrap());
        assert_eq!(result, Some(Some(BitSet::from_words(vec![5]))));
        assert_eq!(consumed, 20);

        let (result, _) = read_all(&[0xFF; 4], |r| r.take_bit_set().unwrap());
        assert_eq!(result, Some(None));
    }

    #[test]
    fn test_take_char() {
        let (result, _) = read_all(&0x41u16.to_le_bytes(), |r| r.take_char().unwrap());
        assert_eq!(result, Some('A'));
        let (result, _) = read_all(&0xD800u16.to_le_bytes(), |r| r.take_char());
        assert!(result.is_err());
    }

    #[test]
    fn test_take_object_null_length() {
        let (result, _) = read_all(&[0xFF; 4], |r| r.take_object::<Option<String>>().unwrap());
        assert_eq!(result, Some(None));
        let (result, _) = read_all(&[0xFF; 4], |r| r.take_value().unwrap());
        assert_eq!(result, Some(Value::Null));
    }

    #[test]
    fn test_unknown_dyn_message_type() {
        let (result, _) = read_all(&[42], |r| r.take_dyn_message().map(|m| m.is_some()));
        assert!(matches!(result, Err(GridwireError::Protocol(_))));
    }
}
