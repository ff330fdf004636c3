//! Field types a message can carry and how each is framed.
//!
//! Scalars are atomic. Strings and byte arrays are length-prefixed and may
//! be split at any byte; primitive arrays and bit sets only between
//! elements. Null strings and arrays carry the length `-1`. A grid id may be
//! split between its global and local parts.

use std::collections::HashMap;
use std::hash::Hash;

use uuid::Uuid;

use super::message::Message;
use super::reader::{MessageReader, Start};
use super::types::{BitSet, GridUuid};
use super::writer::MessageWriter;
use crate::error::{GridwireError, Result};
use crate::serialization::Value;

/// A value that can be written to and read from a message field.
pub trait MessageField: Sized {
    /// Writes the value, returning `Ok(false)` when the buffer filled up.
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool>;

    /// Reads the value, returning `Ok(None)` while more bytes are needed.
    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>>;
}

/// A value that can be an element of a framed collection or map.
pub trait Element: Sized + Send + 'static {
    /// Writes one element.
    fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool>;

    /// Reads one element.
    fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>>;
}

fn required<T>(value: Option<Option<T>>, what: &str) -> Result<Option<T>> {
    match value {
        Some(Some(v)) => Ok(Some(v)),
        Some(None) => Err(GridwireError::Protocol(format!("null {what} in a required field"))),
        None => Ok(None),
    }
}

macro_rules! scalar_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MessageField for $ty {
                fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
                    Ok(writer.put(*self))
                }

                fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
                    Ok(reader.take::<$ty>())
                }
            }
        )*
    };
}

scalar_field!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

macro_rules! array_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MessageField for Vec<$ty> {
                fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
                    writer.put_array(Some(self.as_slice()))
                }

                fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
                    required(reader.take_array::<$ty>()?, "array")
                }
            }

            impl MessageField for Option<Vec<$ty>> {
                fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
                    writer.put_array(self.as_deref())
                }

                fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
                    reader.take_array::<$ty>()
                }
            }
        )*
    };
}

// Vec<u8> is framed as a byte payload, see below.
array_field!(bool, i8, i16, u16, i32, u32, i64, u64, f32, f64);

impl MessageField for char {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_char(*self)
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_char()
    }
}

impl MessageField for Vec<u8> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bytes(Some(self.as_slice()))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_bytes()?, "byte array")
    }
}

impl MessageField for Option<Vec<u8>> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bytes(self.as_deref())
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_bytes()
    }
}

impl MessageField for String {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bytes(Some(self.as_bytes()))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_string()?, "string")
    }
}

impl MessageField for Option<String> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bytes(self.as_deref().map(str::as_bytes))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_string()
    }
}

impl MessageField for Uuid {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        Ok(writer.put_nullable_uuid(Some(self)))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_nullable_uuid()?, "uuid")
    }
}

impl MessageField for Option<Uuid> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        Ok(writer.put_nullable_uuid(self.as_ref()))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_nullable_uuid()
    }
}

impl MessageField for BitSet {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bit_set(Some(self))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_bit_set()?, "bit set")
    }
}

impl MessageField for Option<BitSet> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bit_set(self.as_ref())
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_bit_set()
    }
}

impl MessageField for GridUuid {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_grid_uuid(Some(self))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_grid_uuid()?, "grid id")
    }
}

impl MessageField for Option<GridUuid> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_grid_uuid(self.as_ref())
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_grid_uuid()
    }
}

impl MessageField for Value {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_value(self)
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_value()
    }
}

impl MessageField for Option<Box<dyn Message>> {
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_message(self.as_deref())
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_dyn_message()
    }
}

macro_rules! scalar_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Element for $ty {
                fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
                    Ok(writer.put(*self))
                }

                fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
                    Ok(reader.take::<$ty>())
                }
            }
        )*
    };
}

scalar_element!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Element for char {
    fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_char(*self)
    }

    fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        reader.take_char()
    }
}

impl Element for String {
    fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_bytes(Some(self.as_bytes()))
    }

    fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_string()?, "string element")
    }
}

impl Element for Uuid {
    fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        Ok(writer.put_uuid(self))
    }

    fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        Ok(reader.take_uuid())
    }
}

impl Element for GridUuid {
    fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_grid_uuid(Some(self))
    }

    fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_grid_uuid()?, "grid id element")
    }
}

impl Element for Box<dyn Message> {
    fn write_element(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        writer.put_message(Some(&**self))
    }

    fn read_element(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(reader.take_dyn_message()?, "message element")
    }
}

fn write_elements<E: Element>(writer: &mut MessageWriter<'_, '_>, items: Option<&[E]>) -> Result<bool> {
    let Some(items) = items else {
        return writer.put_bytes(None);
    };
    if !writer.begin_count(items.len())? {
        return Ok(false);
    }
    while let Some(item) = items.get(writer.element_index()) {
        if !item.write_element(writer)? {
            return Ok(false);
        }
        writer.element_done();
    }
    Ok(true)
}

fn read_elements<E: Element>(reader: &mut MessageReader<'_, '_>) -> Result<Option<Option<Vec<E>>>> {
    match reader.begin_container(Vec::<E>::with_capacity)? {
        Start::Pending => return Ok(None),
        Start::Null => return Ok(Some(None)),
        Start::Ready => {}
    }
    while reader.has_more_elements() {
        let Some(item) = E::read_element(reader)? else {
            return Ok(None);
        };
        reader.container_mut::<Vec<E>>()?.push(item);
        reader.element_done();
    }
    reader.finish_container().map(|items| Some(Some(items)))
}

macro_rules! element_array_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MessageField for Vec<$ty> {
                fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
                    write_elements(writer, Some(self.as_slice()))
                }

                fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
                    required(read_elements(reader)?, "array")
                }
            }

            impl MessageField for Option<Vec<$ty>> {
                fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
                    write_elements(writer, self.as_deref())
                }

                fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
                    read_elements(reader)
                }
            }
        )*
    };
}

element_array_field!(String, Uuid, char, GridUuid, Box<dyn Message>);

fn write_entries<K: Element, V: Element>(
    writer: &mut MessageWriter<'_, '_>,
    map: Option<&HashMap<K, V>>,
) -> Result<bool> {
    let Some(map) = map else {
        return writer.put_bytes(None);
    };
    if !writer.begin_count(map.len())? {
        return Ok(false);
    }
    for (key, value) in map.iter().skip(writer.element_index()) {
        if !writer.key_done() {
            if !key.write_element(writer)? {
                return Ok(false);
            }
            writer.set_key_done();
        }
        if !value.write_element(writer)? {
            return Ok(false);
        }
        writer.element_done();
    }
    Ok(true)
}

fn read_entries<K, V>(reader: &mut MessageReader<'_, '_>) -> Result<Option<Option<HashMap<K, V>>>>
where
    K: Element + Eq + Hash,
    V: Element,
{
    match reader.begin_container(HashMap::<K, V>::with_capacity)? {
        Start::Pending => return Ok(None),
        Start::Null => return Ok(Some(None)),
        Start::Ready => {}
    }
    while reader.has_more_elements() {
        if !reader.has_key() {
            let Some(key) = K::read_element(reader)? else {
                return Ok(None);
            };
            reader.stash_key(key);
        }
        let Some(value) = V::read_element(reader)? else {
            return Ok(None);
        };
        let key = reader.take_key::<K>()?;
        reader.container_mut::<HashMap<K, V>>()?.insert(key, value);
        reader.element_done();
    }
    reader.finish_container().map(|map| Some(Some(map)))
}

impl<K, V> MessageField for HashMap<K, V>
where
    K: Element + Eq + Hash,
    V: Element,
{
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        write_entries(writer, Some(self))
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        required(read_entries(reader)?, "map")
    }
}

impl<K, V> MessageField for Option<HashMap<K, V>>
where
    K: Element + Eq + Hash,
    V: Element,
{
    fn write_field(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool> {
        write_entries(writer, self.as_ref())
    }

    fn read_field(reader: &mut MessageReader<'_, '_>) -> Result<Option<Self>> {
        read_entries(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cursor::{ReadCursor, WriteCursor};
    use crate::protocol::message::MessageFactoryRegistry;
    use crate::protocol::state::MessageState;
    use crate::serialization::BinaryMarshaller;

    /// Writes `value` through buffers of `step` bytes, then reads it back
    /// from slices of the same size.
    fn split_round_trip<F: MessageField>(value: &F, step: usize) -> F {
        let marshaller = BinaryMarshaller::default();
        let factories = MessageFactoryRegistry::new();

        let mut state = MessageState::new(8);
        let mut encoded = Vec::new();
        loop {
            let mut buf = vec![0u8; step];
            let mut cursor = WriteCursor::new(&mut buf);
            let done = value
                .write_field(&mut MessageWriter::new(&mut cursor, &mut state, &marshaller))
                .unwrap();
            encoded.extend_from_slice(cursor.written());
            if done {
                break;
            }
        }

        let mut state = MessageState::new(8);
        let mut offset = 0;
        loop {
            let end = (offset + step).min(encoded.len());
            let mut cursor = ReadCursor::new(&encoded[offset..end]);
            let result = F::read_field(&mut MessageReader::new(
                &mut cursor,
                &mut state,
                &marshaller,
                &factories,
            ))
            .unwrap();
            offset += cursor.position();
            if let Some(value) = result {
                assert_eq!(offset, encoded.len());
                return value;
            }
        }
    }

    #[test]
    fn test_string_split_anywhere() {
        let value = "héllo wörld, resumable".to_string();
        for step in [17, 18, 23, 64] {
            assert_eq!(split_round_trip(&value, step), value);
        }
    }

    #[test]
    fn test_null_string_in_optional_field() {
        assert_eq!(split_round_trip(&None::<String>, 17), None);
    }

    #[test]
    fn test_primitive_array_split() {
        let value: Vec<i64> = (0..20).collect();
        assert_eq!(split_round_trip(&value, 17), value);
    }

    #[test]
    fn test_uuid_fields() {
        let id = Uuid::from_u128(0x0123_4567_89AB_CDEF_0011_2233_4455_6677);
        assert_eq!(split_round_trip(&id, 17), id);
        assert_eq!(split_round_trip(&Some(id), 17), Some(id));
        assert_eq!(split_round_trip(&None::<Uuid>, 17), None);
    }

    #[test]
    fn test_string_array_split() {
        let value = vec!["alpha".to_string(), String::new(), "gamma delta".to_string()];
        assert_eq!(split_round_trip(&value, 17), value);
    }

    #[test]
    fn test_map_split() {
        let value: HashMap<String, i64> = (0..8).map(|i| (format!("key-{i}"), i * 1000)).collect();
        assert_eq!(split_round_trip(&value, 17), value);
    }

    #[test]
    fn test_value_field() {
        let value = Value::String("framed".into());
        assert_eq!(split_round_trip(&value, 17), value);
        assert_eq!(split_round_trip(&Value::Null, 17), Value::Null);
    }

    #[test]
    fn test_scalar_keyed_maps_split() {
        let value: HashMap<i16, f64> = (0..6).map(|i| (i * -300, f64::from(i) / 4.0)).collect();
        assert_eq!(split_round_trip(&value, 17), value);

        let value: HashMap<i8, bool> = [(-1, true), (0, false), (7, true)].into_iter().collect();
        assert_eq!(split_round_trip(&value, 17), value);

        let value: HashMap<u32, f32> = [(u32::MAX, 0.5), (1, -2.25)].into_iter().collect();
        assert_eq!(split_round_trip(&Some(value.clone()), 18), Some(value));

        let value: HashMap<u64, char> = [(9, 'é'), (10, 'x')].into_iter().collect();
        assert_eq!(split_round_trip(&value, 17), value);
    }

    #[test]
    fn test_char_array_split() {
        let value: Vec<char> = "gridwire ünïcode".chars().collect();
        assert_eq!(split_round_trip(&value, 17), value);
        assert_eq!(split_round_trip(&None::<Vec<char>>, 17), None);
    }

    #[test]
    fn test_bit_set_field() {
        let value: BitSet = [0, 63, 64, 200, 1000].into_iter().collect();
        for step in [17, 20, 31] {
            assert_eq!(split_round_trip(&value, step), value);
        }
        assert_eq!(split_round_trip(&BitSet::new(), 17), BitSet::new());
        assert_eq!(split_round_trip(&None::<BitSet>, 17), None);
    }

    #[test]
    fn test_grid_uuid_fields() {
        let id = GridUuid::new(Uuid::from_u128(0xFEED_0000_0000_0000_0000_0000_0000_BEEF), 41);
        for step in [17, 18, 24] {
            assert_eq!(split_round_trip(&id, step), id);
        }
        assert_eq!(split_round_trip(&None::<GridUuid>, 17), None);

        let ids: Vec<GridUuid> = (0..4i64).map(|i| GridUuid::new(Uuid::from_u128(i as u128), -i)).collect();
        assert_eq!(split_round_trip(&ids, 18), ids);

        let owners: HashMap<GridUuid, String> =
            ids.iter().map(|id| (*id, format!("node-{}", id.local_id()))).collect();
        assert_eq!(split_round_trip(&owners, 17), owners);
    }

    #[test]
    fn test_bytes_field() {
        let value: Vec<u8> = (0..50).collect();
        assert_eq!(split_round_trip(&value, 17), value);
    }
}
