//! Read dispatch table.
//!
//! A fixed 256-slot table indexed by wire tag. Dual slots decode the same
//! bytes as either a signed or an unsigned Rust type, chosen by comparing the
//! caller's requested [`TypeId`] against the two the slot serves.

use std::any::TypeId;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::binary_object::BinaryObject;
use super::enum_value::EnumValue;
use super::primitive::Primitive;
use super::traits::Request;
use super::value::Value;
use super::wire_tag::{tag_name, tags, CollectionFlavor, MapFlavor};
use super::{DataInput, ObjectDataInput};
use crate::config::CodecConfig;
use crate::error::{GridwireError, Result};

/// Wire type ids of the Rust types registered as structured objects.
pub(crate) trait ObjectTypes {
    fn object_type_id(&self, type_id: TypeId) -> Option<i32>;
}

/// Cursor-bound decoding state for one top-level value.
pub(crate) struct ValueReader<'a, 'b> {
    input: &'b mut ObjectDataInput<'a>,
    max_len: usize,
    depth: usize,
    max_depth: usize,
    objects: Option<&'b dyn ObjectTypes>,
}

impl<'a, 'b> ValueReader<'a, 'b> {
    pub(crate) fn new(input: &'b mut ObjectDataInput<'a>, config: &CodecConfig) -> Self {
        Self {
            input,
            max_len: config.max_array_length(),
            depth: 0,
            max_depth: config.max_nesting_depth(),
            objects: None,
        }
    }

    /// Checks structured objects requested as an exact type against `objects`.
    pub(crate) fn with_objects(mut self, objects: &'b dyn ObjectTypes) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Reads a tag and the value it introduces.
    pub(crate) fn read_value(&mut self, req: &Request) -> Result<Value> {
        let tag = self.input.read_u8()?;
        self.read_tagged(tag, req)
    }

    fn read_tagged(&mut self, tag: u8, req: &Request) -> Result<Value> {
        if tag == tags::NULL {
            return Ok(Value::Null);
        }
        match &READ_TABLE[tag as usize] {
            Some(slot) => slot.read(self, req),
            None if tag == tags::OBJ => {
                let obj = BinaryObject::read_body(self.input, self.max_len)?;
                self.check_object_type(&obj, req)?;
                Ok(Value::Object(obj))
            }
            None => {
                debug!(tag, "no reader registered for wire tag");
                Err(GridwireError::UnknownTag(tag))
            }
        }
    }

    fn check_object_type(&self, obj: &BinaryObject, req: &Request) -> Result<()> {
        let (Request::Exact(wanted), Some(objects)) = (req, self.objects) else {
            return Ok(());
        };
        match objects.object_type_id(*wanted) {
            Some(expected) if expected != obj.type_id() => {
                Err(GridwireError::TypeMismatch(format!(
                    "structured object has type id {}, expected {expected}",
                    obj.type_id()
                )))
            }
            _ => Ok(()),
        }
    }

    fn nested(&mut self, req: &Request) -> Result<Value> {
        if self.depth >= self.max_depth {
            return Err(GridwireError::Protocol(format!(
                "value nesting exceeds {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        let value = self.read_value(req);
        self.depth -= 1;
        value
    }

    /// Reads an element count and checks that the input can possibly hold it.
    fn count(&mut self, min_element_size: usize) -> Result<usize> {
        let len = self.input.read_len(self.max_len)?;
        let needed = len.saturating_mul(min_element_size);
        if self.input.remaining() < needed {
            return Err(GridwireError::Truncated {
                needed,
                available: self.input.remaining(),
            });
        }
        Ok(len)
    }
}

type ReadFn = fn(&mut ValueReader<'_, '_>, &Request) -> Result<Value>;
type PlainReadFn = fn(&mut ValueReader<'_, '_>) -> Result<Value>;

/// One entry of the read dispatch table.
#[derive(Clone, Copy)]
pub(crate) enum ReadSlot {
    Single(ReadFn),
    Dual(DualSlot),
}

impl ReadSlot {
    fn read(&self, reader: &mut ValueReader<'_, '_>, req: &Request) -> Result<Value> {
        match self {
            ReadSlot::Single(read) => read(reader, req),
            ReadSlot::Dual(dual) => (dual.select(req)?)(reader),
        }
    }
}

/// Two decoders over identical bytes.
#[derive(Clone, Copy)]
pub(crate) struct DualSlot {
    tag: u8,
    signed: PlainReadFn,
    unsigned: PlainReadFn,
    signed_type: TypeId,
    unsigned_type: TypeId,
    /// Element types, for array slots requested through a generic container.
    elements: Option<(TypeId, TypeId)>,
}

impl DualSlot {
    fn select(&self, req: &Request) -> Result<PlainReadFn> {
        let unsigned = match req {
            Request::Any => false,
            Request::Exact(t) if *t == self.signed_type => false,
            Request::Exact(t) if *t == self.unsigned_type => true,
            Request::Elements(inner) => match (inner.as_ref(), self.elements) {
                (Request::Any, Some(_)) => false,
                (Request::Exact(t), Some((signed, _))) if *t == signed => false,
                (Request::Exact(t), Some((_, unsigned))) if *t == unsigned => true,
                _ => return Err(self.mismatch()),
            },
            _ => return Err(self.mismatch()),
        };
        Ok(if unsigned { self.unsigned } else { self.signed })
    }

    fn mismatch(&self) -> GridwireError {
        GridwireError::TypeMismatch(format!(
            "{} can only be read as its signed or unsigned form",
            tag_name(self.tag)
        ))
    }
}

fn scalar<T: Primitive + Into<Value>>(r: &mut ValueReader<'_, '_>) -> Result<Value> {
    Ok(r.input.read_primitive::<T>()?.into())
}

fn array<T: Primitive>(r: &mut ValueReader<'_, '_>) -> Result<Vec<T>> {
    let len = r.count(T::SIZE)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(r.input.read_primitive::<T>()?);
    }
    Ok(items)
}

fn dual_scalar<S, U>(tag: u8) -> ReadSlot
where
    S: Primitive + Into<Value>,
    U: Primitive + Into<Value>,
{
    ReadSlot::Dual(DualSlot {
        tag,
        signed: scalar::<S>,
        unsigned: scalar::<U>,
        signed_type: TypeId::of::<S>(),
        unsigned_type: TypeId::of::<U>(),
        elements: None,
    })
}

macro_rules! array_reader {
    ($name:ident, $ty:ty, $variant:ident) => {
        fn $name(r: &mut ValueReader<'_, '_>) -> Result<Value> {
            Ok(Value::$variant(array::<$ty>(r)?))
        }
    };
}

array_reader!(read_byte_arr, i8, ByteArray);
array_reader!(read_ubyte_arr, u8, UByteArray);
array_reader!(read_short_arr, i16, ShortArray);
array_reader!(read_ushort_arr, u16, UShortArray);
array_reader!(read_int_arr, i32, IntArray);
array_reader!(read_uint_arr, u32, UIntArray);
array_reader!(read_long_arr, i64, LongArray);
array_reader!(read_ulong_arr, u64, ULongArray);

fn dual_array<S: 'static, U: 'static>(
    tag: u8,
    signed: PlainReadFn,
    unsigned: PlainReadFn,
) -> ReadSlot {
    ReadSlot::Dual(DualSlot {
        tag,
        signed,
        unsigned,
        signed_type: TypeId::of::<Vec<S>>(),
        unsigned_type: TypeId::of::<Vec<U>>(),
        elements: Some((TypeId::of::<S>(), TypeId::of::<U>())),
    })
}

pub(crate) fn read_uuid(input: &mut ObjectDataInput<'_>) -> Result<Uuid> {
    let msb = input.read_long()? as u64;
    let lsb = input.read_long()? as u64;
    Ok(Uuid::from_u128((u128::from(msb) << 64) | u128::from(lsb)))
}

pub(crate) fn read_decimal(input: &mut ObjectDataInput<'_>) -> Result<Decimal> {
    let scale = input.read_int()?;
    let len = input.read_len(usize::MAX)?;
    let bytes = input.read_slice(len)?;
    let Some((&first, rest)) = bytes.split_first() else {
        return Err(GridwireError::Serialization(
            "decimal magnitude is empty".to_string(),
        ));
    };

    let negative = first & 0x80 != 0;
    let mut magnitude: u128 = 0;
    for (i, b) in std::iter::once(first & 0x7F).chain(rest.iter().copied()).enumerate() {
        if magnitude >> 120 != 0 {
            return Err(GridwireError::Serialization(format!(
                "decimal magnitude of {len} bytes overflows at byte {i}"
            )));
        }
        magnitude = (magnitude << 8) | u128::from(b);
    }

    let scale = u32::try_from(scale).map_err(|_| {
        GridwireError::Serialization(format!("negative decimal scale {scale} is not supported"))
    })?;
    let mantissa = i128::try_from(magnitude)
        .map_err(|_| GridwireError::Serialization("decimal magnitude overflows".to_string()))?;
    let mantissa = if negative { -mantissa } else { mantissa };
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| GridwireError::Serialization(format!("decimal out of range: {e}")))
}

pub(crate) fn read_timestamp(input: &mut ObjectDataInput<'_>) -> Result<DateTime<Utc>> {
    let secs = input.read_long()?;
    let nanos = input.read_int()?;
    u32::try_from(nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)
        .and_then(|n| DateTime::<Utc>::from_timestamp(secs, n))
        .ok_or_else(|| {
            GridwireError::Serialization(format!("timestamp out of range: {secs}s {nanos}ns"))
        })
}

pub(crate) fn read_enum_body(input: &mut ObjectDataInput<'_>) -> Result<EnumValue> {
    let type_id = input.read_int()?;
    if type_id == 0 {
        let name = input.read_string()?;
        let ordinal = input.read_int()?;
        Ok(EnumValue::with_class_name(name, ordinal))
    } else {
        Ok(EnumValue::new(type_id, input.read_int()?))
    }
}

/// Reads an array whose elements carry their own tag.
fn tagged_array<T>(
    r: &mut ValueReader<'_, '_>,
    tag: u8,
    read: fn(&mut ObjectDataInput<'_>) -> Result<T>,
) -> Result<Vec<Option<T>>> {
    let len = r.count(1)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        match r.input.read_u8()? {
            tags::NULL => items.push(None),
            t if t == tag => items.push(Some(read(r.input)?)),
            other => {
                return Err(GridwireError::Serialization(format!(
                    "unexpected tag {} in {} array",
                    tag_name(other),
                    tag_name(tag)
                )))
            }
        }
    }
    Ok(items)
}

fn read_string(input: &mut ObjectDataInput<'_>) -> Result<String> {
    input.read_string()
}

fn read_obj_array(r: &mut ValueReader<'_, '_>, req: &Request) -> Result<Value> {
    let len = r.count(1)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(r.nested(req.element())?);
    }
    Ok(Value::ObjectArray(items))
}

fn read_collection(r: &mut ValueReader<'_, '_>, req: &Request) -> Result<Value> {
    let len = r.count(1)?;
    let flavor = CollectionFlavor::from_i8(r.input.read_byte()?)?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(r.nested(req.element())?);
    }
    Ok(Value::Collection(flavor, items))
}

fn read_map(r: &mut ValueReader<'_, '_>, req: &Request) -> Result<Value> {
    let len = r.count(2)?;
    let flavor = MapFlavor::from_i8(r.input.read_byte()?)?;
    let (key_req, value_req) = req.entries();
    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        let k = r.nested(key_req)?;
        let v = r.nested(value_req)?;
        entries.push((k, v));
    }
    Ok(Value::Map(flavor, entries))
}

fn read_map_entry(r: &mut ValueReader<'_, '_>, req: &Request) -> Result<Value> {
    let (key_req, value_req) = req.entries();
    let k = r.nested(key_req)?;
    let v = r.nested(value_req)?;
    Ok(Value::MapEntry(Box::new((k, v))))
}

static READ_TABLE: LazyLock<[Option<ReadSlot>; 256]> = LazyLock::new(|| {
    let mut table: [Option<ReadSlot>; 256] = [None; 256];

    table[tags::BYTE as usize] = Some(dual_scalar::<i8, u8>(tags::BYTE));
    table[tags::SHORT as usize] = Some(dual_scalar::<i16, u16>(tags::SHORT));
    table[tags::INT as usize] = Some(dual_scalar::<i32, u32>(tags::INT));
    table[tags::LONG as usize] = Some(dual_scalar::<i64, u64>(tags::LONG));
    table[tags::FLOAT as usize] = Some(ReadSlot::Single(|r, _| scalar::<f32>(r)));
    table[tags::DOUBLE as usize] = Some(ReadSlot::Single(|r, _| scalar::<f64>(r)));
    table[tags::CHAR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::Char(r.input.read_char()?))
    }));
    table[tags::BOOLEAN as usize] = Some(ReadSlot::Single(|r, _| scalar::<bool>(r)));
    table[tags::STRING as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::String(r.input.read_string()?))
    }));
    table[tags::UUID as usize] = Some(ReadSlot::Single(|r, _| Ok(Value::Uuid(read_uuid(r.input)?))));
    table[tags::DECIMAL as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::Decimal(read_decimal(r.input)?))
    }));
    table[tags::TIMESTAMP as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::Timestamp(read_timestamp(r.input)?))
    }));

    table[tags::BYTE_ARR as usize] =
        Some(dual_array::<i8, u8>(tags::BYTE_ARR, read_byte_arr, read_ubyte_arr));
    table[tags::SHORT_ARR as usize] =
        Some(dual_array::<i16, u16>(tags::SHORT_ARR, read_short_arr, read_ushort_arr));
    table[tags::INT_ARR as usize] =
        Some(dual_array::<i32, u32>(tags::INT_ARR, read_int_arr, read_uint_arr));
    table[tags::LONG_ARR as usize] =
        Some(dual_array::<i64, u64>(tags::LONG_ARR, read_long_arr, read_ulong_arr));
    table[tags::FLOAT_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::FloatArray(array(r)?))
    }));
    table[tags::DOUBLE_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::DoubleArray(array(r)?))
    }));
    table[tags::CHAR_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::CharArray(array(r)?))
    }));
    table[tags::BOOLEAN_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::BoolArray(array(r)?))
    }));
    table[tags::STRING_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::StringArray(tagged_array(r, tags::STRING, read_string)?))
    }));
    table[tags::UUID_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::UuidArray(tagged_array(r, tags::UUID, read_uuid)?))
    }));
    table[tags::DECIMAL_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::DecimalArray(tagged_array(r, tags::DECIMAL, read_decimal)?))
    }));
    table[tags::TIMESTAMP_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::TimestampArray(tagged_array(r, tags::TIMESTAMP, read_timestamp)?))
    }));
    table[tags::ENUM_ARR as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::EnumArray(tagged_array(r, tags::ENUM, read_enum_body)?))
    }));

    table[tags::OBJ_ARR as usize] = Some(ReadSlot::Single(read_obj_array));
    table[tags::COL as usize] = Some(ReadSlot::Single(read_collection));
    table[tags::MAP as usize] = Some(ReadSlot::Single(read_map));
    table[tags::MAP_ENTRY as usize] = Some(ReadSlot::Single(read_map_entry));
    table[tags::ENUM as usize] = Some(ReadSlot::Single(|r, _| {
        Ok(Value::Enum(read_enum_body(r.input)?))
    }));

    table
});

/// Returns `true` if `tag` has a system reader.
///
/// Structured objects ([`tags::OBJ`]) deliberately have none; they fall
/// through to the generic structured-object decode path.
pub fn has_system_reader(tag: u8) -> bool {
    READ_TABLE[tag as usize].is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::traits::FromValue;

    fn read(bytes: &[u8], req: &Request) -> Result<Value> {
        let config = CodecConfig::default();
        let mut input = ObjectDataInput::new(bytes);
        let mut reader = ValueReader::new(&mut input, &config);
        reader.read_value(req)
    }

    #[test]
    fn test_byte_dual_slot() {
        let bytes = [tags::BYTE, 0xFF];
        assert_eq!(read(&bytes, &Request::Any).unwrap(), Value::Byte(-1));
        assert_eq!(read(&bytes, &i8::request()).unwrap(), Value::Byte(-1));
        assert_eq!(read(&bytes, &u8::request()).unwrap(), Value::UByte(255));
    }

    #[test]
    fn test_dual_slot_rejects_unrelated_request() {
        let bytes = [tags::INT, 1, 0, 0, 0];
        let err = read(&bytes, &i64::request()).unwrap_err();
        assert!(matches!(err, GridwireError::TypeMismatch(_)));
    }

    #[test]
    fn test_dual_array_by_exact_type() {
        let bytes = [tags::BYTE_ARR, 2, 0, 0, 0, 0x80, 0x01];
        assert_eq!(
            read(&bytes, &<Vec<u8>>::request()).unwrap(),
            Value::UByteArray(vec![0x80, 0x01])
        );
        assert_eq!(
            read(&bytes, &<Vec<i8>>::request()).unwrap(),
            Value::ByteArray(vec![-128, 1])
        );
    }

    #[test]
    fn test_dual_array_by_element_type() {
        let bytes = [tags::SHORT_ARR, 1, 0, 0, 0, 0xFF, 0xFF];
        let req = Request::Elements(Box::new(u16::request()));
        assert_eq!(read(&bytes, &req).unwrap(), Value::UShortArray(vec![u16::MAX]));
        let req = Request::Elements(Box::new(String::request()));
        assert!(read(&bytes, &req).is_err());
    }

    #[test]
    fn test_unknown_tag() {
        let err = read(&[200], &Request::Any).unwrap_err();
        assert!(matches!(err, GridwireError::UnknownTag(200)));
    }

    #[test]
    fn test_obj_has_no_system_reader() {
        assert!(!has_system_reader(tags::OBJ));
        assert!(has_system_reader(tags::INT_ARR));
        assert!(has_system_reader(tags::COL));
        assert!(!has_system_reader(0));
    }

    #[test]
    fn test_huge_count_is_truncated_not_allocated() {
        let bytes = [tags::LONG_ARR, 0xFF, 0xFF, 0xFF, 0x00];
        let err = read(&bytes, &Request::Any).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_count_over_limit() {
        let config = CodecConfig::builder().max_array_length(2).build().unwrap();
        let bytes = [tags::INT_ARR, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut input = ObjectDataInput::new(&bytes);
        let mut reader = ValueReader::new(&mut input, &config);
        assert!(matches!(
            reader.read_value(&Request::Any),
            Err(GridwireError::Serialization(_))
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let config = CodecConfig::builder().max_nesting_depth(2).build().unwrap();
        // three nested single-element object arrays
        let bytes = [
            tags::OBJ_ARR, 1, 0, 0, 0,
            tags::OBJ_ARR, 1, 0, 0, 0,
            tags::OBJ_ARR, 1, 0, 0, 0,
            tags::NULL,
        ];
        let mut input = ObjectDataInput::new(&bytes);
        let mut reader = ValueReader::new(&mut input, &config);
        assert!(matches!(
            reader.read_value(&Request::Any),
            Err(GridwireError::Protocol(_))
        ));
    }

    #[test]
    fn test_decimal_negative_scale_rejected() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 1];
        let mut input = ObjectDataInput::new(&bytes);
        assert!(read_decimal(&mut input).is_err());
    }

    #[test]
    fn test_timestamp_bad_nanos() {
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(&2_000_000_000i32.to_le_bytes());
        let mut input = ObjectDataInput::new(&bytes);
        assert!(read_timestamp(&mut input).is_err());
    }

    #[test]
    fn test_mixed_tag_in_string_array() {
        let bytes = [tags::STRING_ARR, 1, 0, 0, 0, tags::INT, 0, 0, 0, 0];
        assert!(matches!(
            read(&bytes, &Request::Any),
            Err(GridwireError::Serialization(_))
        ));
    }
}
