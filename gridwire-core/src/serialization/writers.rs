//! Payload encoders shared by the write dispatch table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::binary_object::BinaryObject;
use super::enum_value::EnumValue;
use super::primitive::Primitive;
use super::value::Value;
use super::wire_tag::{tags, CollectionFlavor, MapFlavor};
use super::{DataOutput, ObjectDataOutput};
use crate::error::{GridwireError, Result};

pub(crate) fn write_count(out: &mut ObjectDataOutput, len: usize) -> Result<()> {
    let count = i32::try_from(len).map_err(|_| {
        GridwireError::Serialization(format!("length {len} does not fit in a 32-bit count"))
    })?;
    out.write_int(count)
}

pub(crate) fn write_char(out: &mut ObjectDataOutput, c: char) -> Result<()> {
    let mut units = [0u16; 2];
    match c.encode_utf16(&mut units) {
        [unit] => out.write_char(*unit),
        _ => Err(GridwireError::Serialization(format!(
            "character U+{:04X} is outside the basic multilingual plane",
            c as u32
        ))),
    }
}

pub(crate) fn write_uuid(out: &mut ObjectDataOutput, v: &Uuid) -> Result<()> {
    let bits = v.as_u128();
    out.write_long((bits >> 64) as i64)?;
    out.write_long(bits as i64)
}

/// Scale, then the two's-complement-style magnitude with the sign in the
/// high bit of its first byte.
pub(crate) fn write_decimal(out: &mut ObjectDataOutput, v: &Decimal) -> Result<()> {
    let negative = v.is_sign_negative() && !v.is_zero();
    let magnitude = v.mantissa().unsigned_abs();
    let raw = magnitude.to_be_bytes();
    let first = raw.iter().position(|b| *b != 0).unwrap_or(raw.len() - 1);
    let mut bytes = Vec::with_capacity(raw.len() - first + 1);
    if raw[first] & 0x80 != 0 {
        bytes.push(0);
    }
    bytes.extend_from_slice(&raw[first..]);
    if negative {
        bytes[0] |= 0x80;
    }

    out.write_int(v.scale() as i32)?;
    write_count(out, bytes.len())?;
    out.write_bytes(&bytes)
}

pub(crate) fn write_timestamp(out: &mut ObjectDataOutput, v: &DateTime<Utc>) -> Result<()> {
    out.write_long(v.timestamp())?;
    out.write_int(v.timestamp_subsec_nanos() as i32)
}

pub(crate) fn write_enum(out: &mut ObjectDataOutput, v: &EnumValue) -> Result<()> {
    match v.class_name() {
        Some(name) => {
            out.write_int(0)?;
            out.write_string(name)?;
        }
        None => out.write_int(v.type_id())?,
    }
    out.write_int(v.ordinal())
}

pub(crate) fn write_primitive_array<T: Primitive>(out: &mut ObjectDataOutput, items: &[T]) -> Result<()> {
    write_count(out, items.len())?;
    for item in items {
        out.write_primitive(*item);
    }
    Ok(())
}

pub(crate) fn write_char_array(out: &mut ObjectDataOutput, items: &[char]) -> Result<()> {
    write_count(out, items.len())?;
    for c in items {
        write_char(out, *c)?;
    }
    Ok(())
}

/// Writes an array whose elements carry their own tag, `NULL` for `None`.
pub(crate) fn write_tagged_array<T>(
    out: &mut ObjectDataOutput,
    items: impl ExactSizeIterator<Item = Option<T>>,
    tag: u8,
    mut write: impl FnMut(&mut ObjectDataOutput, T) -> Result<()>,
) -> Result<()> {
    write_count(out, items.len())?;
    for item in items {
        match item {
            Some(v) => {
                out.write_u8(tag)?;
                write(out, v)?;
            }
            None => out.write_u8(tags::NULL)?,
        }
    }
    Ok(())
}

pub(crate) fn write_string_array<'a>(
    out: &mut ObjectDataOutput,
    items: impl ExactSizeIterator<Item = Option<&'a str>>,
) -> Result<()> {
    write_tagged_array(out, items, tags::STRING, |out, s| out.write_string(s))
}

pub(crate) fn write_collection<'a>(
    out: &mut ObjectDataOutput,
    flavor: CollectionFlavor,
    items: impl ExactSizeIterator<Item = &'a Value>,
) -> Result<()> {
    write_count(out, items.len())?;
    out.write_byte(flavor.as_i8())?;
    for item in items {
        write_value(out, item)?;
    }
    Ok(())
}

pub(crate) fn write_map<'a>(
    out: &mut ObjectDataOutput,
    flavor: MapFlavor,
    entries: impl ExactSizeIterator<Item = (&'a Value, &'a Value)>,
) -> Result<()> {
    write_count(out, entries.len())?;
    out.write_byte(flavor.as_i8())?;
    for (k, v) in entries {
        write_value(out, k)?;
        write_value(out, v)?;
    }
    Ok(())
}

pub(crate) fn write_object(out: &mut ObjectDataOutput, obj: &BinaryObject) -> Result<()> {
    out.write_u8(tags::OBJ)?;
    obj.write_body(out)
}

/// Writes a dynamic value, tag included.
pub(crate) fn write_value(out: &mut ObjectDataOutput, value: &Value) -> Result<()> {
    out.write_u8(value.wire_tag())?;
    match value {
        Value::Null => Ok(()),
        Value::Byte(v) => out.write_byte(*v),
        Value::UByte(v) => out.write_u8(*v),
        Value::Short(v) => out.write_short(*v),
        Value::UShort(v) => out.write_short(*v as i16),
        Value::Int(v) => out.write_int(*v),
        Value::UInt(v) => out.write_int(*v as i32),
        Value::Long(v) => out.write_long(*v),
        Value::ULong(v) => out.write_long(*v as i64),
        Value::Float(v) => out.write_float(*v),
        Value::Double(v) => out.write_double(*v),
        Value::Char(v) => out.write_char(*v),
        Value::Bool(v) => out.write_bool(*v),
        Value::String(v) => out.write_string(v),
        Value::Uuid(v) => write_uuid(out, v),
        Value::Decimal(v) => write_decimal(out, v),
        Value::Timestamp(v) => write_timestamp(out, v),
        Value::ByteArray(v) => write_primitive_array(out, v),
        Value::UByteArray(v) => write_primitive_array(out, v),
        Value::ShortArray(v) => write_primitive_array(out, v),
        Value::UShortArray(v) => write_primitive_array(out, v),
        Value::IntArray(v) => write_primitive_array(out, v),
        Value::UIntArray(v) => write_primitive_array(out, v),
        Value::LongArray(v) => write_primitive_array(out, v),
        Value::ULongArray(v) => write_primitive_array(out, v),
        Value::FloatArray(v) => write_primitive_array(out, v),
        Value::DoubleArray(v) => write_primitive_array(out, v),
        Value::CharArray(v) => write_primitive_array(out, v),
        Value::BoolArray(v) => write_primitive_array(out, v),
        Value::StringArray(v) => write_string_array(out, v.iter().map(Option::as_deref)),
        Value::UuidArray(v) => {
            write_tagged_array(out, v.iter().map(Option::as_ref), tags::UUID, write_uuid)
        }
        Value::DecimalArray(v) => {
            write_tagged_array(out, v.iter().map(Option::as_ref), tags::DECIMAL, write_decimal)
        }
        Value::TimestampArray(v) => write_tagged_array(
            out,
            v.iter().map(Option::as_ref),
            tags::TIMESTAMP,
            write_timestamp,
        ),
        Value::ObjectArray(v) => {
            write_count(out, v.len())?;
            v.iter().try_for_each(|item| write_value(out, item))
        }
        Value::Collection(flavor, v) => write_collection(out, *flavor, v.iter()),
        Value::Map(flavor, v) => write_map(out, *flavor, v.iter().map(|(k, v)| (k, v))),
        Value::MapEntry(entry) => {
            write_value(out, &entry.0)?;
            write_value(out, &entry.1)
        }
        Value::Enum(v) => write_enum(out, v),
        Value::EnumArray(v) => {
            write_tagged_array(out, v.iter().map(Option::as_ref), tags::ENUM, write_enum)
        }
        Value::Object(v) => v.write_body(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn encoded(value: &Value) -> Vec<u8> {
        let mut out = ObjectDataOutput::new();
        write_value(&mut out, value).unwrap();
        out.into_bytes()
    }

    #[test]
    fn test_int_array_layout() {
        assert_eq!(
            encoded(&Value::IntArray(vec![1, -2, 3])),
            vec![
                tags::INT_ARR,
                3, 0, 0, 0,
                1, 0, 0, 0,
                0xFE, 0xFF, 0xFF, 0xFF,
                3, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_empty_list_layout() {
        assert_eq!(
            encoded(&Value::Collection(CollectionFlavor::ArrayList, vec![])),
            vec![tags::COL, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_signed_and_unsigned_bytes_identical() {
        assert_eq!(
            encoded(&Value::ByteArray(vec![-1, 0, 127])),
            encoded(&Value::UByteArray(vec![255, 0, 127]))
        );
        assert_eq!(encoded(&Value::Long(-1)), encoded(&Value::ULong(u64::MAX)));
    }

    #[test]
    fn test_uuid_layout() {
        let id = Uuid::from_u128(0x0102030405060708_1112131415161718);
        let mut out = ObjectDataOutput::new();
        write_uuid(&mut out, &id).unwrap();
        assert_eq!(
            out.as_bytes(),
            &[
                0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
                0x18, 0x17, 0x16, 0x15, 0x14, 0x13, 0x12, 0x11,
            ]
        );
    }

    #[test]
    fn test_decimal_layout() {
        let mut out = ObjectDataOutput::new();
        write_decimal(&mut out, &Decimal::from_str("-1.28").unwrap()).unwrap();
        // scale 2, magnitude 128 needs a leading zero byte before the sign bit
        assert_eq!(out.as_bytes(), &[2, 0, 0, 0, 2, 0, 0, 0, 0x80, 0x80]);

        let mut out = ObjectDataOutput::new();
        write_decimal(&mut out, &Decimal::ZERO).unwrap();
        assert_eq!(out.as_bytes(), &[0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_timestamp_layout() {
        let ts = DateTime::<Utc>::from_timestamp(1, 5).unwrap();
        let mut out = ObjectDataOutput::new();
        write_timestamp(&mut out, &ts).unwrap();
        assert_eq!(out.as_bytes(), &[1, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0]);
    }

    #[test]
    fn test_char_outside_bmp_rejected() {
        let mut out = ObjectDataOutput::new();
        assert!(write_char(&mut out, '🚀').is_err());
        write_char(&mut out, 'é').unwrap();
        assert_eq!(out.as_bytes(), &[0xE9, 0x00]);
    }

    #[test]
    fn test_string_array_with_null() {
        assert_eq!(
            encoded(&Value::StringArray(vec![Some("a".to_string()), None])),
            vec![tags::STRING_ARR, 2, 0, 0, 0, tags::STRING, 1, 0, 0, 0, b'a', tags::NULL]
        );
    }

    #[test]
    fn test_enum_by_name_and_id() {
        assert_eq!(
            encoded(&Value::Enum(EnumValue::new(5, 1))),
            vec![tags::ENUM, 5, 0, 0, 0, 1, 0, 0, 0]
        );
        assert_eq!(
            encoded(&Value::Enum(EnumValue::with_class_name("E", 2))),
            vec![tags::ENUM, 0, 0, 0, 0, 1, 0, 0, 0, b'E', 2, 0, 0, 0]
        );
    }

    #[test]
    fn test_map_entry_layout() {
        let entry = Value::MapEntry(Box::new((Value::Int(1), Value::Null)));
        assert_eq!(
            encoded(&entry),
            vec![tags::MAP_ENTRY, tags::INT, 1, 0, 0, 0, tags::NULL]
        );
    }
}
