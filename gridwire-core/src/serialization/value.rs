//! Dynamic values produced by decoding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::binary_object::BinaryObject;
use super::enum_value::EnumValue;
use super::wire_tag::{tags, CollectionFlavor, MapFlavor};

/// A decoded wire value.
///
/// Signed and unsigned variants of the same width share one wire tag; the
/// unsigned variants are produced only when a caller explicitly asks for the
/// unsigned Rust type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// 8-bit signed integer.
    Byte(i8),
    /// 8-bit unsigned integer.
    UByte(u8),
    /// 16-bit signed integer.
    Short(i16),
    /// 16-bit unsigned integer.
    UShort(u16),
    /// 32-bit signed integer.
    Int(i32),
    /// 32-bit unsigned integer.
    UInt(u32),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit unsigned integer.
    ULong(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// One UTF-16 code unit.
    Char(u16),
    /// Boolean.
    Bool(bool),
    /// Text.
    String(String),
    /// UUID.
    Uuid(Uuid),
    /// Decimal.
    Decimal(Decimal),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Signed byte array.
    ByteArray(Vec<i8>),
    /// Unsigned byte array.
    UByteArray(Vec<u8>),
    /// Signed short array.
    ShortArray(Vec<i16>),
    /// Unsigned short array.
    UShortArray(Vec<u16>),
    /// Signed int array.
    IntArray(Vec<i32>),
    /// Unsigned int array.
    UIntArray(Vec<u32>),
    /// Signed long array.
    LongArray(Vec<i64>),
    /// Unsigned long array.
    ULongArray(Vec<u64>),
    /// Float array.
    FloatArray(Vec<f32>),
    /// Double array.
    DoubleArray(Vec<f64>),
    /// UTF-16 code unit array.
    CharArray(Vec<u16>),
    /// Boolean array.
    BoolArray(Vec<bool>),
    /// String array with absent elements.
    StringArray(Vec<Option<String>>),
    /// UUID array with absent elements.
    UuidArray(Vec<Option<Uuid>>),
    /// Decimal array with absent elements.
    DecimalArray(Vec<Option<Decimal>>),
    /// Timestamp array with absent elements.
    TimestampArray(Vec<Option<DateTime<Utc>>>),
    /// Array of arbitrary values.
    ObjectArray(Vec<Value>),
    /// Collection of a given flavor.
    Collection(CollectionFlavor, Vec<Value>),
    /// Map of a given flavor, in wire order.
    Map(MapFlavor, Vec<(Value, Value)>),
    /// Single key/value pair.
    MapEntry(Box<(Value, Value)>),
    /// Enum constant.
    Enum(EnumValue),
    /// Enum array with absent elements.
    EnumArray(Vec<Option<EnumValue>>),
    /// Structured object.
    Object(BinaryObject),
}

impl Value {
    /// Returns the wire tag this value encodes with.
    pub fn wire_tag(&self) -> u8 {
        match self {
            Value::Null => tags::NULL,
            Value::Byte(_) | Value::UByte(_) => tags::BYTE,
            Value::Short(_) | Value::UShort(_) => tags::SHORT,
            Value::Int(_) | Value::UInt(_) => tags::INT,
            Value::Long(_) | Value::ULong(_) => tags::LONG,
            Value::Float(_) => tags::FLOAT,
            Value::Double(_) => tags::DOUBLE,
            Value::Char(_) => tags::CHAR,
            Value::Bool(_) => tags::BOOLEAN,
            Value::String(_) => tags::STRING,
            Value::Uuid(_) => tags::UUID,
            Value::Decimal(_) => tags::DECIMAL,
            Value::Timestamp(_) => tags::TIMESTAMP,
            Value::ByteArray(_) | Value::UByteArray(_) => tags::BYTE_ARR,
            Value::ShortArray(_) | Value::UShortArray(_) => tags::SHORT_ARR,
            Value::IntArray(_) | Value::UIntArray(_) => tags::INT_ARR,
            Value::LongArray(_) | Value::ULongArray(_) => tags::LONG_ARR,
            Value::FloatArray(_) => tags::FLOAT_ARR,
            Value::DoubleArray(_) => tags::DOUBLE_ARR,
            Value::CharArray(_) => tags::CHAR_ARR,
            Value::BoolArray(_) => tags::BOOLEAN_ARR,
            Value::StringArray(_) => tags::STRING_ARR,
            Value::UuidArray(_) => tags::UUID_ARR,
            Value::DecimalArray(_) => tags::DECIMAL_ARR,
            Value::TimestampArray(_) => tags::TIMESTAMP_ARR,
            Value::ObjectArray(_) => tags::OBJ_ARR,
            Value::Collection(..) => tags::COL,
            Value::Map(..) => tags::MAP,
            Value::MapEntry(_) => tags::MAP_ENTRY,
            Value::Enum(_) => tags::ENUM,
            Value::EnumArray(_) => tags::ENUM_ARR,
            Value::Object(_) => tags::OBJ,
        }
    }

    /// Returns a short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Byte(_) => "i8",
            Value::UByte(_) => "u8",
            Value::Short(_) => "i16",
            Value::UShort(_) => "u16",
            Value::Int(_) => "i32",
            Value::UInt(_) => "u32",
            Value::Long(_) => "i64",
            Value::ULong(_) => "u64",
            Value::Float(_) => "f32",
            Value::Double(_) => "f64",
            Value::Char(_) => "char",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Decimal(_) => "decimal",
            Value::Timestamp(_) => "timestamp",
            Value::ByteArray(_) => "i8 array",
            Value::UByteArray(_) => "u8 array",
            Value::ShortArray(_) => "i16 array",
            Value::UShortArray(_) => "u16 array",
            Value::IntArray(_) => "i32 array",
            Value::UIntArray(_) => "u32 array",
            Value::LongArray(_) => "i64 array",
            Value::ULongArray(_) => "u64 array",
            Value::FloatArray(_) => "f32 array",
            Value::DoubleArray(_) => "f64 array",
            Value::CharArray(_) => "char array",
            Value::BoolArray(_) => "bool array",
            Value::StringArray(_) => "string array",
            Value::UuidArray(_) => "uuid array",
            Value::DecimalArray(_) => "decimal array",
            Value::TimestampArray(_) => "timestamp array",
            Value::ObjectArray(_) => "object array",
            Value::Collection(..) => "collection",
            Value::Map(..) => "map",
            Value::MapEntry(_) => "map entry",
            Value::Enum(_) => "enum",
            Value::EnumArray(_) => "enum array",
            Value::Object(_) => "object",
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Splits any array or collection into its elements.
    ///
    /// Returns the value back unchanged if it is not sequence-shaped.
    pub fn into_elements(self) -> std::result::Result<Vec<Value>, Value> {
        fn wrap<T>(items: Vec<T>, f: impl Fn(T) -> Value) -> Vec<Value> {
            items.into_iter().map(f).collect()
        }
        fn wrap_opt<T>(items: Vec<Option<T>>, f: impl Fn(T) -> Value) -> Vec<Value> {
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &f))
                .collect()
        }

        Ok(match self {
            Value::ByteArray(v) => wrap(v, Value::Byte),
            Value::UByteArray(v) => wrap(v, Value::UByte),
            Value::ShortArray(v) => wrap(v, Value::Short),
            Value::UShortArray(v) => wrap(v, Value::UShort),
            Value::IntArray(v) => wrap(v, Value::Int),
            Value::UIntArray(v) => wrap(v, Value::UInt),
            Value::LongArray(v) => wrap(v, Value::Long),
            Value::ULongArray(v) => wrap(v, Value::ULong),
            Value::FloatArray(v) => wrap(v, Value::Float),
            Value::DoubleArray(v) => wrap(v, Value::Double),
            Value::CharArray(v) => wrap(v, Value::Char),
            Value::BoolArray(v) => wrap(v, Value::Bool),
            Value::StringArray(v) => wrap_opt(v, Value::String),
            Value::UuidArray(v) => wrap_opt(v, Value::Uuid),
            Value::DecimalArray(v) => wrap_opt(v, Value::Decimal),
            Value::TimestampArray(v) => wrap_opt(v, Value::Timestamp),
            Value::EnumArray(v) => wrap_opt(v, Value::Enum),
            Value::ObjectArray(v) | Value::Collection(_, v) => v,
            other => return Err(other),
        })
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar!(
    i8 => Byte,
    u8 => UByte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    bool => Bool,
    String => String,
    Uuid => Uuid,
    Decimal => Decimal,
    DateTime<Utc> => Timestamp,
    EnumValue => Enum,
    BinaryObject => Object,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
