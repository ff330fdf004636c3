//! Typed decoding: what a caller asks for and how a [`Value`] becomes that type.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::binary_object::BinaryObject;
use super::enum_value::EnumValue;
use super::value::Value;
use crate::error::{GridwireError, Result};

/// Describes the Rust type a caller wants from a decode.
///
/// Dual read slots compare `Exact` type ids against the two types they serve;
/// container slots pass `Elements` and `Entries` down to their elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Whatever the wire carries, in its default (signed) form.
    Any,
    /// A specific Rust type.
    Exact(TypeId),
    /// A container whose elements are requested as the inner request.
    Elements(Box<Request>),
    /// A map or map entry with key and value requests.
    Entries(Box<Request>, Box<Request>),
}

static ANY: Request = Request::Any;

impl Request {
    /// Requests exactly `T`.
    pub fn exact<T: 'static>() -> Self {
        Request::Exact(TypeId::of::<T>())
    }

    /// Returns the element request of a container request.
    pub(crate) fn element(&self) -> &Request {
        match self {
            Request::Elements(inner) => inner,
            _ => &ANY,
        }
    }

    /// Returns the key and value requests of a map request.
    pub(crate) fn entries(&self) -> (&Request, &Request) {
        match self {
            Request::Entries(k, v) => (k, v),
            _ => (&ANY, &ANY),
        }
    }
}

/// Types that can be produced from a decoded [`Value`].
pub trait FromValue: Sized + 'static {
    /// Returns the request describing `Self`.
    fn request() -> Request;

    /// Converts a decoded value.
    fn from_value(value: Value) -> Result<Self>;

    /// Returns the request for `Vec<Self>`.
    #[doc(hidden)]
    fn vec_request() -> Request {
        Request::Elements(Box::new(Self::request()))
    }

    /// Converts a decoded value into `Vec<Self>`.
    #[doc(hidden)]
    fn vec_from_value(value: Value) -> Result<Vec<Self>> {
        elements(value)?.into_iter().map(Self::from_value).collect()
    }
}

pub(crate) fn mismatch(expected: &str, found: &Value) -> GridwireError {
    GridwireError::TypeMismatch(format!("expected {expected}, found {}", found.kind()))
}

fn elements(value: Value) -> Result<Vec<Value>> {
    value
        .into_elements()
        .map_err(|other| mismatch("a sequence", &other))
}

fn entries(value: Value) -> Result<Vec<(Value, Value)>> {
    match value {
        Value::Map(_, entries) => Ok(entries),
        other => Err(mismatch("a map", &other)),
    }
}

macro_rules! impl_from_value_primitive {
    ($($ty:ty => $variant:ident, $array:ident);* $(;)?) => {
        $(
            impl FromValue for $ty {
                fn request() -> Request {
                    Request::exact::<$ty>()
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch(stringify!($ty), &other)),
                    }
                }

                fn vec_from_value(value: Value) -> Result<Vec<Self>> {
                    match value {
                        Value::$array(v) => Ok(v),
                        other => elements(other)?.into_iter().map(Self::from_value).collect(),
                    }
                }
            }
        )*
    };
}

impl_from_value_primitive! {
    i8 => Byte, ByteArray;
    u8 => UByte, UByteArray;
    i16 => Short, ShortArray;
    u16 => UShort, UShortArray;
    i32 => Int, IntArray;
    u32 => UInt, UIntArray;
    i64 => Long, LongArray;
    u64 => ULong, ULongArray;
    f32 => Float, FloatArray;
    f64 => Double, DoubleArray;
    bool => Bool, BoolArray;
}

macro_rules! impl_from_value_object {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn request() -> Request {
                    Request::exact::<$ty>()
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch(stringify!($ty), &other)),
                    }
                }
            }
        )*
    };
}

impl_from_value_object! {
    String => String,
    Uuid => Uuid,
    Decimal => Decimal,
    DateTime<Utc> => Timestamp,
    EnumValue => Enum,
    BinaryObject => Object,
}

impl FromValue for char {
    fn request() -> Request {
        Request::exact::<char>()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Char(unit) => char::from_u32(u32::from(unit)).ok_or_else(|| {
                GridwireError::TypeMismatch(format!(
                    "UTF-16 unit 0x{unit:04X} is not a character on its own"
                ))
            }),
            other => Err(mismatch("char", &other)),
        }
    }
}

impl FromValue for Value {
    fn request() -> Request {
        Request::Any
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn request() -> Request {
        Request::Any
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch("null", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn request() -> Request {
        T::request()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn request() -> Request {
        T::vec_request()
    }

    fn from_value(value: Value) -> Result<Self> {
        T::vec_from_value(value)
    }
}

impl<T: FromValue> FromValue for VecDeque<T> {
    fn request() -> Request {
        Request::Elements(Box::new(T::request()))
    }

    fn from_value(value: Value) -> Result<Self> {
        elements(value)?.into_iter().map(T::from_value).collect()
    }
}

impl<T: FromValue + Eq + Hash> FromValue for HashSet<T> {
    fn request() -> Request {
        Request::Elements(Box::new(T::request()))
    }

    fn from_value(value: Value) -> Result<Self> {
        elements(value)?.into_iter().map(T::from_value).collect()
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn request() -> Request {
        Request::Elements(Box::new(T::request()))
    }

    fn from_value(value: Value) -> Result<Self> {
        elements(value)?.into_iter().map(T::from_value).collect()
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn request() -> Request {
        Request::Entries(Box::new(K::request()), Box::new(V::request()))
    }

    fn from_value(value: Value) -> Result<Self> {
        entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn request() -> Request {
        Request::Entries(Box::new(K::request()), Box::new(V::request()))
    }

    fn from_value(value: Value) -> Result<Self> {
        entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

impl<K: FromValue, V: FromValue> FromValue for (K, V) {
    fn request() -> Request {
        Request::Entries(Box::new(K::request()), Box::new(V::request()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::MapEntry(entry) => {
                let (k, v) = *entry;
                Ok((K::from_value(k)?, V::from_value(v)?))
            }
            other => Err(mismatch("a map entry", &other)),
        }
    }
}
