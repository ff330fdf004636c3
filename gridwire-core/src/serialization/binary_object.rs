//! Opaque structured objects.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use super::data_output::byte_length;
use super::serde::{from_blob, to_blob};
use super::type_registry::{resolve_type_name, type_id_of, TypeResolver};
use super::wire_tag::tags;
use super::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
use crate::error::Result;

const FLAG_HAS_SCHEMA: u8 = 0x01;

/// Header of an encoded structured object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryObjectHeader {
    /// Always [`tags::OBJ`].
    pub tag: u8,
    /// Type id of the object's host type.
    pub type_id: i32,
    /// Payload length in bytes.
    pub length: i32,
    /// Schema identifier, when the producer supplied one.
    pub schema_id: Option<i32>,
}

/// A structured object kept in encoded form.
///
/// Decoding produces a `BinaryObject` without looking at the payload;
/// [`deserialize`](Self::deserialize) turns it into a live value on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryObject {
    type_id: i32,
    type_name: Option<String>,
    schema_id: Option<i32>,
    payload: Bytes,
}

impl BinaryObject {
    /// Creates an object carried by numeric type id.
    pub fn new(type_id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            type_name: None,
            schema_id: None,
            payload: payload.into(),
        }
    }

    /// Creates an object carried by type name.
    pub fn named(type_name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let type_name = type_name.into();
        Self {
            type_id: type_id_of(&type_name),
            type_name: Some(type_name),
            schema_id: None,
            payload: payload.into(),
        }
    }

    /// Wraps a serde value as a `bincode` payload.
    ///
    /// The numeric id is used when `resolver` knows `type_name`, the name otherwise.
    pub fn from_serde<T: Serialize>(
        type_name: &str,
        value: &T,
        resolver: &dyn TypeResolver,
    ) -> Result<Self> {
        let payload = to_blob(value)?;
        Ok(match resolver.resolve_name(type_name) {
            Some(type_id) => Self::new(type_id, payload),
            None => Self::named(type_name, payload),
        })
    }

    /// Attaches a schema identifier.
    pub fn with_schema(mut self, schema_id: i32) -> Self {
        self.schema_id = Some(schema_id);
        self
    }

    /// Returns the type id.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Returns the type name if the object was carried by name.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Returns the schema identifier.
    pub fn schema_id(&self) -> Option<i32> {
        self.schema_id
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the encoded header.
    pub fn header(&self) -> BinaryObjectHeader {
        BinaryObjectHeader {
            tag: tags::OBJ,
            type_id: self.type_id,
            length: self.payload.len() as i32,
            schema_id: self.schema_id,
        }
    }

    /// Materializes the payload as `T`.
    ///
    /// # Errors
    ///
    /// - `Unresolved` if the type id is unknown to `resolver`
    /// - `Serialization` if the payload is not a valid `T`
    pub fn deserialize<T: DeserializeOwned>(&self, resolver: &dyn TypeResolver) -> Result<T> {
        resolve_type_name(resolver, self.type_id, self.type_name.as_deref())?;
        from_blob(&self.payload)
    }

    /// Writes everything after the tag.
    pub(crate) fn write_body(&self, out: &mut ObjectDataOutput) -> Result<()> {
        let flags = if self.schema_id.is_some() {
            FLAG_HAS_SCHEMA
        } else {
            0
        };
        out.write_u8(flags)?;
        match &self.type_name {
            Some(name) => {
                out.write_int(0)?;
                out.write_string(name)?;
            }
            None => out.write_int(self.type_id)?,
        }
        if let Some(schema_id) = self.schema_id {
            out.write_int(schema_id)?;
        }
        out.write_int(byte_length(self.payload.len())?)?;
        out.write_bytes(&self.payload)
    }

    /// Reads everything after the tag.
    pub(crate) fn read_body(input: &mut ObjectDataInput<'_>, max_len: usize) -> Result<Self> {
        let flags = input.read_u8()?;
        let wire_id = input.read_int()?;
        let (type_id, type_name) = if wire_id == 0 {
            let name = input.read_string()?;
            (type_id_of(&name), Some(name))
        } else {
            (wire_id, None)
        };
        let schema_id = if flags & FLAG_HAS_SCHEMA != 0 {
            Some(input.read_int()?)
        } else {
            None
        };
        let len = input.read_len(max_len)?;
        let payload = Bytes::copy_from_slice(input.read_slice(len)?);
        Ok(Self {
            type_id,
            type_name,
            schema_id,
            payload,
        })
    }
}
