//! Type-dispatch binary object codec.
//!
//! Every value on the wire starts with a one-byte tag (see [`tags`]). Writes
//! are dispatched by the host type through [`BinaryMarshaller`]; reads through
//! a fixed 256-slot table keyed by tag, producing a [`Value`] that
//! [`FromValue`] coerces into the type the caller asked for.

mod binary_object;
mod data_input;
mod data_output;
mod enum_value;
mod marshaller;
pub mod mutf8;
mod primitive;
mod readers;
mod registry;
mod serde;
mod traits;
mod type_registry;
mod value;
mod wire_tag;
mod writers;

pub use binary_object::{BinaryObject, BinaryObjectHeader};
pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput};
pub use enum_value::{BinaryEnum, EnumValue};
pub use marshaller::BinaryMarshaller;
pub use primitive::Primitive;
pub use readers::has_system_reader;
pub use registry::TypeBinding;
pub use self::serde::Serde;
pub use traits::{FromValue, Request};
pub use type_registry::{type_id_of, TypeKind, TypeMeta, TypeRegistry, TypeResolver};
pub use value::Value;
pub use wire_tag::{tag_name, tags, CollectionFlavor, MapFlavor};
