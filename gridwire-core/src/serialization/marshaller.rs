//! The object codec entry point.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use super::binary_object::BinaryObject;
use super::enum_value::{BinaryEnum, EnumValue};
use super::readers::{ObjectTypes, ValueReader};
use super::registry::{downcast, well_known, HostTypes, TypeBinding, WellKnown, WriterCache};
use super::traits::FromValue;
use super::type_registry::{type_id_of, TypeRegistry, TypeResolver};
use super::value::Value;
use super::wire_tag::tags;
use super::writers::{write_enum, write_object, write_tagged_array, write_value};
use super::{DataOutput, ObjectDataInput, ObjectDataOutput};
use crate::config::CodecConfig;
use crate::error::{GridwireError, Result};
use crate::protocol::{ReadCursor, WriteCursor};

/// Encodes host values to the self-describing wire format and back.
///
/// A marshaller is shared by every connection of a node. Lookups of already
/// resolved types read an immutable snapshot and never lock.
///
/// # Example
///
/// ```rust
/// use gridwire_core::serialization::BinaryMarshaller;
///
/// let marshaller = BinaryMarshaller::default();
/// let bytes = marshaller.marshal(&vec![1i32, -2, 3]).unwrap();
/// let back: Vec<i32> = marshaller.unmarshal(&bytes).unwrap();
/// assert_eq!(back, vec![1, -2, 3]);
/// ```
pub struct BinaryMarshaller {
    config: CodecConfig,
    resolver: Arc<dyn TypeResolver>,
    host_types: HostTypes,
    writers: WriterCache,
}

impl BinaryMarshaller {
    /// Creates a marshaller backed by an external type resolver.
    pub fn new(config: CodecConfig, resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            config,
            resolver,
            host_types: HostTypes::default(),
            writers: WriterCache::new(),
        }
    }

    /// Creates a marshaller with its own empty [`TypeRegistry`].
    pub fn with_config(config: CodecConfig) -> Self {
        Self::new(config, Arc::new(TypeRegistry::new()))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Returns the type metadata resolver.
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// Registers a host enum.
    ///
    /// Both `E` and `Vec<E>` become encodable.
    pub fn register_enum<E: BinaryEnum>(&self) -> Result<()> {
        validate_type_name(E::TYPE_NAME)?;

        self.install::<E>(TypeBinding::from_fn(
            tags::ENUM,
            type_name::<E>(),
            |resolver, out, value| {
                let constant = downcast::<E>(value)?;
                out.write_u8(tags::ENUM)?;
                write_enum(out, &EnumValue::of(constant, resolver))
            },
        ))?;
        self.install::<Vec<E>>(TypeBinding::from_fn(
            tags::ENUM_ARR,
            type_name::<Vec<E>>(),
            |resolver, out, value| {
                let constants = downcast::<Vec<E>>(value)?;
                out.write_u8(tags::ENUM_ARR)?;
                write_tagged_array(
                    out,
                    constants.iter().map(|c| Some(EnumValue::of(c, resolver))),
                    tags::ENUM,
                    |out, v| write_enum(out, &v),
                )
            },
        ))
    }

    /// Registers a serde type to travel as a structured object named `type_name`.
    pub fn register_object<T: Serialize + 'static>(&self, type_name: &str) -> Result<()> {
        validate_type_name(type_name)?;
        let name: Arc<str> = Arc::from(type_name);

        self.install::<T>(
            TypeBinding::from_fn(
                tags::OBJ,
                std::any::type_name::<T>(),
                move |resolver, out, value| {
                    let value = downcast::<T>(value)?;
                    write_object(out, &BinaryObject::from_serde(&name, value, resolver)?)
                },
            )
            .with_object_type(type_id_of(type_name)),
        )
    }

    fn install<T: 'static>(&self, binding: TypeBinding) -> Result<()> {
        let type_id = TypeId::of::<T>();
        self.host_types.insert(type_id, binding)?;
        self.writers.invalidate(type_id);
        Ok(())
    }

    /// Returns the wire tag `T` is encoded with.
    pub fn tag_for<T: Any>(&self) -> Option<u8> {
        self.tag_for_id(TypeId::of::<T>())
    }

    /// Returns the wire tag for a runtime type id.
    ///
    /// Served from the published write bindings; the host registry lock is
    /// only taken the first time a type is seen.
    pub fn tag_for_id(&self, type_id: TypeId) -> Option<u8> {
        self.writer_for_id(type_id).map(|binding| binding.tag())
    }

    /// Returns the encode binding of `T`.
    pub fn writer_for<T: Any>(&self) -> Option<TypeBinding> {
        self.writer_for_id(TypeId::of::<T>())
    }

    /// Returns the encode binding for a runtime type id, building and caching
    /// it on first use.
    pub fn writer_for_id(&self, type_id: TypeId) -> Option<TypeBinding> {
        self.writers.get_or_build(type_id, || {
            well_known(type_id)
                .map(WellKnown::binding)
                .or_else(|| self.host_types.get(type_id))
        })
    }

    /// Encodes `value` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// `UnknownType` if `T` has no fixed shape and was never registered.
    pub fn marshal<T: Any>(&self, value: &T) -> Result<Vec<u8>> {
        let mut out = ObjectDataOutput::with_capacity(self.config.initial_buffer_capacity());
        self.marshal_into(&mut out, value)?;
        Ok(out.into_bytes())
    }

    /// Appends the encoding of `value` to `out`.
    pub fn marshal_into<T: Any>(&self, out: &mut ObjectDataOutput, value: &T) -> Result<()> {
        self.write_guarded(out, value, type_name::<T>())
    }

    /// Appends the encoding of a type-erased value to `out`.
    ///
    /// Nothing is appended when encoding fails.
    pub fn marshal_dyn(&self, out: &mut ObjectDataOutput, value: &dyn Any) -> Result<()> {
        self.write_guarded(out, value, "type-erased value")
    }

    /// Appends the encoding of a dynamic value to `out`.
    pub fn marshal_value(&self, out: &mut ObjectDataOutput, value: &Value) -> Result<()> {
        let start = out.len();
        write_value(out, value).inspect_err(|_| out.truncate(start))
    }

    fn write_guarded(&self, out: &mut ObjectDataOutput, value: &dyn Any, name: &str) -> Result<()> {
        if let Some(value) = value.downcast_ref::<Value>() {
            return self.marshal_value(out, value);
        }

        let binding = self
            .writer_for_id(value.type_id())
            .ok_or_else(|| GridwireError::UnknownType(name.to_string()))?;
        let start = out.len();
        binding
            .encode(self.resolver.as_ref(), out, value)
            .inspect_err(|_| out.truncate(start))
    }

    /// Decodes one value as `T`.
    pub fn unmarshal<T: FromValue>(&self, bytes: &[u8]) -> Result<T> {
        self.read_from(&mut ObjectDataInput::new(bytes))
    }

    /// Decodes one value without a target type.
    pub fn unmarshal_value(&self, bytes: &[u8]) -> Result<Value> {
        self.unmarshal(bytes)
    }

    /// Decodes one value from `input`, leaving it positioned after the value.
    pub fn read_from<T: FromValue>(&self, input: &mut ObjectDataInput<'_>) -> Result<T> {
        let value = ValueReader::new(input, &self.config)
            .with_objects(self)
            .read_value(&T::request())?;
        T::from_value(value)
    }

    /// Encodes `value` at the cursor's position if it fits entirely.
    ///
    /// Returns `Ok(false)`, with the cursor untouched, when the encoding does
    /// not fit in the remaining capacity.
    pub fn encode_value(&self, cursor: &mut WriteCursor<'_>, value: &dyn Any) -> Result<bool> {
        let mut out = ObjectDataOutput::with_capacity(self.config.initial_buffer_capacity());
        self.marshal_dyn(&mut out, value)?;
        Ok(cursor.put_all(out.as_bytes()))
    }

    /// Decodes one value as `T` from the cursor's position.
    ///
    /// Returns `Ok(None)`, with the cursor untouched, when the available bytes
    /// end before the value does.
    pub fn decode_value<T: FromValue>(&self, cursor: &mut ReadCursor<'_>) -> Result<Option<T>> {
        let mut input = ObjectDataInput::new(cursor.remaining_slice());
        match self.read_from::<T>(&mut input) {
            Ok(value) => {
                cursor.advance(input.position());
                Ok(Some(value))
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Materializes a decoded enum as its host constant.
    pub fn materialize_enum<E: BinaryEnum>(&self, value: &EnumValue) -> Result<E> {
        value.deserialize(self.resolver.as_ref())
    }

    /// Materializes a decoded structured object as a serde value.
    pub fn materialize_object<T: DeserializeOwned>(&self, object: &BinaryObject) -> Result<T> {
        object.deserialize(self.resolver.as_ref())
    }
}

fn validate_type_name(type_name: &str) -> Result<()> {
    if type_name.trim().is_empty() {
        return Err(GridwireError::Configuration(
            "host type name must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl Default for BinaryMarshaller {
    fn default() -> Self {
        Self::with_config(CodecConfig::default())
    }
}

impl ObjectTypes for BinaryMarshaller {
    fn object_type_id(&self, type_id: TypeId) -> Option<i32> {
        self.writer_for_id(type_id)
            .and_then(|binding| binding.object_type_id())
    }
}

impl fmt::Debug for BinaryMarshaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryMarshaller")
            .field("config", &self.config)
            .field("host_types", &self.host_types.len())
            .field("cached_writers", &self.writers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

    use serde::Deserialize;

    use super::*;
    use crate::serialization::{CollectionFlavor, MapFlavor, Serde, TypeKind};

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Green,
    }

    impl BinaryEnum for Color {
        const TYPE_NAME: &'static str = "Color";

        fn ordinal(&self) -> i32 {
            match self {
                Color::Red => 0,
                Color::Green => 1,
            }
        }

        fn from_ordinal(ordinal: i32) -> Option<Self> {
            match ordinal {
                0 => Some(Color::Red),
                1 => Some(Color::Green),
                _ => None,
            }
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_int_array_scenario() {
        let m = BinaryMarshaller::default();
        let bytes = m.marshal(&vec![1i32, -2, 3]).unwrap();
        assert_eq!(bytes[0], tags::INT_ARR);
        assert_eq!(&bytes[1..5], &3i32.to_le_bytes());
        assert_eq!(&bytes[5..9], &1i32.to_le_bytes());
        assert_eq!(&bytes[9..13], &(-2i32).to_le_bytes());
        assert_eq!(&bytes[13..17], &3i32.to_le_bytes());
        assert_eq!(bytes.len(), 17);
        assert_eq!(m.unmarshal::<Vec<i32>>(&bytes).unwrap(), vec![1, -2, 3]);
    }

    #[test]
    fn test_empty_list_scenario() {
        let m = BinaryMarshaller::default();
        let list = Value::Collection(CollectionFlavor::ArrayList, vec![]);
        let bytes = m.marshal(&list).unwrap();
        assert_eq!(bytes, vec![tags::COL, 0, 0, 0, 0, CollectionFlavor::ArrayList.as_i8() as u8]);
        assert_eq!(m.unmarshal_value(&bytes).unwrap(), list);
    }

    #[test]
    fn test_dual_byte_arrays() {
        let m = BinaryMarshaller::default();
        let signed = m.marshal(&vec![-1i8, 2]).unwrap();
        let unsigned = m.marshal(&vec![255u8, 2]).unwrap();
        assert_eq!(signed, unsigned);
        assert_eq!(m.unmarshal::<Vec<u8>>(&signed).unwrap(), vec![255, 2]);
        assert_eq!(m.unmarshal::<Vec<i8>>(&unsigned).unwrap(), vec![-1, 2]);
        assert_eq!(
            m.unmarshal_value(&signed).unwrap(),
            Value::ByteArray(vec![-1, 2])
        );
    }

    #[test]
    fn test_dual_read_mismatch() {
        let m = BinaryMarshaller::default();
        let bytes = m.marshal(&vec![1i16]).unwrap();
        assert!(matches!(
            m.unmarshal::<Vec<i32>>(&bytes),
            Err(GridwireError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_type_rejected_without_output() {
        struct Opaque;
        let m = BinaryMarshaller::default();
        let mut out = ObjectDataOutput::new();
        out.write_u8(0xAA).unwrap();
        let err = m.marshal_into(&mut out, &Opaque).unwrap_err();
        assert!(matches!(err, GridwireError::UnknownType(ref name) if name.contains("Opaque")));
        assert_eq!(out.as_bytes(), &[0xAA]);
        assert!(m.tag_for::<Opaque>().is_none());
    }

    #[test]
    fn test_failed_encode_truncates() {
        let m = BinaryMarshaller::default();
        let mut out = ObjectDataOutput::new();
        let err = m.marshal_into(&mut out, &vec!['a', '🚀']);
        assert!(err.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_tag_lookup() {
        let m = BinaryMarshaller::default();
        assert_eq!(m.tag_for::<u64>(), Some(tags::LONG));
        assert_eq!(m.tag_for::<Vec<String>>(), Some(tags::STRING_ARR));
        assert_eq!(m.tag_for::<HashMap<String, Value>>(), Some(tags::MAP));
        assert_eq!(m.tag_for::<Color>(), None);
        m.register_enum::<Color>().unwrap();
        assert_eq!(m.tag_for::<Color>(), Some(tags::ENUM));
        assert_eq!(m.tag_for::<Vec<Color>>(), Some(tags::ENUM_ARR));
    }

    #[test]
    fn test_tag_lookup_publishes_write_binding() {
        let m = BinaryMarshaller::default();
        m.register_enum::<Color>().unwrap();
        assert!(m.writers.get(TypeId::of::<Color>()).is_none());
        assert_eq!(m.tag_for::<Color>(), Some(tags::ENUM));
        let cached = m.writers.get(TypeId::of::<Color>()).unwrap();
        assert_eq!(cached.tag(), tags::ENUM);

        assert_eq!(m.tag_for::<i32>(), Some(tags::INT));
        assert!(m.writers.get(TypeId::of::<i32>()).is_some());

        struct Opaque;
        assert!(m.tag_for::<Opaque>().is_none());
        assert!(m.writers.get(TypeId::of::<Opaque>()).is_none());
    }

    #[test]
    fn test_enum_by_name_when_unregistered_metadata() {
        let m = BinaryMarshaller::default();
        m.register_enum::<Color>().unwrap();
        let bytes = m.marshal(&Color::Green).unwrap();
        let value: EnumValue = m.unmarshal(&bytes).unwrap();
        assert_eq!(value.class_name(), Some("Color"));
        assert_eq!(m.materialize_enum::<Color>(&value).unwrap(), Color::Green);
    }

    #[test]
    fn test_enum_by_id_and_deferred_failure() {
        let registry = Arc::new(TypeRegistry::new());
        registry.register("Color", TypeKind::Enum).unwrap();
        let sender = BinaryMarshaller::new(CodecConfig::default(), registry);
        sender.register_enum::<Color>().unwrap();
        let bytes = sender.marshal(&vec![Color::Red, Color::Green]).unwrap();

        // decoding on a node that cannot resolve the id still succeeds
        let receiver = BinaryMarshaller::default();
        let values: Vec<Option<EnumValue>> = receiver.unmarshal(&bytes).unwrap();
        let first = values[0].as_ref().unwrap();
        assert!(first.class_name().is_none());
        assert!(matches!(
            receiver.materialize_enum::<Color>(first),
            Err(GridwireError::Unresolved(_))
        ));
        assert_eq!(sender.materialize_enum::<Color>(first).unwrap(), Color::Red);
    }

    #[test]
    fn test_serde_object() {
        let m = BinaryMarshaller::default();
        m.register_object::<Point>("Point").unwrap();
        let bytes = m.marshal(&Point { x: 1, y: -1 }).unwrap();
        assert_eq!(bytes[0], tags::OBJ);

        let obj: BinaryObject = m.unmarshal(&bytes).unwrap();
        assert_eq!(obj.type_name(), Some("Point"));
        assert_eq!(m.materialize_object::<Point>(&obj).unwrap(), Point { x: 1, y: -1 });
        assert_eq!(m.unmarshal::<Serde<Point>>(&bytes).unwrap().into_inner(), Point { x: 1, y: -1 });
    }

    #[test]
    fn test_serde_rejects_object_of_another_type() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Span {
            start: i32,
            end: i32,
        }

        let m = BinaryMarshaller::default();
        m.register_object::<Point>("Point").unwrap();
        m.register_object::<Span>("Span").unwrap();
        let bytes = m.marshal(&Span { start: 3, end: 9 }).unwrap();

        let err = m.unmarshal::<Serde<Point>>(&bytes).unwrap_err();
        assert!(matches!(err, GridwireError::TypeMismatch(_)));
        assert_eq!(m.unmarshal::<Serde<Span>>(&bytes).unwrap().into_inner(), Span { start: 3, end: 9 });

        let blob = crate::serialization::serde::to_blob(&Span { start: 1, end: 2 }).unwrap();
        let bytes = m
            .marshal(&vec![Value::Object(BinaryObject::named("Span", blob))])
            .unwrap();
        assert!(matches!(
            m.unmarshal::<Vec<Serde<Point>>>(&bytes),
            Err(GridwireError::TypeMismatch(_))
        ));
        assert_eq!(m.unmarshal::<Vec<Serde<Span>>>(&bytes).unwrap().len(), 1);
    }

    #[test]
    fn test_register_rejects_fixed_shapes_and_empty_names() {
        let m = BinaryMarshaller::default();
        assert!(m.register_object::<String>("Text").is_err());
        assert!(m.register_object::<Point>(" ").is_err());
    }

    #[test]
    fn test_collections_and_maps() {
        let m = BinaryMarshaller::default();

        let deque: VecDeque<Value> = [Value::Int(1), Value::Null].into_iter().collect();
        let bytes = m.marshal(&deque).unwrap();
        assert_eq!(
            m.unmarshal_value(&bytes).unwrap(),
            Value::Collection(CollectionFlavor::LinkedList, vec![Value::Int(1), Value::Null])
        );

        let set: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let bytes = m.marshal(&set).unwrap();
        assert_eq!(m.unmarshal::<HashSet<String>>(&bytes).unwrap(), set);

        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::Long(7));
        let bytes = m.marshal(&map).unwrap();
        match m.unmarshal_value(&bytes).unwrap() {
            Value::Map(flavor, entries) => {
                assert_eq!(flavor, MapFlavor::TreeMap);
                assert_eq!(entries, vec![(Value::from("k"), Value::Long(7))]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            m.unmarshal::<BTreeMap<String, i64>>(&bytes).unwrap().get("k"),
            Some(&7)
        );
    }

    #[test]
    fn test_writer_cached_after_first_lookup() {
        let m = BinaryMarshaller::default();
        assert!(m.writer_for::<Vec<f64>>().is_some());
        assert!(m.writer_for::<Vec<f64>>().is_some());
        assert!(m.writer_for::<std::time::Instant>().is_none());
        assert_eq!(m.writers.len(), 1);
    }

    #[test]
    fn test_cursor_boundary() {
        let m = BinaryMarshaller::default();
        let mut small = [0u8; 4];
        let mut cursor = WriteCursor::new(&mut small);
        assert!(!m.encode_value(&mut cursor, &7i64).unwrap());
        assert_eq!(cursor.position(), 0);

        let mut buf = [0u8; 16];
        let mut cursor = WriteCursor::new(&mut buf);
        assert!(m.encode_value(&mut cursor, &7i64).unwrap());
        let written = cursor.position();
        assert_eq!(written, 9);

        let mut partial = ReadCursor::new(&buf[..5]);
        assert_eq!(m.decode_value::<i64>(&mut partial).unwrap(), None);
        assert_eq!(partial.position(), 0);

        let mut full = ReadCursor::new(&buf[..written]);
        assert_eq!(m.decode_value::<i64>(&mut full).unwrap(), Some(7));
        assert_eq!(full.position(), written);
    }

    #[test]
    fn test_decode_unknown_tag_is_not_incomplete() {
        let m = BinaryMarshaller::default();
        let mut cursor = ReadCursor::new(&[250]);
        assert!(matches!(
            m.decode_value::<Value>(&mut cursor),
            Err(GridwireError::UnknownTag(250))
        ));
    }
}
