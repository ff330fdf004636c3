//! Write side of the type dispatch: host type to wire tag and encode routine.
//!
//! Well-known shapes are fixed at startup. Host types (user enums and serde
//! objects) are registered at runtime. Resolved bindings are published into a
//! copy-on-write snapshot so the hot path never takes a lock.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::binary_object::BinaryObject;
use super::enum_value::EnumValue;
use super::type_registry::TypeResolver;
use super::value::Value;
use super::wire_tag::{tags, CollectionFlavor, MapFlavor};
use super::writers::{
    write_char, write_char_array, write_collection, write_count, write_decimal, write_enum,
    write_primitive_array, write_string_array, write_tagged_array, write_timestamp, write_uuid,
    write_value,
};
use super::{DataOutput, ObjectDataOutput};
use crate::error::{GridwireError, Result};

/// Encodes a value of the bound type, tag included.
pub(crate) type EncodeFn =
    Arc<dyn Fn(&dyn TypeResolver, &mut ObjectDataOutput, &dyn Any) -> Result<()> + Send + Sync>;

/// A host type's wire tag and encode routine.
///
/// Bindings are immutable once built.
#[derive(Clone)]
pub struct TypeBinding {
    tag: u8,
    type_name: Arc<str>,
    encode: EncodeFn,
    object_type_id: Option<i32>,
}

impl TypeBinding {
    pub(crate) fn new(tag: u8, type_name: impl Into<Arc<str>>, encode: EncodeFn) -> Self {
        Self {
            tag,
            type_name: type_name.into(),
            encode,
            object_type_id: None,
        }
    }

    /// Records the wire type id a structured object of this type carries.
    pub(crate) fn with_object_type(mut self, type_id: i32) -> Self {
        self.object_type_id = Some(type_id);
        self
    }

    /// Builds a binding from an encode closure.
    pub(crate) fn from_fn<F>(tag: u8, type_name: impl Into<Arc<str>>, encode: F) -> Self
    where
        F: Fn(&dyn TypeResolver, &mut ObjectDataOutput, &dyn Any) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self::new(tag, type_name, Arc::new(encode))
    }

    /// Returns the wire tag the bound type is written under.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Returns the Rust type name the binding was built for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the wire type id of structured objects written by this binding.
    pub fn object_type_id(&self) -> Option<i32> {
        self.object_type_id
    }

    pub(crate) fn encode(
        &self,
        resolver: &dyn TypeResolver,
        out: &mut ObjectDataOutput,
        value: &dyn Any,
    ) -> Result<()> {
        (self.encode)(resolver, out, value)
    }
}

impl fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBinding")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .field("object_type_id", &self.object_type_id)
            .finish_non_exhaustive()
    }
}

pub(crate) fn downcast<T: 'static>(value: &dyn Any) -> Result<&T> {
    value.downcast_ref::<T>().ok_or_else(|| {
        GridwireError::TypeMismatch(format!(
            "binding for {} was handed a value of another type",
            type_name::<T>()
        ))
    })
}

type PayloadFn = fn(&mut ObjectDataOutput, &dyn Any) -> Result<()>;

#[derive(Clone, Copy)]
pub(crate) struct WellKnown {
    tag: u8,
    name: &'static str,
    write: PayloadFn,
}

impl WellKnown {
    pub(crate) fn tag(&self) -> u8 {
        self.tag
    }

    /// Builds the binding that writes the tag before the payload.
    pub(crate) fn binding(&self) -> TypeBinding {
        let WellKnown { tag, name, write } = *self;
        TypeBinding::from_fn(tag, name, move |_, out, value| {
            out.write_u8(tag)?;
            write(out, value)
        })
    }
}

fn write_string_collection<'a>(
    out: &mut ObjectDataOutput,
    flavor: CollectionFlavor,
    items: impl ExactSizeIterator<Item = &'a String>,
) -> Result<()> {
    write_count(out, items.len())?;
    out.write_byte(flavor.as_i8())?;
    for item in items {
        out.write_u8(tags::STRING)?;
        out.write_string(item)?;
    }
    Ok(())
}

fn write_string_keyed_map<'a>(
    out: &mut ObjectDataOutput,
    flavor: MapFlavor,
    entries: impl ExactSizeIterator<Item = (&'a String, &'a Value)>,
) -> Result<()> {
    write_count(out, entries.len())?;
    out.write_byte(flavor.as_i8())?;
    for (k, v) in entries {
        out.write_u8(tags::STRING)?;
        out.write_string(k)?;
        write_value(out, v)?;
    }
    Ok(())
}

macro_rules! well_known {
    ($map:ident; $($ty:ty => $tag:expr, |$out:ident, $v:ident| $body:expr;)*) => {
        $(
            $map.insert(
                TypeId::of::<$ty>(),
                WellKnown {
                    tag: $tag,
                    name: type_name::<$ty>(),
                    write: |$out, value| {
                        let $v = downcast::<$ty>(value)?;
                        $body
                    },
                },
            );
        )*
    };
}

static WELL_KNOWN: LazyLock<HashMap<TypeId, WellKnown>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    well_known! { map;
        i8 => tags::BYTE, |out, v| out.write_byte(*v);
        u8 => tags::BYTE, |out, v| out.write_u8(*v);
        i16 => tags::SHORT, |out, v| out.write_short(*v);
        u16 => tags::SHORT, |out, v| out.write_short(*v as i16);
        i32 => tags::INT, |out, v| out.write_int(*v);
        u32 => tags::INT, |out, v| out.write_int(*v as i32);
        i64 => tags::LONG, |out, v| out.write_long(*v);
        u64 => tags::LONG, |out, v| out.write_long(*v as i64);
        f32 => tags::FLOAT, |out, v| out.write_float(*v);
        f64 => tags::DOUBLE, |out, v| out.write_double(*v);
        bool => tags::BOOLEAN, |out, v| out.write_bool(*v);
        char => tags::CHAR, |out, v| write_char(out, *v);
        String => tags::STRING, |out, v| out.write_string(v);
        &'static str => tags::STRING, |out, v| out.write_string(v);
        Uuid => tags::UUID, |out, v| write_uuid(out, v);
        Decimal => tags::DECIMAL, |out, v| write_decimal(out, v);
        DateTime<Utc> => tags::TIMESTAMP, |out, v| write_timestamp(out, v);

        Vec<i8> => tags::BYTE_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<u8> => tags::BYTE_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<i16> => tags::SHORT_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<u16> => tags::SHORT_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<i32> => tags::INT_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<u32> => tags::INT_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<i64> => tags::LONG_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<u64> => tags::LONG_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<f32> => tags::FLOAT_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<f64> => tags::DOUBLE_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<bool> => tags::BOOLEAN_ARR, |out, v| write_primitive_array(out, v.as_slice());
        Vec<char> => tags::CHAR_ARR, |out, v| write_char_array(out, v.as_slice());
        Vec<String> => tags::STRING_ARR,
            |out, v| write_string_array(out, v.iter().map(|s| Some(s.as_str())));
        Vec<Option<String>> => tags::STRING_ARR,
            |out, v| write_string_array(out, v.iter().map(Option::as_deref));
        Vec<Uuid> => tags::UUID_ARR,
            |out, v| write_tagged_array(out, v.iter().map(Some), tags::UUID, write_uuid);
        Vec<Decimal> => tags::DECIMAL_ARR,
            |out, v| write_tagged_array(out, v.iter().map(Some), tags::DECIMAL, write_decimal);
        Vec<DateTime<Utc>> => tags::TIMESTAMP_ARR,
            |out, v| write_tagged_array(out, v.iter().map(Some), tags::TIMESTAMP, write_timestamp);

        Vec<Value> => tags::OBJ_ARR, |out, v| {
            write_count(out, v.len())?;
            v.iter().try_for_each(|item| write_value(out, item))
        };
        VecDeque<Value> => tags::COL,
            |out, v| write_collection(out, CollectionFlavor::LinkedList, v.iter());
        HashSet<String> => tags::COL,
            |out, v| write_string_collection(out, CollectionFlavor::HashSet, v.iter());
        BTreeSet<String> => tags::COL,
            |out, v| write_string_collection(out, CollectionFlavor::TreeSet, v.iter());
        HashMap<String, Value> => tags::MAP,
            |out, v| write_string_keyed_map(out, MapFlavor::HashMap, v.iter());
        BTreeMap<String, Value> => tags::MAP,
            |out, v| write_string_keyed_map(out, MapFlavor::TreeMap, v.iter());
        (Value, Value) => tags::MAP_ENTRY, |out, v| {
            write_value(out, &v.0)?;
            write_value(out, &v.1)
        };

        EnumValue => tags::ENUM, |out, v| write_enum(out, v);
        Vec<EnumValue> => tags::ENUM_ARR,
            |out, v| write_tagged_array(out, v.iter().map(Some), tags::ENUM, write_enum);
        BinaryObject => tags::OBJ, |out, v| v.write_body(out);
        () => tags::NULL, |_out, _v| Ok(());
    }
    map
});

/// Looks up a fixed well-known shape.
pub(crate) fn well_known(type_id: TypeId) -> Option<&'static WellKnown> {
    WELL_KNOWN.get(&type_id)
}

/// Runtime-registered host types.
#[derive(Default)]
pub(crate) struct HostTypes {
    bindings: RwLock<HashMap<TypeId, TypeBinding>>,
}

impl HostTypes {
    pub(crate) fn insert(&self, type_id: TypeId, binding: TypeBinding) -> Result<()> {
        if well_known(type_id).is_some() {
            return Err(GridwireError::Configuration(format!(
                "{} already has a fixed wire shape",
                binding.type_name()
            )));
        }
        debug!(
            tag = binding.tag(),
            type_name = binding.type_name(),
            "registered host type"
        );
        self.bindings.write().insert(type_id, binding);
        Ok(())
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<TypeBinding> {
        self.bindings.read().get(&type_id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.read().len()
    }
}

/// Copy-on-write cache of resolved bindings.
///
/// Readers load the current snapshot without locking. Misses build under a
/// mutex, copy the snapshot, add the entry and publish the copy.
pub(crate) struct WriterCache {
    snapshot: ArcSwap<HashMap<TypeId, TypeBinding>>,
    lock: Mutex<()>,
}

impl WriterCache {
    pub(crate) fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<TypeBinding> {
        self.snapshot.load().get(&type_id).cloned()
    }

    /// Returns the cached binding or builds and publishes one.
    ///
    /// A build that yields nothing leaves the snapshot untouched and is
    /// retried on the next call.
    pub(crate) fn get_or_build(
        &self,
        type_id: TypeId,
        build: impl FnOnce() -> Option<TypeBinding>,
    ) -> Option<TypeBinding> {
        if let Some(binding) = self.get(type_id) {
            return Some(binding);
        }

        let _guard = self.lock.lock();
        let current = self.snapshot.load_full();
        if let Some(binding) = current.get(&type_id) {
            return Some(binding.clone());
        }

        let binding = build()?;
        let mut next = HashMap::clone(&current);
        next.insert(type_id, binding.clone());
        let entries = next.len();
        self.snapshot.store(Arc::new(next));
        debug!(
            tag = binding.tag(),
            type_name = binding.type_name(),
            entries,
            "published write binding"
        );
        Some(binding)
    }

    /// Drops one cached binding so the next lookup rebuilds it.
    pub(crate) fn invalidate(&self, type_id: TypeId) {
        let _guard = self.lock.lock();
        let current = self.snapshot.load_full();
        if current.contains_key(&type_id) {
            let mut next = HashMap::clone(&current);
            next.remove(&type_id);
            self.snapshot.store(Arc::new(next));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.load().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::serialization::TypeRegistry;

    fn encode_with(binding: &TypeBinding, value: &dyn Any) -> Vec<u8> {
        let mut out = ObjectDataOutput::new();
        binding.encode(&TypeRegistry::new(), &mut out, value).unwrap();
        out.into_bytes()
    }

    #[test]
    fn test_well_known_tags() {
        assert_eq!(well_known(TypeId::of::<i32>()).unwrap().tag(), tags::INT);
        assert_eq!(well_known(TypeId::of::<u32>()).unwrap().tag(), tags::INT);
        assert_eq!(well_known(TypeId::of::<Vec<u8>>()).unwrap().tag(), tags::BYTE_ARR);
        assert_eq!(well_known(TypeId::of::<Vec<i8>>()).unwrap().tag(), tags::BYTE_ARR);
        assert_eq!(well_known(TypeId::of::<VecDeque<Value>>()).unwrap().tag(), tags::COL);
        assert_eq!(
            well_known(TypeId::of::<BTreeMap<String, Value>>()).unwrap().tag(),
            tags::MAP
        );
        assert_eq!(well_known(TypeId::of::<BinaryObject>()).unwrap().tag(), tags::OBJ);
        assert!(well_known(TypeId::of::<Vec<Vec<u8>>>()).is_none());
    }

    #[test]
    fn test_binding_writes_tag_then_payload() {
        let binding = well_known(TypeId::of::<i16>()).unwrap().binding();
        assert_eq!(encode_with(&binding, &-2i16), vec![tags::SHORT, 0xFE, 0xFF]);
    }

    #[test]
    fn test_binding_rejects_wrong_type() {
        let binding = well_known(TypeId::of::<i16>()).unwrap().binding();
        let mut out = ObjectDataOutput::new();
        let err = binding
            .encode(&TypeRegistry::new(), &mut out, &1i32)
            .unwrap_err();
        assert!(matches!(err, GridwireError::TypeMismatch(_)));
    }

    #[test]
    fn test_string_set_layout() {
        let binding = well_known(TypeId::of::<BTreeSet<String>>()).unwrap().binding();
        let set: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(
            encode_with(&binding, &set),
            vec![tags::COL, 1, 0, 0, 0, 5, tags::STRING, 1, 0, 0, 0, b'a']
        );
    }

    #[test]
    fn test_cache_builds_once() {
        let cache = WriterCache::new();
        let builds = AtomicUsize::new(0);
        let id = TypeId::of::<i64>();
        for _ in 0..3 {
            let binding = cache.get_or_build(id, || {
                builds.fetch_add(1, Ordering::SeqCst);
                well_known(id).map(WellKnown::binding)
            });
            assert_eq!(binding.unwrap().tag(), tags::LONG);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = WriterCache::new();
        let id = TypeId::of::<std::time::Duration>();
        assert!(cache.get_or_build(id, || None).is_none());
        assert_eq!(cache.len(), 0);
        let binding = cache.get_or_build(id, || well_known(TypeId::of::<()>()).map(WellKnown::binding));
        assert!(binding.is_some());
    }

    #[test]
    fn test_invalidate() {
        let cache = WriterCache::new();
        let id = TypeId::of::<bool>();
        cache.get_or_build(id, || well_known(id).map(WellKnown::binding));
        cache.invalidate(id);
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn test_snapshot_readers_see_published_entries() {
        let cache = Arc::new(WriterCache::new());
        let handles: Vec<_> = [TypeId::of::<i8>(), TypeId::of::<u8>(), TypeId::of::<f32>()]
            .into_iter()
            .map(|id| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache
                        .get_or_build(id, || well_known(id).map(WellKnown::binding))
                        .is_some()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_host_types_reject_fixed_shapes() {
        let host = HostTypes::default();
        let binding = well_known(TypeId::of::<String>()).unwrap().binding();
        assert!(host.insert(TypeId::of::<String>(), binding).is_err());
        assert_eq!(host.len(), 0);
    }
}
