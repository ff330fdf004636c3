//! Type identifiers and metadata resolution.
//!
//! Numeric type ids are derived from type names so that every node computes
//! the same id for the same name. Whether a node *knows* an id is a separate
//! question answered by a [`TypeResolver`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{GridwireError, Result};

/// Computes the stable type id of a type name.
///
/// The id is the 31-multiplier hash of the lower-cased name's UTF-16 units,
/// matching what non-Rust nodes compute for the same name.
pub fn type_id_of(type_name: &str) -> i32 {
    type_name
        .to_lowercase()
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Kind of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// An enum whose constants travel as ordinals.
    Enum,
    /// A structured object carried as an opaque payload.
    Object,
}

/// Metadata known about a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMeta {
    type_id: i32,
    type_name: Arc<str>,
    kind: TypeKind,
}

impl TypeMeta {
    /// Returns the numeric type id.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Returns the type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the type kind.
    pub fn kind(&self) -> TypeKind {
        self.kind
    }
}

/// Source of type metadata, consulted only when ids must be chosen on encode
/// or when deferred values are materialized.
pub trait TypeResolver: Send + Sync {
    /// Returns the numeric id for `type_name` if this node has it registered.
    fn resolve_name(&self, type_name: &str) -> Option<i32>;

    /// Returns metadata for a numeric type id.
    fn resolve_id(&self, type_id: i32) -> Option<TypeMeta>;
}

/// In-memory [`TypeResolver`].
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_id: RwLock<HashMap<i32, TypeMeta>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `type_name` and returns its id.
    ///
    /// Registering the same name twice is a no-op. Two different names that
    /// hash to the same id, or a name hashing to the reserved id `0`, are
    /// rejected.
    pub fn register(&self, type_name: &str, kind: TypeKind) -> Result<i32> {
        let type_id = type_id_of(type_name);
        if type_id == 0 {
            return Err(GridwireError::Configuration(format!(
                "type name {type_name:?} hashes to the reserved id 0"
            )));
        }

        let mut by_id = self.by_id.write();
        if let Some(existing) = by_id.get(&type_id) {
            if existing.type_name.eq_ignore_ascii_case(type_name) {
                return Ok(type_id);
            }
            return Err(GridwireError::Configuration(format!(
                "type id {type_id} of {type_name:?} collides with {:?}",
                existing.type_name
            )));
        }

        by_id.insert(
            type_id,
            TypeMeta {
                type_id,
                type_name: Arc::from(type_name),
                kind,
            },
        );
        debug!(type_id, type_name, ?kind, "registered type metadata");
        Ok(type_id)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.read().is_empty()
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve_name(&self, type_name: &str) -> Option<i32> {
        let type_id = type_id_of(type_name);
        self.by_id
            .read()
            .get(&type_id)
            .filter(|meta| meta.type_name.eq_ignore_ascii_case(type_name))
            .map(|meta| meta.type_id)
    }

    fn resolve_id(&self, type_id: i32) -> Option<TypeMeta> {
        self.by_id.read().get(&type_id).cloned()
    }
}

/// Resolves a (type id, optional name) reference to a type name.
pub(crate) fn resolve_type_name(
    resolver: &dyn TypeResolver,
    type_id: i32,
    type_name: Option<&str>,
) -> Result<String> {
    if let Some(name) = type_name {
        return Ok(name.to_string());
    }
    resolver
        .resolve_id(type_id)
        .map(|meta| meta.type_name().to_string())
        .ok_or_else(|| GridwireError::Unresolved(format!("type id {type_id} is not registered")))
}
