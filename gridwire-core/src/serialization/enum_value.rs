//! Deferred enum constants.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::type_registry::{resolve_type_name, type_id_of, TypeResolver};
use crate::error::{GridwireError, Result};

/// A host enum that can travel as an enum constant.
///
/// # Example
///
/// ```rust
/// use gridwire_core::serialization::BinaryEnum;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Color {
///     Red,
///     Green,
/// }
///
/// impl BinaryEnum for Color {
///     const TYPE_NAME: &'static str = "Color";
///
///     fn ordinal(&self) -> i32 {
///         *self as i32
///     }
///
///     fn from_ordinal(ordinal: i32) -> Option<Self> {
///         match ordinal {
///             0 => Some(Color::Red),
///             1 => Some(Color::Green),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait BinaryEnum: Sized + Send + Sync + 'static {
    /// Stable, cross-node name of the enum type.
    const TYPE_NAME: &'static str;

    /// Returns the constant's ordinal.
    fn ordinal(&self) -> i32;

    /// Returns the constant for `ordinal`, if there is one.
    fn from_ordinal(ordinal: i32) -> Option<Self>;
}

/// An enum constant identified by type and ordinal, resolved lazily.
///
/// Decoding never looks the type up; [`EnumValue::deserialize`] does, and is
/// the only place an unknown type surfaces as an error.
///
/// Two values are equal when their type ids and ordinals are equal. For a
/// value carried by type name, the type id is derived from that name.
#[derive(Debug, Clone)]
pub struct EnumValue {
    type_id: i32,
    class_name: Option<String>,
    ordinal: i32,
}

impl EnumValue {
    /// Creates a value carried by numeric type id.
    pub fn new(type_id: i32, ordinal: i32) -> Self {
        Self {
            type_id,
            class_name: None,
            ordinal,
        }
    }

    /// Creates a value carried by type name, for types without a registered id.
    pub fn with_class_name(class_name: impl Into<String>, ordinal: i32) -> Self {
        let class_name = class_name.into();
        Self {
            type_id: type_id_of(&class_name),
            class_name: Some(class_name),
            ordinal,
        }
    }

    /// Captures a host enum constant.
    ///
    /// The numeric id is used when `resolver` knows the type, the name otherwise.
    pub fn of<E: BinaryEnum>(value: &E, resolver: &dyn TypeResolver) -> Self {
        match resolver.resolve_name(E::TYPE_NAME) {
            Some(type_id) => Self::new(type_id, value.ordinal()),
            None => Self::with_class_name(E::TYPE_NAME, value.ordinal()),
        }
    }

    /// Returns the type id.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Returns the type name if the value was carried by name.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Returns the ordinal.
    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    /// Materializes the host constant.
    ///
    /// # Errors
    ///
    /// - `Unresolved` if the type id is unknown to `resolver`, or the ordinal
    ///   names no constant of `E`
    /// - `TypeMismatch` if the value belongs to a different enum type
    pub fn deserialize<E: BinaryEnum>(&self, resolver: &dyn TypeResolver) -> Result<E> {
        let name = resolve_type_name(resolver, self.type_id, self.class_name.as_deref())?;
        if !name.eq_ignore_ascii_case(E::TYPE_NAME) {
            return Err(GridwireError::TypeMismatch(format!(
                "enum of type {name} requested as {}",
                E::TYPE_NAME
            )));
        }
        E::from_ordinal(self.ordinal).ok_or_else(|| {
            GridwireError::Unresolved(format!(
                "ordinal {} is not a constant of {}",
                self.ordinal,
                E::TYPE_NAME
            ))
        })
    }

    /// Returns a displayable form that uses `resolver` for a readable type name.
    pub fn display_with<'a>(&'a self, resolver: &'a dyn TypeResolver) -> impl fmt::Display + 'a {
        DisplayWith {
            value: self,
            resolver,
        }
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.ordinal == other.ordinal
    }
}

impl Eq for EnumValue {}

impl Hash for EnumValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.wrapping_mul(31).wrapping_add(self.ordinal).hash(state);
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class_name {
            Some(name) => write!(f, "BinaryEnum[clsName={name}, ordinal={}]", self.ordinal),
            None => write!(
                f,
                "BinaryEnum[typeId={}, ordinal={}]",
                self.type_id, self.ordinal
            ),
        }
    }
}

struct DisplayWith<'a> {
    value: &'a EnumValue,
    resolver: &'a dyn TypeResolver,
}

impl fmt::Display for DisplayWith<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .value
            .class_name
            .clone()
            .or_else(|| {
                self.resolver
                    .resolve_id(self.value.type_id)
                    .map(|meta| meta.type_name().to_string())
            });
        match name {
            Some(name) => write!(f, "{name}[ordinal={}]", self.value.ordinal),
            None => fmt::Display::fmt(self.value, f),
        }
    }
}
