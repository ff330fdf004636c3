//! Serde integration for opaque object payloads.
//!
//! Registered serde types travel inside a structured object as a
//! [bincode](https://docs.rs/bincode) blob. [`Serde<T>`] reads such an object
//! straight into `T` without going through type metadata. When decoded
//! through a marshaller the object's type id must match the name `T` was
//! registered under.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use gridwire_core::serialization::{BinaryMarshaller, Serde};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct User {
//!     name: String,
//!     age: u32,
//! }
//!
//! let marshaller = BinaryMarshaller::default();
//! marshaller.register_object::<User>("User").unwrap();
//!
//! let bytes = marshaller
//!     .marshal(&User { name: "Alice".to_string(), age: 30 })
//!     .unwrap();
//! let user: Serde<User> = marshaller.unmarshal(&bytes).unwrap();
//! assert_eq!(user.age, 30);
//! ```

use std::ops::{Deref, DerefMut};

use serde::{de::DeserializeOwned, Serialize};

use super::traits::{FromValue, Request};
use super::value::Value;
use crate::error::{GridwireError, Result};

/// Encodes `value` as a bincode blob.
pub(crate) fn to_blob<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| GridwireError::Serialization(format!("bincode serialize failed: {e}")))
}

/// Decodes a bincode blob.
pub(crate) fn from_blob<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| GridwireError::Serialization(format!("bincode deserialize failed: {e}")))
}

/// A wrapper that decodes a structured object's payload directly into `T`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Serde<T>(T);

impl<T> Serde<T> {
    /// Creates a new `Serde` wrapper around the given value.
    pub fn new(value: T) -> Self {
        Serde(value)
    }

    /// Consumes the wrapper and returns the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Serde<T> {
    fn from(value: T) -> Self {
        Serde::new(value)
    }
}

impl<T> Deref for Serde<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Serde<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: DeserializeOwned + 'static> FromValue for Serde<T> {
    fn request() -> Request {
        Request::exact::<T>()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(obj) => from_blob(obj.payload()).map(Serde),
            other => Err(GridwireError::TypeMismatch(format!(
                "expected a structured object, found {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;

    use super::*;
    use crate::serialization::BinaryObject;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct SimpleUser {
        name: String,
        age: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Status {
        Active,
        Pending { reason: String },
    }

    #[test]
    fn test_blob_round_trip() {
        let user = SimpleUser {
            name: "Alice".to_string(),
            age: 30,
        };
        let blob = to_blob(&user).unwrap();
        assert_eq!(from_blob::<SimpleUser>(&blob).unwrap(), user);
    }

    #[test]
    fn test_blob_collections_and_enums() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), Status::Active);
        map.insert(
            "b".to_string(),
            Status::Pending {
                reason: "review".to_string(),
            },
        );
        let blob = to_blob(&map).unwrap();
        assert_eq!(from_blob::<HashMap<String, Status>>(&blob).unwrap(), map);
    }

    #[test]
    fn test_from_blob_invalid_data() {
        let result = from_blob::<SimpleUser>(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(GridwireError::Serialization(_))));
    }

    #[test]
    fn test_serde_from_object_value() {
        let user = SimpleUser {
            name: "Bob".to_string(),
            age: 25,
        };
        let obj = BinaryObject::named("SimpleUser", to_blob(&user).unwrap());
        let wrapped = Serde::<SimpleUser>::from_value(Value::Object(obj)).unwrap();
        assert_eq!(wrapped.into_inner(), user);
    }

    #[test]
    fn test_serde_from_other_value_fails() {
        let result = Serde::<SimpleUser>::from_value(Value::Int(3));
        assert!(matches!(result, Err(GridwireError::TypeMismatch(_))));
    }

    #[test]
    fn test_serde_wrapper_deref() {
        let mut wrapped = Serde::new(SimpleUser {
            name: "Alice".to_string(),
            age: 30,
        });
        assert_eq!(wrapped.name, "Alice");
        wrapped.age = 31;
        assert_eq!(wrapped.age, 31);
    }

    #[test]
    fn test_serde_wrapper_from() {
        let user = SimpleUser {
            name: "Alice".to_string(),
            age: 30,
        };
        let wrapped: Serde<SimpleUser> = user.clone().into();
        assert_eq!(*wrapped, user);
    }
}
