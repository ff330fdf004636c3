//! One-byte wire tags and collection/map flavor identifiers.

use crate::error::{GridwireError, Result};

/// Wire tag constants.
///
/// The numeric values are part of the cross-node wire format and never change.
pub mod tags {
    /// Signed or unsigned 8-bit integer.
    pub const BYTE: u8 = 1;
    /// Signed or unsigned 16-bit integer.
    pub const SHORT: u8 = 2;
    /// Signed or unsigned 32-bit integer.
    pub const INT: u8 = 3;
    /// Signed or unsigned 64-bit integer.
    pub const LONG: u8 = 4;
    /// 32-bit float.
    pub const FLOAT: u8 = 5;
    /// 64-bit float.
    pub const DOUBLE: u8 = 6;
    /// One UTF-16 code unit.
    pub const CHAR: u8 = 7;
    /// Boolean.
    pub const BOOLEAN: u8 = 8;
    /// Modified UTF-8 string.
    pub const STRING: u8 = 9;
    /// UUID.
    pub const UUID: u8 = 10;
    /// Byte array.
    pub const BYTE_ARR: u8 = 12;
    /// Short array.
    pub const SHORT_ARR: u8 = 13;
    /// Int array.
    pub const INT_ARR: u8 = 14;
    /// Long array.
    pub const LONG_ARR: u8 = 15;
    /// Float array.
    pub const FLOAT_ARR: u8 = 16;
    /// Double array.
    pub const DOUBLE_ARR: u8 = 17;
    /// Char array.
    pub const CHAR_ARR: u8 = 18;
    /// Boolean array.
    pub const BOOLEAN_ARR: u8 = 19;
    /// String array.
    pub const STRING_ARR: u8 = 20;
    /// UUID array.
    pub const UUID_ARR: u8 = 21;
    /// Array of arbitrary objects.
    pub const OBJ_ARR: u8 = 23;
    /// Collection with a flavor byte.
    pub const COL: u8 = 24;
    /// Map with a flavor byte.
    pub const MAP: u8 = 25;
    /// Single key/value pair.
    pub const MAP_ENTRY: u8 = 26;
    /// Enum constant.
    pub const ENUM: u8 = 28;
    /// Enum array.
    pub const ENUM_ARR: u8 = 29;
    /// Decimal.
    pub const DECIMAL: u8 = 30;
    /// Decimal array.
    pub const DECIMAL_ARR: u8 = 31;
    /// Timestamp.
    pub const TIMESTAMP: u8 = 33;
    /// Timestamp array.
    pub const TIMESTAMP_ARR: u8 = 34;
    /// Absent value.
    pub const NULL: u8 = 101;
    /// Structured object.
    pub const OBJ: u8 = 103;
}

/// Returns a readable name for a wire tag, for logs and error messages.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        tags::BYTE => "BYTE",
        tags::SHORT => "SHORT",
        tags::INT => "INT",
        tags::LONG => "LONG",
        tags::FLOAT => "FLOAT",
        tags::DOUBLE => "DOUBLE",
        tags::CHAR => "CHAR",
        tags::BOOLEAN => "BOOLEAN",
        tags::STRING => "STRING",
        tags::UUID => "UUID",
        tags::BYTE_ARR => "BYTE_ARR",
        tags::SHORT_ARR => "SHORT_ARR",
        tags::INT_ARR => "INT_ARR",
        tags::LONG_ARR => "LONG_ARR",
        tags::FLOAT_ARR => "FLOAT_ARR",
        tags::DOUBLE_ARR => "DOUBLE_ARR",
        tags::CHAR_ARR => "CHAR_ARR",
        tags::BOOLEAN_ARR => "BOOLEAN_ARR",
        tags::STRING_ARR => "STRING_ARR",
        tags::UUID_ARR => "UUID_ARR",
        tags::OBJ_ARR => "OBJ_ARR",
        tags::COL => "COL",
        tags::MAP => "MAP",
        tags::MAP_ENTRY => "MAP_ENTRY",
        tags::ENUM => "ENUM",
        tags::ENUM_ARR => "ENUM_ARR",
        tags::DECIMAL => "DECIMAL",
        tags::DECIMAL_ARR => "DECIMAL_ARR",
        tags::TIMESTAMP => "TIMESTAMP",
        tags::TIMESTAMP_ARR => "TIMESTAMP_ARR",
        tags::NULL => "NULL",
        tags::OBJ => "OBJ",
        _ => "UNKNOWN",
    }
}

/// Concrete collection shape carried after a collection's element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum CollectionFlavor {
    /// Application-defined set.
    UserSet = -1,
    /// Application-defined collection.
    UserCollection = 0,
    /// Growable array list.
    ArrayList = 1,
    /// Doubly linked list.
    LinkedList = 2,
    /// Hash set.
    HashSet = 3,
    /// Insertion-ordered hash set.
    LinkedHashSet = 4,
    /// Sorted set.
    TreeSet = 5,
    /// Concurrent sorted set.
    ConcurrentSkipListSet = 6,
}

impl CollectionFlavor {
    /// Returns the wire byte.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Parses a wire byte.
    pub fn from_i8(v: i8) -> Result<Self> {
        Ok(match v {
            -1 => Self::UserSet,
            0 => Self::UserCollection,
            1 => Self::ArrayList,
            2 => Self::LinkedList,
            3 => Self::HashSet,
            4 => Self::LinkedHashSet,
            5 => Self::TreeSet,
            6 => Self::ConcurrentSkipListSet,
            other => {
                return Err(GridwireError::Serialization(format!(
                    "unknown collection flavor: {other}"
                )))
            }
        })
    }

    /// Returns true for the set flavors.
    pub fn is_set(self) -> bool {
        matches!(
            self,
            Self::UserSet
                | Self::HashSet
                | Self::LinkedHashSet
                | Self::TreeSet
                | Self::ConcurrentSkipListSet
        )
    }
}

/// Concrete map shape carried after a map's entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum MapFlavor {
    /// Application-defined map.
    UserMap = 0,
    /// Hash map.
    HashMap = 1,
    /// Insertion-ordered hash map.
    LinkedHashMap = 2,
    /// Sorted map.
    TreeMap = 3,
    /// Concurrent hash map.
    ConcurrentHashMap = 4,
}

impl MapFlavor {
    /// Returns the wire byte.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Parses a wire byte.
    pub fn from_i8(v: i8) -> Result<Self> {
        Ok(match v {
            0 => Self::UserMap,
            1 => Self::HashMap,
            2 => Self::LinkedHashMap,
            3 => Self::TreeMap,
            4 => Self::ConcurrentHashMap,
            other => {
                return Err(GridwireError::Serialization(format!(
                    "unknown map flavor: {other}"
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values_are_stable() {
        assert_eq!(tags::INT_ARR, 14);
        assert_eq!(tags::COL, 24);
        assert_eq!(tags::ENUM, 28);
        assert_eq!(tags::NULL, 101);
        assert_eq!(tags::OBJ, 103);
    }

    #[test]
    fn test_tag_name() {
        assert_eq!(tag_name(tags::DECIMAL), "DECIMAL");
        assert_eq!(tag_name(200), "UNKNOWN");
    }

    #[test]
    fn test_collection_flavor_round_trip() {
        for v in -1..=6i8 {
            assert_eq!(CollectionFlavor::from_i8(v).unwrap().as_i8(), v);
        }
        assert!(CollectionFlavor::from_i8(7).is_err());
        assert!(CollectionFlavor::from_i8(-2).is_err());
    }

    #[test]
    fn test_collection_flavor_is_set() {
        assert!(CollectionFlavor::HashSet.is_set());
        assert!(CollectionFlavor::UserSet.is_set());
        assert!(!CollectionFlavor::ArrayList.is_set());
        assert!(!CollectionFlavor::LinkedList.is_set());
    }

    #[test]
    fn test_map_flavor_round_trip() {
        for v in 0..=4i8 {
            assert_eq!(MapFlavor::from_i8(v).unwrap().as_i8(), v);
        }
        assert!(MapFlavor::from_i8(5).is_err());
    }
}
