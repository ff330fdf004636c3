//! Bounded input used by the object codec.

use crate::error::{GridwireError, Result};

use super::mutf8;
use super::primitive::Primitive;

/// Trait for reading primitive values from the wire format.
///
/// All multi-byte values are read in little-endian byte order.
pub trait DataInput {
    /// Reads a single unsigned byte.
    fn read_u8(&mut self) -> Result<u8>;

    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a 16-bit signed integer.
    fn read_short(&mut self) -> Result<i16>;

    /// Reads a single UTF-16 code unit.
    fn read_char(&mut self) -> Result<u16>;

    /// Reads a 32-bit signed integer.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads a 32-bit floating point.
    fn read_float(&mut self) -> Result<f32>;

    /// Reads a 64-bit floating point.
    fn read_double(&mut self) -> Result<f64>;

    /// Reads the specified number of raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads a length-prefixed modified UTF-8 string.
    fn read_string(&mut self) -> Result<String>;
}

/// A slice-based implementation of `DataInput`.
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns the current position in the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reads any fixed-width primitive.
    pub fn read_primitive<T: Primitive>(&mut self) -> Result<T> {
        let raw = self.take(T::SIZE)?;
        Ok(T::read_le(raw))
    }

    /// Borrows the next `len` bytes without copying.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Reads an i32 length and validates it against `max`.
    pub fn read_len(&mut self, max: usize) -> Result<usize> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(GridwireError::Serialization(format!(
                "invalid length: {len}"
            )));
        }
        let len = len as usize;
        if len > max {
            return Err(GridwireError::Serialization(format!(
                "length {len} exceeds limit {max}"
            )));
        }
        Ok(len)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(GridwireError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_u8(&mut self) -> Result<u8> {
        self.read_primitive()
    }

    fn read_byte(&mut self) -> Result<i8> {
        self.read_primitive()
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.read_primitive()
    }

    fn read_short(&mut self) -> Result<i16> {
        self.read_primitive()
    }

    fn read_char(&mut self) -> Result<u16> {
        self.read_primitive()
    }

    fn read_int(&mut self) -> Result<i32> {
        self.read_primitive()
    }

    fn read_long(&mut self) -> Result<i64> {
        self.read_primitive()
    }

    fn read_float(&mut self) -> Result<f32> {
        self.read_primitive()
    }

    fn read_double(&mut self) -> Result<f64> {
        self.read_primitive()
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.take(len).map(<[u8]>::to_vec)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(GridwireError::Serialization(format!(
                "invalid string length: {len}"
            )));
        }
        let bytes = self.take(len as usize)?;
        mutf8::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_input() {
        let data = [1, 2, 3, 4];
        let input = ObjectDataInput::new(&data);
        assert_eq!(input.remaining(), 4);
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_read_byte_negative() {
        let data = [0xFFu8];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_byte().unwrap(), -1);
    }

    #[test]
    fn test_read_bool_nonzero_is_true() {
        let data = [42u8];
        let mut input = ObjectDataInput::new(&data);
        assert!(input.read_bool().unwrap());
    }

    #[test]
    fn test_read_int_little_endian() {
        let data = [0x04, 0x03, 0x02, 0x01];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_int().unwrap(), 0x01020304);
    }

    #[test]
    fn test_read_long_little_endian() {
        let data = [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_long().unwrap(), 0x0102030405060708);
    }

    #[test]
    fn test_read_double() {
        let data = 1.0f64.to_le_bytes();
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_double().unwrap(), 1.0);
    }

    #[test]
    fn test_read_string() {
        let data = [4, 0, 0, 0, b't', b'e', b's', b't'];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_string().unwrap(), "test");
    }

    #[test]
    fn test_insufficient_data_is_truncated() {
        let data = [0x01, 0x02, 0x03];
        let mut input = ObjectDataInput::new(&data);
        let err = input.read_int().unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_negative_string_length() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut input = ObjectDataInput::new(&data);
        assert!(input.read_string().is_err());
    }

    #[test]
    fn test_read_len_limit() {
        let data = 10i32.to_le_bytes();
        let mut input = ObjectDataInput::new(&data);
        assert!(input.read_len(5).is_err());
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_len(10).unwrap(), 10);
    }

    #[test]
    fn test_read_slice_borrows() {
        let data = [9, 8, 7];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_slice(2).unwrap(), &[9, 8]);
        assert_eq!(input.remaining(), 1);
    }
}
