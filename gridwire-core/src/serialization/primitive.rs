//! Fixed-width primitives shared by the object codec and the framer.

/// A fixed-width little-endian scalar.
///
/// Signed and unsigned integers of the same width produce identical bytes;
/// only the reader decides which representation it wants.
pub trait Primitive: Copy + Send + Sync + 'static {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Writes the value into `dst[..Self::SIZE]`.
    fn write_le(self, dst: &mut [u8]);

    /// Reads a value from `src[..Self::SIZE]`.
    fn read_le(src: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, dst: &mut [u8]) {
                    dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&src[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Primitive for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        dst[0] = u8::from(self);
    }

    #[inline]
    fn read_le(src: &[u8]) -> Self {
        src[0] != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: Primitive>(v: T) -> Vec<u8> {
        let mut buf = vec![0u8; T::SIZE];
        v.write_le(&mut buf);
        buf
    }

    #[test]
    fn test_sizes() {
        assert_eq!(<i8 as Primitive>::SIZE, 1);
        assert_eq!(<u16 as Primitive>::SIZE, 2);
        assert_eq!(<f32 as Primitive>::SIZE, 4);
        assert_eq!(<u64 as Primitive>::SIZE, 8);
        assert_eq!(<bool as Primitive>::SIZE, 1);
    }

    #[test]
    fn test_little_endian_int() {
        assert_eq!(encode(0x01020304i32), vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_signed_unsigned_share_bytes() {
        assert_eq!(encode(-1i8), encode(255u8));
        assert_eq!(encode(-2i16), encode(0xFFFEu16));
        assert_eq!(encode(-3i32), encode(-3i32 as u32));
        assert_eq!(encode(i64::MIN), encode(1u64 << 63));
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        assert!(bool::read_le(&[7]));
        assert!(!bool::read_le(&[0]));
        assert_eq!(encode(true), vec![1]);
    }

    #[test]
    fn test_float_round_trip() {
        let bytes = encode(3.5f64);
        assert_eq!(f64::read_le(&bytes), 3.5);
        let bytes = encode(f32::NEG_INFINITY);
        assert_eq!(f32::read_le(&bytes), f32::NEG_INFINITY);
    }
}
