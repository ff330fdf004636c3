//! Position-tracking views over caller-supplied buffers.
//!
//! Cursors never allocate. Primitive writes and reads are atomic: a value
//! that does not fit leaves the cursor where it was and reports failure.

use crate::serialization::Primitive;

/// Write position over a fixed-capacity buffer.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    /// Creates a cursor at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the space left.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns the bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Writes a primitive if it fits entirely.
    #[inline]
    pub fn put<T: Primitive>(&mut self, v: T) -> bool {
        if self.remaining() < T::SIZE {
            return false;
        }
        v.write_le(&mut self.buf[self.pos..self.pos + T::SIZE]);
        self.pos += T::SIZE;
        true
    }

    /// Writes all of `bytes` if they fit, nothing otherwise.
    pub fn put_all(&mut self, bytes: &[u8]) -> bool {
        if self.remaining() < bytes.len() {
            return false;
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        true
    }

    /// Writes as much of `bytes` as fits and returns how much that was.
    pub fn put_partial(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        n
    }
}

/// Read position over available bytes.
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns the unread bytes without consuming them.
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consumes `n` bytes, clamped to what is available.
    pub fn advance(&mut self, n: usize) {
        self.pos += n.min(self.remaining());
    }

    /// Reads a primitive if all its bytes are available.
    #[inline]
    pub fn take<T: Primitive>(&mut self) -> Option<T> {
        let bytes = self.take_exact(T::SIZE)?;
        Some(T::read_le(bytes))
    }

    /// Reads exactly `n` bytes if they are all available.
    pub fn take_exact(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(bytes)
    }

    /// Reads up to `max` bytes.
    pub fn take_partial(&mut self, max: usize) -> &'a [u8] {
        let n = max.min(self.remaining());
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        bytes
    }
}
