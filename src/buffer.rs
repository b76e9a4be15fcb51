//! Byte buffers that zero their contents on drop.

use std::fmt;
use std::ops::{Deref, DerefMut};

use zeroize::Zeroize;

/// Growable byte buffer that is zeroized when dropped.
///
/// Used for plaintext, key material and the record reader's internal
/// buffer, so that secrets do not linger on the heap after use.
#[derive(Default)]
pub struct Buf(Vec<u8>);

impl Buf {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Buf(Vec::with_capacity(capacity))
    }

    /// Remove all bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Append the given bytes.
    pub fn extend_from_slice(&mut self, other: &[u8]) {
        self.0.extend_from_slice(other);
    }

    /// Append a single byte.
    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }

    /// Resize to `len` bytes, filling new bytes with `value`.
    pub fn resize(&mut self, len: usize, value: u8) {
        self.0.resize(len, value);
    }

    /// Shorten to `len` bytes. No effect if already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Consume the buffer, returning the inner vector without zeroizing.
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf").field("len", &self.0.len()).finish()
    }
}

/// Conversion into [`Buf`].
pub trait ToBuf {
    /// Move or copy the bytes into a new `Buf`.
    fn to_buf(self) -> Buf;
}

impl ToBuf for Vec<u8> {
    fn to_buf(self) -> Buf {
        Buf(self)
    }
}

impl ToBuf for &[u8] {
    fn to_buf(self) -> Buf {
        self.to_vec().to_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_truncates() {
        let mut buf = Buf::new();
        buf.extend_from_slice(&[1, 2, 3]);
        buf.push(4);
        assert_eq!(&*buf, &[1, 2, 3, 4]);
        buf.truncate(2);
        assert_eq!(&*buf, &[1, 2]);
        buf.clear();
        assert!(buf.is_empty());
    }

    #[test]
    fn to_buf_copies_slice() {
        let buf = (&[9u8, 8, 7][..]).to_buf();
        assert_eq!(&*buf, &[9, 8, 7]);
    }
}
