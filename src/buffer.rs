//! Bounded byte buffer for APDU responses and scratch storage.
//!
//! The firmware core never grows a buffer past its declared capacity: the
//! response buffer, password scratch buffers and the key-import scratch all
//! have fixed maxima. `ByteBuffer` enforces `len <= cap` on every mutation.

use crate::errors::Error;

/// Capacity of the response buffer handed to the executor. Large enough for
/// an RSA-2048 public key template or the biggest stored data object plus a
/// trailing status word.
pub const RESPONSE_BUFFER_SIZE: usize = 3072;

/// A mutable byte buffer with a fixed capacity.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    cap: usize,
}

impl ByteBuffer {
    /// Create an empty buffer with the given capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
            cap,
        }
    }

    /// Create a buffer sized for a full APDU response.
    pub fn response() -> Self {
        Self::with_capacity(RESPONSE_BUFFER_SIZE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Bytes that can still be appended.
    pub fn free_space(&self) -> usize {
        self.cap - self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Truncate to `len`. Lengths beyond the current one are ignored.
    pub fn set_len(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Append bytes, failing if the capacity would be exceeded.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() > self.free_space() {
            return Err(Error::InternalError);
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.append(&[byte])
    }

    /// Append a big-endian status word.
    pub fn append_sw(&mut self, sw: u16) -> Result<(), Error> {
        self.append(&sw.to_be_bytes())
    }

    /// Replace the whole contents with a bare status word.
    pub fn stamp_sw(&mut self, sw: u16) {
        debug_assert!(self.cap >= 2);
        self.data.clear();
        if self.cap >= 2 {
            self.data.extend_from_slice(&sw.to_be_bytes());
        }
    }

    /// Remove `len` bytes starting at `start`. Ranges reaching past the end
    /// truncate the buffer at `start`.
    pub fn delete(&mut self, start: usize, len: usize) {
        if start >= self.data.len() {
            return;
        }
        let end = usize::min(start + len, self.data.len());
        self.data.drain(start..end);
    }

    /// Shift the tail beginning at `at` by `delta` bytes. A positive delta
    /// opens a zero-filled gap before the tail, a negative one overwrites the
    /// `delta` bytes preceding it.
    pub fn move_tail(&mut self, at: usize, delta: isize) -> Result<(), Error> {
        if delta == 0 || at > self.data.len() {
            return Ok(());
        }
        if delta > 0 {
            let delta = delta as usize;
            if self.data.len() + delta > self.cap {
                return Err(Error::InternalError);
            }
            self.data.splice(at..at, std::iter::repeat(0u8).take(delta));
        } else {
            let delta = delta.unsigned_abs();
            let from = at.saturating_sub(delta);
            self.data.drain(from..at);
        }
        Ok(())
    }
}

impl std::ops::Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_within_capacity() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.append(&[1, 2, 3]).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.free_space(), 1);
    }

    #[test]
    fn test_append_overflow() {
        let mut buf = ByteBuffer::with_capacity(2);
        assert_eq!(buf.append(&[1, 2, 3]), Err(Error::InternalError));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_append_sw() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[0xAA]).unwrap();
        buf.append_sw(0x9000).unwrap();
        assert_eq!(buf.as_slice(), &[0xAA, 0x90, 0x00]);
    }

    #[test]
    fn test_stamp_sw_replaces_contents() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[1, 2, 3, 4]).unwrap();
        buf.stamp_sw(0x6700);
        assert_eq!(buf.as_slice(), &[0x67, 0x00]);
    }

    #[test]
    fn test_set_len_truncates_only() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[1, 2, 3, 4]).unwrap();
        buf.set_len(6);
        assert_eq!(buf.len(), 4);
        buf.set_len(2);
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_delete_range() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[1, 2, 3, 4, 5]).unwrap();
        buf.delete(1, 2);
        assert_eq!(buf.as_slice(), &[1, 4, 5]);
        buf.delete(2, 10);
        assert_eq!(buf.as_slice(), &[1, 4]);
    }

    #[test]
    fn test_move_tail_right() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[1, 2, 3]).unwrap();
        buf.move_tail(1, 2).unwrap();
        assert_eq!(buf.as_slice(), &[1, 0, 0, 2, 3]);
    }

    #[test]
    fn test_move_tail_left() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(&[1, 2, 3, 4, 5]).unwrap();
        buf.move_tail(3, -2).unwrap();
        assert_eq!(buf.as_slice(), &[1, 4, 5]);
    }

    #[test]
    fn test_move_tail_overflow() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.append(&[1, 2, 3]).unwrap();
        assert!(buf.move_tail(1, 3).is_err());
    }
}
