//! Byte level input/output used by every codec in this crate.
//!
//! Writers append to a [`WriteBuffer`] sink; readers consume a [`ReadBuffer`] source that supports
//! exact reads, a small contiguous look-ahead and end-of-data detection. Both are owned by the
//! caller, this crate never schedules I/O itself.

use bytes::{Buf, BufMut, BytesMut};
use integer_encoding::VarInt;

use crate::error::{Error, Result};

/// Strings longer than this are treated as corrupt input rather than allocated.
pub const MAX_STRING_SIZE: u64 = 1 << 30;

/// Maximum number of bytes a LEB128 encoded `u64` can occupy.
const MAX_VAR_UINT_LEN: usize = 10;

/// An append-only byte sink.
pub trait WriteBuffer {
    /// Append `src`, failing if the sink rejects the write.
    fn write_bytes(&mut self, src: &[u8]) -> Result<()>;
}

impl WriteBuffer for Vec<u8> {
    fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.extend_from_slice(src);
        Ok(())
    }
}

impl WriteBuffer for BytesMut {
    fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.put_slice(src);
        Ok(())
    }
}

/// A sink with a fixed capacity. Writes that would overflow it are rejected and leave the
/// buffer untouched.
#[derive(Debug)]
pub struct BoundedBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl BoundedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

impl WriteBuffer for BoundedBuffer {
    fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        if self.buf.len() + src.len() > self.capacity {
            return Err(Error::serialization(format!(
                "buffer full: cannot write {} bytes, {} of {} used",
                src.len(),
                self.buf.len(),
                self.capacity
            )));
        }
        self.buf.put_slice(src);
        Ok(())
    }
}

/// A sequential byte source.
pub trait ReadBuffer {
    /// The bytes available without consuming them. May be shorter than what remains in the
    /// source, callers must only rely on it for small look-ahead.
    fn peek(&self) -> &[u8];

    /// Fill `dst` completely or fail with a corruption error.
    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()>;

    /// Discard `n` bytes.
    fn skip(&mut self, n: usize) -> Result<()>;

    /// True once every byte has been consumed.
    fn eof(&self) -> bool;
}

impl<B: Buf> ReadBuffer for B {
    fn peek(&self) -> &[u8] {
        self.chunk()
    }

    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        if self.remaining() < dst.len() {
            return Err(Error::corruption(format!(
                "unexpected end of stream: needed {} bytes, {} remaining",
                dst.len(),
                self.remaining()
            )));
        }
        self.copy_to_slice(dst);
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::corruption(format!(
                "unexpected end of stream: cannot skip {} bytes, {} remaining",
                n,
                self.remaining()
            )));
        }
        self.advance(n);
        Ok(())
    }

    fn eof(&self) -> bool {
        !self.has_remaining()
    }
}

/// Typed helpers on top of [`WriteBuffer`].
pub trait WriteBufferExt: WriteBuffer {
    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    fn write_u64_le(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    fn write_var_uint(&mut self, v: u64) -> Result<()> {
        let mut buf = [0_u8; MAX_VAR_UINT_LEN];
        let n = v.encode_var(&mut buf);
        self.write_bytes(&buf[..n])
    }

    /// Length prefixed (varint) string.
    fn write_string_binary(&mut self, s: &str) -> Result<()> {
        self.write_var_uint(s.len() as u64)?;
        self.write_bytes(s.as_bytes())
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }
}

impl<W: WriteBuffer + ?Sized> WriteBufferExt for W {}

/// Typed helpers on top of [`ReadBuffer`].
pub trait ReadBufferExt: ReadBuffer {
    fn peek_byte(&self) -> Option<u8> {
        self.peek().first().copied()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0_u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0_u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_var_uint(&mut self) -> Result<u64> {
        let mut buf = [0_u8; MAX_VAR_UINT_LEN];
        for len in 1..=MAX_VAR_UINT_LEN {
            let byte = self.read_u8()?;
            buf[len - 1] = byte;
            if byte & 0x80 == 0 {
                return u64::decode_var(&buf[..len])
                    .map(|(v, _)| v)
                    .ok_or_else(|| Error::corruption("invalid varint"));
            }
        }
        Err(Error::corruption("varint longer than 10 bytes"))
    }

    fn read_string_binary(&mut self) -> Result<String> {
        let len = self.read_var_uint()?;
        if len > MAX_STRING_SIZE {
            return Err(Error::corruption(format!(
                "string of {len} bytes exceeds the maximum of {MAX_STRING_SIZE}"
            )));
        }
        let mut buf = vec![0_u8; len as usize];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::corruption(format!("invalid utf-8: {e}")))
    }

    /// Consume `expected` or fail without consuming anything.
    fn expect_byte(&mut self, expected: u8) -> Result<()> {
        match self.peek_byte() {
            Some(b) if b == expected => self.skip(1),
            Some(b) => Err(Error::corruption(format!(
                "expected '{}', found '{}'",
                expected.escape_ascii(),
                b.escape_ascii()
            ))),
            None => Err(Error::corruption(format!(
                "expected '{}', found end of stream",
                expected.escape_ascii()
            ))),
        }
    }

    /// Consume `word` if the source starts with it.
    fn check_word(&mut self, word: &[u8]) -> Result<bool> {
        if self.peek().starts_with(word) {
            self.skip(word.len())?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl<R: ReadBuffer + ?Sized> ReadBufferExt for R {}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn var_uint_round_trip() {
        let mut buf = Vec::new();
        for v in [0, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            buf.write_var_uint(v).unwrap();
        }

        let mut src = Bytes::from(buf);
        for v in [0, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            assert_eq!(src.read_var_uint().unwrap(), v);
        }
        assert!(src.eof());
    }

    #[test]
    fn truncated_read_is_corruption() {
        let mut src = Bytes::from_static(&[1, 2, 3]);
        let err = src.read_u64_le().unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn bounded_buffer_rejects_overflow() {
        let mut buf = BoundedBuffer::new(4);
        buf.write_bytes(&[1, 2, 3]).unwrap();
        let err = buf.write_bytes(&[4, 5]).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn oversized_string_is_rejected() {
        let mut buf = Vec::new();
        buf.write_var_uint(MAX_STRING_SIZE + 1).unwrap();
        let err = Bytes::from(buf).read_string_binary().unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn expect_byte() {
        let mut src = Bytes::from_static(b"[x");
        src.expect_byte(b'[').unwrap();
        assert!(src.expect_byte(b']').is_err());
        assert_eq!(src.peek_byte(), Some(b'x'));
    }
}
