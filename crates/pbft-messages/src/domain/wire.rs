//! # Wire Codec Helpers
//!
//! Little-endian, unpadded field encoding. Every read is bounds-checked
//! against the remaining buffer before any bytes are interpreted.

use super::errors::{MessageError, MessageResult};

/// Append-only encoder.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Forward-only decoder over a borrowed buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes, failing with `Truncated` if fewer remain.
    pub fn take(&mut self, field: &'static str, n: usize) -> MessageResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(MessageError::Truncated {
                field,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub fn array<const N: usize>(&mut self, field: &'static str) -> MessageResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub fn i64(&mut self, field: &'static str) -> MessageResult<i64> {
        Ok(i64::from_le_bytes(self.array(field)?))
    }

    pub fn u64(&mut self, field: &'static str) -> MessageResult<u64> {
        Ok(u64::from_le_bytes(self.array(field)?))
    }

    pub fn i32(&mut self, field: &'static str) -> MessageResult<i32> {
        Ok(i32::from_le_bytes(self.array(field)?))
    }

    pub fn u32(&mut self, field: &'static str) -> MessageResult<u32> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }

    pub fn i16(&mut self, field: &'static str) -> MessageResult<i16> {
        Ok(i16::from_le_bytes(self.array(field)?))
    }

    pub fn u8(&mut self, field: &'static str) -> MessageResult<u8> {
        Ok(self.array::<1>(field)?[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_layout_offsets() {
        let mut w = WireWriter::default();
        w.put_i64(-1).put_i32(7).put_u8(1);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 13);
        assert_eq!(&bytes[8..12], &7i32.to_le_bytes());

        let mut r = WireReader::new(&bytes);
        assert_eq!(r.i64("view").unwrap(), -1);
        assert_eq!(r.i32("id").unwrap(), 7);
        assert_eq!(r.u8("flag").unwrap(), 1);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_reports_field() {
        let bytes = [0u8; 5];
        let mut r = WireReader::new(&bytes);
        assert_eq!(
            r.i64("seqno"),
            Err(MessageError::Truncated {
                field: "seqno",
                needed: 8,
                available: 5
            })
        );
        // A failed read consumes nothing
        assert_eq!(r.remaining(), 5);
    }

    #[test]
    fn test_rest_consumes_everything() {
        let bytes = [1u8, 2, 3, 4];
        let mut r = WireReader::new(&bytes);
        r.take("head", 1).unwrap();
        assert_eq!(r.rest(), &[2, 3, 4]);
        assert_eq!(r.remaining(), 0);
    }
}
