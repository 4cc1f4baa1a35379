//! Byte-addressable cursor over an immutable payload buffer.
//!
//! Endianness is not a cursor concern (spec §4.1): callers read raw bytes
//! and fold them into integers themselves via [`Cursor::read_uint`], the
//! same separation idb-rs draws between its byte-level `Read` helpers in
//! `ida_reader.rs` and the endian-aware unpacking built on top of them.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

pub struct Cursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

/// Big- or little-endian byte order, resolved per-field against the
/// schema default (spec §3, §4.3 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    Little,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    fn check(&self, n: usize) -> Result<(), CodecError> {
        if self.offset + n > self.buf.len() {
            Err(CodecError::BufferUnderflow {
                offset: self.offset,
                requested: n,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    /// Advance by `n` bytes, returning the consumed slice.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.check(n)?;
        let out = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    /// Read `n` bytes starting `relative_offset` bytes ahead of the current
    /// position, without advancing.
    pub fn peek(&self, n: usize, relative_offset: usize) -> Result<&'a [u8], CodecError> {
        let start = self.offset + relative_offset;
        let end = start + n;
        if end > self.buf.len() {
            return Err(CodecError::BufferUnderflow {
                offset: start,
                requested: n,
                available: self.buf.len().saturating_sub(start),
            });
        }
        Ok(&self.buf[start..end])
    }

    pub fn advance(&mut self, n: usize) -> Result<(), CodecError> {
        self.check(n)?;
        self.offset += n;
        Ok(())
    }

    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Decode an unsigned integer from `width` bytes read off the cursor,
    /// honoring `order`. Bytes accumulate as `(acc << 8) | b`, taken in
    /// big-endian order or reversed for little-endian (spec §4.1).
    pub fn read_uint(&mut self, width: usize, order: ByteOrder) -> Result<u64, CodecError> {
        let bytes = self.read(width)?;
        Ok(fold_uint(bytes, order))
    }

    /// Decode a signed integer of `width` bytes, sign-extending from the
    /// most significant bit of the read width.
    pub fn read_int(&mut self, width: usize, order: ByteOrder) -> Result<i64, CodecError> {
        let raw = self.read_uint(width, order)?;
        Ok(sign_extend(raw, width))
    }
}

pub fn fold_uint(bytes: &[u8], order: ByteOrder) -> u64 {
    let mut acc: u64 = 0;
    match order {
        ByteOrder::Big => {
            for &b in bytes {
                acc = (acc << 8) | u64::from(b);
            }
        }
        ByteOrder::Little => {
            for &b in bytes.iter().rev() {
                acc = (acc << 8) | u64::from(b);
            }
        }
    }
    acc
}

/// Sign-extend a `width`-byte unsigned value read into a `u64` accumulator.
pub fn sign_extend(raw: u64, width: usize) -> i64 {
    let bits = width * 8;
    if bits >= 64 {
        return raw as i64;
    }
    let sign_bit = 1u64 << (bits - 1);
    if raw & sign_bit != 0 {
        (raw | (!0u64 << bits)) as i64
    } else {
        raw as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_advances_and_detects_underflow() {
        let data = [1u8, 2, 3];
        let mut c = Cursor::new(&data);
        assert_eq!(c.read(2).unwrap(), &[1, 2]);
        assert_eq!(c.remaining(), 1);
        assert!(c.read(2).is_err());
    }

    #[test]
    fn peek_does_not_advance() {
        let data = [1u8, 2, 3, 4];
        let mut c = Cursor::new(&data);
        assert_eq!(c.peek(2, 1).unwrap(), &[2, 3]);
        assert_eq!(c.offset(), 0);
        c.advance(1).unwrap();
        assert_eq!(c.read(1).unwrap(), &[2]);
    }

    #[test]
    fn big_and_little_endian_fold() {
        assert_eq!(fold_uint(&[0x01, 0x02], ByteOrder::Big), 0x0102);
        assert_eq!(fold_uint(&[0x01, 0x02], ByteOrder::Little), 0x0201);
    }

    #[test]
    fn sign_extension_from_narrow_width() {
        // 0xFA as a signed byte is -6.
        assert_eq!(sign_extend(0xFA, 1), -6);
        assert_eq!(sign_extend(0x7F, 1), 127);
        // 0xFFFA as s16 is -6 too.
        assert_eq!(sign_extend(0xFFFA, 2), -6);
    }
}
