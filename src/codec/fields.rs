//! Little-endian integer and fixed-length string fields.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PumpError, Result};

/// Static read/write helpers for little-endian payload fields.
pub struct FieldCodec;

impl FieldCodec {
    /// Borrow `len` bytes at `offset`, or fail with `BufferTooShort`.
    #[inline]
    pub fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| data.get(offset..end))
            .ok_or(PumpError::BufferTooShort {
                offset,
                len,
                available: data.len(),
            })
    }

    /// Read a fixed-size array at `offset`.
    #[inline]
    pub fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(Self::slice(data, offset, N)?);
        Ok(out)
    }

    /// Read a single byte at `offset`.
    #[inline]
    pub fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
        Ok(Self::slice(data, offset, 1)?[0])
    }

    /// Read an unsigned 16-bit little-endian integer.
    #[inline]
    pub fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
        Ok(u16::from_le_bytes(Self::read_array(data, offset)?))
    }

    /// Read a signed 16-bit little-endian integer.
    #[inline]
    pub fn read_i16(data: &[u8], offset: usize) -> Result<i16> {
        Ok(i16::from_le_bytes(Self::read_array(data, offset)?))
    }

    /// Read an unsigned 32-bit little-endian integer.
    #[inline]
    pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
        Ok(u32::from_le_bytes(Self::read_array(data, offset)?))
    }

    /// Read a fixed-length, NUL-padded string.
    ///
    /// Trailing NUL bytes are stripped. Invalid UTF-8 (for example a
    /// multi-byte character cut by the writer) is replaced rather than
    /// rejected.
    pub fn read_string(data: &[u8], offset: usize, len: usize) -> Result<String> {
        let raw = Self::slice(data, offset, len)?;
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Encode a u16 field, masking anything above 16 bits.
    #[inline]
    pub fn write_u16(value: u32) -> [u8; 2] {
        ((value & 0xFFFF) as u16).to_le_bytes()
    }

    /// Encode an i16 field, keeping the low 16 bits of `value`.
    #[inline]
    pub fn write_i16(value: i32) -> [u8; 2] {
        (value as i16).to_le_bytes()
    }

    /// Encode a u32 field, masking anything above 32 bits.
    #[inline]
    pub fn write_u32(value: u64) -> [u8; 4] {
        ((value & 0xFFFF_FFFF) as u32).to_le_bytes()
    }

    /// Encode a fixed-length string field.
    ///
    /// The UTF-8 bytes are truncated to `len` at the byte boundary, then
    /// right-padded with NUL.
    pub fn write_string(value: &str, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let bytes = value.as_bytes();
        let n = bytes.len().min(len);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }
}

/// Append-only payload builder.
///
/// Wraps a `BytesMut` so typed messages can lay out their fields in wire
/// order and freeze the result without an extra copy.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Create a writer sized for a known payload length.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append one byte.
    pub fn u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a little-endian u16.
    pub fn u16(mut self, value: u16) -> Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Append a little-endian i16.
    pub fn i16(mut self, value: i16) -> Self {
        self.buf.put_i16_le(value);
        self
    }

    /// Append a little-endian u32.
    pub fn u32(mut self, value: u32) -> Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Append raw bytes.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.put_slice(value);
        self
    }

    /// Append `count` zero bytes.
    pub fn zeros(mut self, count: usize) -> Self {
        self.buf.put_bytes(0, count);
        self
    }

    /// Append a fixed-length NUL-padded string.
    pub fn string(mut self, value: &str, len: usize) -> Self {
        self.buf.put_slice(&FieldCodec::write_string(value, len));
        self
    }

    /// Current payload length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freeze into an immutable payload.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
