//! Wire format encoding and decoding.
//!
//! Every pump message on the wire has the layout:
//! ```text
//! ┌────────┬───────┬────────┬───────────────┬──────────────┬────────┐
//! │ Opcode │ TxID  │ PayLen │ Payload       │ [Auth block] │ CRC16  │
//! │ 1 byte │ 1 byte│ 1 byte │ PayLen bytes  │ 24 bytes     │ 2 bytes│
//! └────────┴───────┴────────┴───────────────┴──────────────┴────────┘
//! ```
//!
//! The auth block is present only for opcodes whose descriptor is marked
//! signed. All multi-byte integers are Little Endian.

use crate::error::{PumpError, Result};

/// Header size in bytes (fixed, exactly 3).
pub const HEADER_SIZE: usize = 3;

/// Maximum payload size (one-byte length field).
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Auth block size: 4-byte timestamp + 20-byte HMAC-SHA1.
pub const AUTH_BLOCK_SIZE: usize = 24;

/// CRC16 footer size.
pub const CRC_SIZE: usize = 2;

/// Chunk size for the default characteristics (minimal BLE MTU).
pub const DEFAULT_CHUNK_SIZE: usize = 18;

/// Chunk size for the control characteristic.
pub const CONTROL_CHUNK_SIZE: usize = 40;

/// Decoded 3-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type.
    pub opcode: u8,
    /// Transaction identifier (wraps modulo 256).
    pub transaction_id: u8,
    /// Payload length in bytes.
    pub payload_length: u8,
}

impl MessageHeader {
    /// Create a new header.
    pub fn new(opcode: u8, transaction_id: u8, payload_length: u8) -> Self {
        Self {
            opcode,
            transaction_id,
            payload_length,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use tandem_sim::protocol::MessageHeader;
    ///
    /// let header = MessageHeader::new(0x2C, 7, 0);
    /// assert_eq!(header.encode(), [0x2C, 7, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        [self.opcode, self.transaction_id, self.payload_length]
    }

    /// Decode header from the first three bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if fewer than 3 bytes are available.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(PumpError::InsufficientData {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }
        Ok(Self::new(buf[0], buf[1], buf[2]))
    }

    /// Bytes occupied on the wire, CRC included.
    #[inline]
    pub fn frame_len(&self, signed: bool) -> usize {
        let auth = if signed { AUTH_BLOCK_SIZE } else { 0 };
        HEADER_SIZE + self.payload_length as usize + auth + CRC_SIZE
    }

    /// Even opcodes are requests by convention.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.opcode % 2 == 0
    }

    /// Odd opcodes are responses by convention.
    #[inline]
    pub fn is_response(&self) -> bool {
        !self.is_request()
    }
}

/// Next transaction id, wrapping modulo 256.
#[inline]
pub fn next_transaction_id(current: u8) -> u8 {
    current.wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = MessageHeader::new(0x55, 200, 48);
        let decoded = MessageHeader::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_size_is_exactly_3() {
        assert_eq!(HEADER_SIZE, 3);
        assert_eq!(MessageHeader::new(1, 2, 3).encode().len(), 3);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let err = MessageHeader::decode(&[0x10, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            PumpError::InsufficientData {
                needed: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let header = MessageHeader::decode(&[0x2C, 9, 0, 0xAA, 0xBB]).unwrap();
        assert_eq!(header.opcode, 0x2C);
        assert_eq!(header.transaction_id, 9);
        assert_eq!(header.payload_length, 0);
    }

    #[test]
    fn test_frame_len() {
        let header = MessageHeader::new(0x35, 0, 2);
        assert_eq!(header.frame_len(false), 3 + 2 + 2);
        assert_eq!(header.frame_len(true), 3 + 2 + 24 + 2);
    }

    #[test]
    fn test_request_response_parity() {
        assert!(MessageHeader::new(0x2C, 0, 0).is_request());
        assert!(MessageHeader::new(0x2D, 0, 0).is_response());
        assert!(MessageHeader::new(38, 0, 0).is_request());
    }

    #[test]
    fn test_transaction_id_wraps() {
        assert_eq!(next_transaction_id(0), 1);
        assert_eq!(next_transaction_id(255), 0);
    }
}
