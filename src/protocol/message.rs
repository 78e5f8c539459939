//! Message struct with typed accessors.
//!
//! Represents one framed pump message: header fields, payload and the
//! optional auth block. Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use tandem_sim::protocol::Message;
//!
//! let msg = Message::new(0x2C, 3, &[]).unwrap();
//! let wire = msg.serialize();
//! assert_eq!(wire, vec![0x2C, 3, 0]);
//!
//! let parsed = Message::parse(&wire, false).unwrap();
//! assert_eq!(parsed, msg);
//! ```

use bytes::Bytes;

use super::crc;
use super::signing;
use super::wire_format::{MessageHeader, AUTH_BLOCK_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{PumpError, Result};

/// A complete pump message, without its CRC footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type.
    pub opcode: u8,
    /// Transaction identifier.
    pub transaction_id: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
    /// Trailing auth block, present on signed messages.
    pub auth_block: Option<[u8; AUTH_BLOCK_SIZE]>,
}

impl Message {
    /// Create an unsigned message.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if the payload exceeds 255 bytes.
    pub fn new(opcode: u8, transaction_id: u8, payload: &[u8]) -> Result<Self> {
        Self::from_bytes(opcode, transaction_id, Bytes::copy_from_slice(payload))
    }

    /// Create an unsigned message from an owned payload (no copy).
    pub fn from_bytes(opcode: u8, transaction_id: u8, payload: Bytes) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PumpError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            opcode,
            transaction_id,
            payload,
            auth_block: None,
        })
    }

    /// Parse a message from its wire form (CRC already stripped).
    ///
    /// `signed` says whether this opcode always carries an auth block; it is
    /// a property of the message type, never inferred from trailing length.
    /// Bytes beyond the expected end are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if the header, payload or auth block is cut short.
    pub fn parse(data: &[u8], signed: bool) -> Result<Self> {
        let header = MessageHeader::decode(data)?;
        let payload_end = HEADER_SIZE + header.payload_length as usize;
        let needed = if signed {
            payload_end + AUTH_BLOCK_SIZE
        } else {
            payload_end
        };

        if data.len() < needed {
            return Err(PumpError::InsufficientData {
                needed,
                available: data.len(),
            });
        }

        let auth_block = if signed {
            let mut block = [0u8; AUTH_BLOCK_SIZE];
            block.copy_from_slice(&data[payload_end..needed]);
            Some(block)
        } else {
            None
        };

        Ok(Self {
            opcode: header.opcode,
            transaction_id: header.transaction_id,
            payload: Bytes::copy_from_slice(&data[HEADER_SIZE..payload_end]),
            auth_block,
        })
    }

    /// Derived header for this message.
    #[inline]
    pub fn header(&self) -> MessageHeader {
        // Length checked at construction.
        MessageHeader::new(self.opcode, self.transaction_id, self.payload.len() as u8)
    }

    /// Header and payload bytes: the material covered by the auth block.
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header().encode());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Serialize to wire form without CRC.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.signed_portion();
        if let Some(block) = &self.auth_block {
            out.extend_from_slice(block);
        }
        out
    }

    /// Serialize and append the CRC16 footer.
    pub fn to_wire(&self) -> Vec<u8> {
        crc::append(&self.serialize())
    }

    /// Attach an auth block computed with `key`.
    pub fn sign(mut self, key: &[u8], timestamp: Option<u32>) -> Self {
        self.auth_block = Some(signing::create(key, &self.signed_portion(), timestamp));
        self
    }

    /// Validate the auth block with `key`.
    ///
    /// Returns `(false, 0)` for unsigned messages.
    pub fn verify_signature(&self, key: &[u8], max_time_diff: Option<u32>) -> (bool, u32) {
        match &self.auth_block {
            Some(block) => signing::validate(key, &self.signed_portion(), block, max_time_diff),
            None => (false, 0),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Check if this message carries an auth block.
    #[inline]
    pub fn is_signed(&self) -> bool {
        self.auth_block.is_some()
    }

    /// Even opcode (request by convention).
    #[inline]
    pub fn is_request(&self) -> bool {
        self.header().is_request()
    }

    /// Odd opcode (response by convention).
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header().is_response()
    }
}
