//! Protocol module - wire format, integrity and chunking.
//!
//! This module implements the binary framing of pump messages:
//! - 3-byte header encoding/decoding
//! - Message struct with optional auth block
//! - CRC16 footer and HMAC-SHA1 signing
//! - Packetizer for transport-sized chunks

pub mod crc;
mod message;
mod packetizer;
pub mod signing;
mod wire_format;

pub use message::Message;
pub use packetizer::{Packetizer, SignedOpcodes};
pub use wire_format::{
    next_transaction_id, MessageHeader, AUTH_BLOCK_SIZE, CONTROL_CHUNK_SIZE, CRC_SIZE,
    DEFAULT_CHUNK_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
