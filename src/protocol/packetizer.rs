//! Packetizer for splitting and reassembling transport chunks.
//!
//! Uses `bytes::BytesMut` for the reassembly buffer.
//! Implements a state machine for fragmented messages:
//! - `WaitingForHeader`: Need at least 3 bytes
//! - `WaitingForBody`: Expected frame length known, need the rest
//!
//! Chunks carry no framing of their own; message boundaries come from the
//! payload length byte in the header. One instance serves one ordered byte
//! stream (one characteristic).
//!
//! # Example
//!
//! ```
//! use tandem_sim::protocol::{crc, Message, Packetizer};
//!
//! let wire = crc::append(&Message::new(0x35, 1, &[80, 80]).unwrap().serialize());
//!
//! let sender = Packetizer::new(4);
//! let mut receiver = Packetizer::new(4);
//!
//! let mut complete = None;
//! for chunk in sender.chunk_message(&wire) {
//!     complete = receiver.add_chunk(&chunk).unwrap();
//! }
//! assert_eq!(&complete.unwrap()[..], &[0x35, 1, 2, 80, 80]);
//! ```

use bytes::{Bytes, BytesMut};

use super::crc;
use super::wire_format::{
    MessageHeader, CONTROL_CHUNK_SIZE, CRC_SIZE, DEFAULT_CHUNK_SIZE, HEADER_SIZE,
};
use crate::error::{PumpError, Result};

/// Set of opcodes that always carry an auth block.
///
/// The packetizer needs this to size signed frames correctly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignedOpcodes([u64; 4]);

impl SignedOpcodes {
    /// Empty set: every frame is `3 + payload_length + 2` bytes.
    pub const fn none() -> Self {
        Self([0; 4])
    }

    /// Mark `opcode` as signed.
    pub fn insert(&mut self, opcode: u8) {
        self.0[(opcode >> 6) as usize] |= 1 << (opcode & 63);
    }

    /// Check whether `opcode` is signed.
    #[inline]
    pub fn contains(&self, opcode: u8) -> bool {
        self.0[(opcode >> 6) as usize] & (1 << (opcode & 63)) != 0
    }
}

impl FromIterator<u8> for SignedOpcodes {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = Self::none();
        for opcode in iter {
            set.insert(opcode);
        }
        set
    }
}

/// State machine for reassembly.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 3-byte header.
    WaitingForHeader,
    /// Header seen; frame is `expected_total` bytes including CRC.
    WaitingForBody { expected_total: usize },
}

/// Splits outbound frames into chunks and reassembles inbound ones.
pub struct Packetizer {
    /// Accumulated inbound bytes.
    buffer: BytesMut,
    /// Current reassembly state.
    state: State,
    /// Transport chunk size.
    chunk_size: usize,
    /// Opcodes whose frames include an auth block.
    signed: SignedOpcodes,
}

impl Packetizer {
    /// Create a packetizer with the given chunk size (minimum 1).
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(512),
            state: State::WaitingForHeader,
            chunk_size: chunk_size.max(1),
            signed: SignedOpcodes::none(),
        }
    }

    /// Packetizer for the default characteristics (18-byte chunks).
    pub fn default_size() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }

    /// Packetizer for the control characteristic (40-byte chunks).
    pub fn control() -> Self {
        Self::new(CONTROL_CHUNK_SIZE)
    }

    /// Size signed opcodes with their auth block.
    pub fn with_signed_opcodes(mut self, signed: SignedOpcodes) -> Self {
        self.signed = signed;
        self
    }

    /// Configured chunk size.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split a complete frame (CRC included) into transport chunks.
    ///
    /// The last chunk may be shorter. Each chunk is a zero-copy slice of
    /// one shared buffer.
    pub fn chunk_message(&self, data: &[u8]) -> Vec<Bytes> {
        let whole = Bytes::copy_from_slice(data);
        (0..whole.len())
            .step_by(self.chunk_size)
            .map(|start| whole.slice(start..(start + self.chunk_size).min(whole.len())))
            .collect()
    }

    /// Append a chunk and try to complete a message.
    ///
    /// Returns the message without its CRC once the full frame has arrived,
    /// `None` while it is still incomplete.
    ///
    /// # Errors
    ///
    /// Returns `CrcMismatch` if the completed frame fails its checksum. Only
    /// that frame's bytes are dropped; anything after it stays buffered.
    pub fn add_chunk(&mut self, chunk: &[u8]) -> Result<Option<Bytes>> {
        self.buffer.extend_from_slice(chunk);
        self.next_message()
    }

    /// Try to extract one more message from already-buffered bytes.
    ///
    /// Useful when a single chunk carried the tail of one message and the
    /// whole of another.
    pub fn next_message(&mut self) -> Result<Option<Bytes>> {
        let expected_total = match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = MessageHeader::decode(&self.buffer[..HEADER_SIZE])?;
                let expected_total = header.frame_len(self.signed.contains(header.opcode));
                self.state = State::WaitingForBody { expected_total };
                expected_total
            }
            State::WaitingForBody { expected_total } => expected_total,
        };

        if self.buffer.len() < expected_total {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(expected_total);
        self.state = State::WaitingForHeader;

        let (valid, body) = crc::verify_and_strip(&frame);
        if !valid {
            let computed = crc::calculate(body);
            let expected = u16::from_le_bytes([frame[expected_total - 2], frame[expected_total - 1]]);
            tracing::warn!(
                "CRC mismatch on {} byte frame (opcode {}), {} bytes still buffered",
                expected_total,
                frame[0],
                self.buffer.len()
            );
            return Err(PumpError::CrcMismatch { expected, computed });
        }

        frame.truncate(expected_total - CRC_SIZE);
        Ok(Some(frame.freeze()))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::default_size()
    }
}
