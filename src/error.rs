//! Error types for tandem-sim.

use thiserror::Error;

/// Main error type for all pump protocol operations.
#[derive(Debug, Error)]
pub enum PumpError {
    /// Buffer shorter than a structurally required field.
    #[error("Insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A codec read ran past the end of the source slice.
    #[error("Buffer too short: read of {len} bytes at offset {offset}, buffer has {available}")]
    BufferTooShort {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// Fixed-size record received a payload of the wrong size.
    #[error("Invalid payload size for {message}: expected {expected} bytes, got {actual}")]
    InvalidPayloadSize {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Payload does not fit the one-byte length field.
    #[error("Payload of {0} bytes exceeds the 255 byte frame limit")]
    PayloadTooLarge(usize),

    /// CRC16 footer did not match the frame contents.
    #[error("CRC mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch { expected: u16, computed: u16 },

    /// Signed message failed HMAC (or timestamp) validation.
    #[error("HMAC mismatch on signed message (opcode {opcode})")]
    HmacMismatch { opcode: u8 },

    /// A Schnorr proof did not verify.
    #[error("Zero-knowledge proof verification failed: {0}")]
    ZkpVerificationFailed(&'static str),

    /// Curve point or proof encoding is malformed.
    #[error("Invalid EC point encoding: {0}")]
    InvalidPoint(String),

    /// Key confirmation MAC from the peer did not match.
    #[error("Key confirmation failed")]
    KeyConfirmationFailed,

    /// Operation invoked in the wrong handshake state.
    #[error("Protocol sequence error: {operation} not allowed in state {state}")]
    ProtocolSequenceError {
        operation: &'static str,
        state: String,
    },

    /// Pairing code timed out.
    #[error("Pairing code expired")]
    PairingCodeExpired,

    /// Pairing code has no attempts left.
    #[error("Pairing code attempts exhausted")]
    PairingAttemptsExhausted,

    /// No pairing code has been issued.
    #[error("No active pairing code")]
    NoActivePairingCode,

    /// Wrong pairing code entered.
    #[error("Invalid pairing code ({remaining} attempts remaining)")]
    InvalidPairingCode { remaining: u32 },

    /// Opcode registered twice in one catalog.
    #[error("Opcode {0} is already registered")]
    DuplicateOpcode(u8),

    /// No handler for a parsed message.
    #[error("No handler for opcode {0}")]
    NoHandler(u8),

    /// Request requires a paired session.
    #[error("Device {0} is not authenticated")]
    NotAuthenticated(String),

    /// Link closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid simulator configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PumpError {
    /// True for errors that abort a pairing handshake.
    pub fn is_handshake_fatal(&self) -> bool {
        matches!(
            self,
            PumpError::ZkpVerificationFailed(_)
                | PumpError::InvalidPoint(_)
                | PumpError::KeyConfirmationFailed
                | PumpError::ProtocolSequenceError { .. }
        )
    }
}

/// Result type alias using PumpError.
pub type Result<T> = std::result::Result<T, PumpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PumpError::InvalidPayloadSize {
            message: "PumpVersionResponse",
            expected: 48,
            actual: 40,
        };
        assert_eq!(
            err.to_string(),
            "Invalid payload size for PumpVersionResponse: expected 48 bytes, got 40"
        );

        let err = PumpError::CrcMismatch {
            expected: 0x29b1,
            computed: 0x0001,
        };
        assert!(err.to_string().contains("0x29b1"));
    }

    #[test]
    fn test_handshake_fatal_classification() {
        assert!(PumpError::KeyConfirmationFailed.is_handshake_fatal());
        assert!(PumpError::ZkpVerificationFailed("round 1").is_handshake_fatal());
        assert!(!PumpError::PairingCodeExpired.is_handshake_fatal());
        assert!(!PumpError::HmacMismatch { opcode: 1 }.is_handshake_fatal());
    }
}
