//! Messages module - the typed message catalog.
//!
//! Every message type pairs one opcode with an exact payload layout:
//! - [`authentication`] - challenge/response and the four J-PAKE rounds
//! - [`status`] - bolus, battery and version status
//! - [`MessageCatalog`] - opcode → descriptor lookup used for parsing
//!
//! Parsed messages are represented by the [`MessageKind`] tagged union;
//! opcodes without a registered type become [`MessageKind::Raw`].
//!
//! # Example
//!
//! ```
//! use tandem_sim::messages::{CurrentBatteryV1Response, MessageCatalog, MessageKind, PumpMessage};
//!
//! let catalog = MessageCatalog::standard();
//! let msg = CurrentBatteryV1Response { battery_abc: 87, battery_ibc: 87 }
//!     .to_message(5)
//!     .unwrap();
//!
//! let parsed = catalog.parse_message(&msg.serialize()).unwrap();
//! assert!(matches!(parsed.kind, MessageKind::CurrentBatteryV1Response(_)));
//! ```

use bytes::Bytes;

use crate::error::{PumpError, Result};
use crate::protocol::Message;

pub mod authentication;
mod catalog;
pub mod status;

pub use authentication::*;
pub use catalog::{MessageCatalog, MessageDescriptor, ParsedMessage};
pub use status::*;

/// A message type with a fixed opcode and payload layout.
pub trait PumpMessage: Sized {
    /// Wire opcode.
    const OPCODE: u8;
    /// Type name used in logs and errors.
    const NAME: &'static str;
    /// Whether this message always carries an auth block.
    const SIGNED: bool = false;

    /// Build the payload bytes.
    fn encode_payload(&self) -> Bytes;

    /// Parse the payload bytes.
    fn decode_payload(payload: &[u8]) -> Result<Self>;

    /// Frame this message with the given transaction id.
    fn to_message(&self, transaction_id: u8) -> Result<Message> {
        Message::from_bytes(Self::OPCODE, transaction_id, self.encode_payload())
    }

    /// Parse the payload of an already-framed message.
    fn from_message(message: &Message) -> Result<Self> {
        Self::decode_payload(message.payload())
    }
}

/// Fail with `InvalidPayloadSize` when a fixed-size record is too short.
///
/// Longer payloads are tolerated; extra bytes are ignored.
pub(crate) fn require_size(message: &'static str, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() < expected {
        return Err(PumpError::InvalidPayloadSize {
            message,
            expected,
            actual: payload.len(),
        });
    }
    if payload.len() > expected {
        tracing::trace!(
            "{} payload has {} trailing bytes",
            message,
            payload.len() - expected
        );
    }
    Ok(())
}

/// Payload for an opcode with no registered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Wire opcode.
    pub opcode: u8,
    /// Undecoded payload.
    pub payload: Bytes,
}

macro_rules! message_kinds {
    ($($variant:ident),+ $(,)?) => {
        /// Any message the pump understands, keyed by opcode.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum MessageKind {
            $($variant($variant),)+
            /// Unregistered opcode.
            Raw(RawMessage),
        }

        impl MessageKind {
            /// Wire opcode.
            pub fn opcode(&self) -> u8 {
                match self {
                    $(MessageKind::$variant(_) => <$variant as PumpMessage>::OPCODE,)+
                    MessageKind::Raw(raw) => raw.opcode,
                }
            }

            /// Type name.
            pub fn name(&self) -> &'static str {
                match self {
                    $(MessageKind::$variant(_) => <$variant as PumpMessage>::NAME,)+
                    MessageKind::Raw(_) => "Raw",
                }
            }

            /// Whether this type always carries an auth block.
            pub fn is_signed(&self) -> bool {
                match self {
                    $(MessageKind::$variant(_) => <$variant as PumpMessage>::SIGNED,)+
                    MessageKind::Raw(_) => false,
                }
            }

            /// Build the payload bytes.
            pub fn encode_payload(&self) -> Bytes {
                match self {
                    $(MessageKind::$variant(m) => m.encode_payload(),)+
                    MessageKind::Raw(raw) => raw.payload.clone(),
                }
            }
        }

        $(
            impl From<$variant> for MessageKind {
                fn from(message: $variant) -> Self {
                    MessageKind::$variant(message)
                }
            }
        )+
    };
}

message_kinds!(
    CentralChallengeRequest,
    CentralChallengeResponse,
    PumpChallengeRequest,
    PumpChallengeResponse,
    Jpake1aRequest,
    Jpake1aResponse,
    Jpake1bRequest,
    Jpake1bResponse,
    Jpake2Request,
    Jpake2Response,
    Jpake3SessionKeyRequest,
    Jpake3SessionKeyResponse,
    Jpake4KeyConfirmationRequest,
    Jpake4KeyConfirmationResponse,
    CurrentBolusStatusRequest,
    CurrentBolusStatusResponse,
    CurrentBatteryV1Request,
    CurrentBatteryV1Response,
    PumpVersionRequest,
    PumpVersionResponse,
);

impl MessageKind {
    /// Frame this message with the given transaction id.
    pub fn to_message(&self, transaction_id: u8) -> Result<Message> {
        Message::from_bytes(self.opcode(), transaction_id, self.encode_payload())
    }
}

impl From<RawMessage> for MessageKind {
    fn from(message: RawMessage) -> Self {
        MessageKind::Raw(message)
    }
}
