//! Message catalog for parsing frames by opcode.
//!
//! The catalog maps opcodes to descriptors. A descriptor names the message
//! type, says whether it is always signed, and knows how to decode the
//! payload into a [`MessageKind`]. Catalogs are plain values: build one at
//! startup and share it behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use tandem_sim::messages::{MessageCatalog, MessageDescriptor};
//!
//! let mut catalog = MessageCatalog::standard();
//! catalog
//!     .register(MessageDescriptor::raw(0x90, "VendorSignedRequest", true))
//!     .unwrap();
//!
//! assert!(catalog.is_signed(0x90));
//! assert!(catalog.register(MessageDescriptor::raw(0x90, "Again", false)).is_err());
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use super::authentication::*;
use super::status::*;
use super::{MessageKind, PumpMessage, RawMessage};
use crate::error::{PumpError, Result};
use crate::protocol::{Message, SignedOpcodes};

/// Payload decoder for a registered type.
pub type DecodeFn = fn(&[u8]) -> Result<MessageKind>;

fn decode_as<T: PumpMessage + Into<MessageKind>>(payload: &[u8]) -> Result<MessageKind> {
    T::decode_payload(payload).map(Into::into)
}

/// Static description of one opcode.
#[derive(Clone, Copy)]
pub struct MessageDescriptor {
    /// Wire opcode.
    pub opcode: u8,
    /// Type name.
    pub name: &'static str,
    /// Whether frames with this opcode always carry an auth block.
    pub signed: bool,
    /// Typed decoder; `None` keeps the payload raw.
    decode: Option<DecodeFn>,
}

impl MessageDescriptor {
    /// Descriptor for a typed message.
    pub fn of<T: PumpMessage + Into<MessageKind>>() -> Self {
        Self {
            opcode: T::OPCODE,
            name: T::NAME,
            signed: T::SIGNED,
            decode: Some(decode_as::<T>),
        }
    }

    /// Descriptor for an opcode whose payload stays undecoded.
    pub fn raw(opcode: u8, name: &'static str, signed: bool) -> Self {
        Self {
            opcode,
            name,
            signed,
            decode: None,
        }
    }

    /// Decode a payload for this opcode.
    pub fn decode(&self, payload: &[u8]) -> Result<MessageKind> {
        match self.decode {
            Some(decode) => decode(payload),
            None => Ok(MessageKind::Raw(RawMessage {
                opcode: self.opcode,
                payload: Bytes::copy_from_slice(payload),
            })),
        }
    }
}

impl std::fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("signed", &self.signed)
            .finish()
    }
}

/// A frame parsed through the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Framing: header fields, raw payload and auth block.
    pub message: Message,
    /// Typed payload.
    pub kind: MessageKind,
}

/// Registry mapping opcodes to message descriptors.
#[derive(Debug, Default)]
pub struct MessageCatalog {
    descriptors: HashMap<u8, MessageDescriptor>,
}

impl MessageCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Catalog with every built-in message type.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        let descriptors = [
            MessageDescriptor::of::<CentralChallengeRequest>(),
            MessageDescriptor::of::<CentralChallengeResponse>(),
            MessageDescriptor::of::<PumpChallengeRequest>(),
            MessageDescriptor::of::<PumpChallengeResponse>(),
            MessageDescriptor::of::<Jpake1aRequest>(),
            MessageDescriptor::of::<Jpake1aResponse>(),
            MessageDescriptor::of::<Jpake1bRequest>(),
            MessageDescriptor::of::<Jpake1bResponse>(),
            MessageDescriptor::of::<Jpake2Request>(),
            MessageDescriptor::of::<Jpake2Response>(),
            MessageDescriptor::of::<Jpake3SessionKeyRequest>(),
            MessageDescriptor::of::<Jpake3SessionKeyResponse>(),
            MessageDescriptor::of::<Jpake4KeyConfirmationRequest>(),
            MessageDescriptor::of::<Jpake4KeyConfirmationResponse>(),
            MessageDescriptor::of::<CurrentBolusStatusRequest>(),
            MessageDescriptor::of::<CurrentBolusStatusResponse>(),
            MessageDescriptor::of::<CurrentBatteryV1Request>(),
            MessageDescriptor::of::<CurrentBatteryV1Response>(),
            MessageDescriptor::of::<PumpVersionRequest>(),
            MessageDescriptor::of::<PumpVersionResponse>(),
        ];
        for descriptor in descriptors {
            let previous = catalog.descriptors.insert(descriptor.opcode, descriptor);
            debug_assert!(previous.is_none(), "duplicate opcode {}", descriptor.opcode);
        }
        catalog
    }

    /// Register a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateOpcode` if the opcode is already taken.
    pub fn register(&mut self, descriptor: MessageDescriptor) -> Result<()> {
        if self.descriptors.contains_key(&descriptor.opcode) {
            return Err(PumpError::DuplicateOpcode(descriptor.opcode));
        }
        self.descriptors.insert(descriptor.opcode, descriptor);
        Ok(())
    }

    /// Register a typed message.
    pub fn register_type<T: PumpMessage + Into<MessageKind>>(&mut self) -> Result<()> {
        self.register(MessageDescriptor::of::<T>())
    }

    /// Look up a descriptor by opcode.
    pub fn get(&self, opcode: u8) -> Option<&MessageDescriptor> {
        self.descriptors.get(&opcode)
    }

    /// Get the type name for an opcode.
    pub fn name(&self, opcode: u8) -> Option<&'static str> {
        self.get(opcode).map(|d| d.name)
    }

    /// Whether an opcode always carries an auth block.
    pub fn is_signed(&self, opcode: u8) -> bool {
        self.get(opcode).is_some_and(|d| d.signed)
    }

    /// Signed opcode set, for sizing frames in a packetizer.
    pub fn signed_opcodes(&self) -> SignedOpcodes {
        self.descriptors
            .values()
            .filter(|d| d.signed)
            .map(|d| d.opcode)
            .collect()
    }

    /// Registered opcodes in ascending order.
    pub fn opcodes(&self) -> Vec<u8> {
        let mut opcodes: Vec<u8> = self.descriptors.keys().copied().collect();
        opcodes.sort_unstable();
        opcodes
    }

    /// Number of registered opcodes.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Parse a frame (CRC already stripped) into a typed message.
    ///
    /// Unregistered opcodes parse as unsigned [`MessageKind::Raw`].
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` for truncated frames and
    /// `InvalidPayloadSize` for fixed-size payloads that are too short.
    pub fn parse_message(&self, data: &[u8]) -> Result<ParsedMessage> {
        let opcode = *data.first().ok_or(PumpError::InsufficientData {
            needed: 1,
            available: 0,
        })?;

        let descriptor = self.get(opcode);
        let signed = descriptor.is_some_and(|d| d.signed);
        let message = Message::parse(data, signed)?;

        let kind = match descriptor {
            Some(descriptor) => descriptor.decode(message.payload())?,
            None => {
                tracing::debug!("No catalog entry for opcode {}, keeping raw payload", opcode);
                MessageKind::Raw(RawMessage {
                    opcode,
                    payload: message.payload.clone(),
                })
            }
        };

        Ok(ParsedMessage { message, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::strategy::{Union, ValueTree};

    fn key_kp() -> impl Strategy<Value = [u8; KEY_KP_SIZE]> {
        prop::collection::vec(any::<u8>(), KEY_KP_SIZE)
            .prop_map(|v| <[u8; KEY_KP_SIZE]>::try_from(v).expect("vec has KEY_KP_SIZE bytes"))
    }

    fn round2_data() -> impl Strategy<Value = Bytes> {
        prop::collection::vec(any::<u8>(), 0..=253).prop_map(Bytes::from)
    }

    fn revision() -> impl Strategy<Value = String> {
        "[ -~]{0,8}"
    }

    /// One strategy per `MessageKind` variant in the standard catalog.
    fn any_kind() -> impl Strategy<Value = MessageKind> {
        let id = any::<u16>;
        Union::new(vec![
            (id(), any::<[u8; NONCE_SIZE]>())
                .prop_map::<MessageKind, _>(|(app_instance_id, central_challenge)| {
                    CentralChallengeRequest { app_instance_id, central_challenge }.into()
                })
                .boxed(),
            (id(), any::<[u8; CHALLENGE_HASH_SIZE]>(), any::<[u8; NONCE_SIZE]>())
                .prop_map::<MessageKind, _>(|(app_instance_id, central_challenge_hash, hmac_key)| {
                    CentralChallengeResponse { app_instance_id, central_challenge_hash, hmac_key }
                        .into()
                })
                .boxed(),
            (id(), any::<[u8; CHALLENGE_HASH_SIZE]>())
                .prop_map::<MessageKind, _>(|(app_instance_id, pump_challenge_hash)| {
                    PumpChallengeRequest { app_instance_id, pump_challenge_hash }.into()
                })
                .boxed(),
            (id(), any::<bool>())
                .prop_map::<MessageKind, _>(|(app_instance_id, success)| {
                    PumpChallengeResponse { app_instance_id, success }.into()
                })
                .boxed(),
            (id(), key_kp())
                .prop_map::<MessageKind, _>(|(app_instance_id, central_challenge)| {
                    Jpake1aRequest { app_instance_id, central_challenge }.into()
                })
                .boxed(),
            (id(), key_kp())
                .prop_map::<MessageKind, _>(|(app_instance_id, central_challenge_hash)| {
                    Jpake1aResponse { app_instance_id, central_challenge_hash }.into()
                })
                .boxed(),
            (id(), key_kp())
                .prop_map::<MessageKind, _>(|(app_instance_id, central_challenge)| {
                    Jpake1bRequest { app_instance_id, central_challenge }.into()
                })
                .boxed(),
            (id(), key_kp())
                .prop_map::<MessageKind, _>(|(app_instance_id, central_challenge_hash)| {
                    Jpake1bResponse { app_instance_id, central_challenge_hash }.into()
                })
                .boxed(),
            (id(), round2_data())
                .prop_map::<MessageKind, _>(|(app_instance_id, data)| Jpake2Request { app_instance_id, data }.into())
                .boxed(),
            (id(), round2_data())
                .prop_map::<MessageKind, _>(|(app_instance_id, data)| Jpake2Response { app_instance_id, data }.into())
                .boxed(),
            id()
                .prop_map::<MessageKind, _>(|challenge_param| {
                    Jpake3SessionKeyRequest { challenge_param }.into()
                })
                .boxed(),
            (id(), any::<[u8; NONCE_SIZE]>(), any::<[u8; NONCE_SIZE]>())
                .prop_map::<MessageKind, _>(|(app_instance_id, device_key_nonce, device_key_reserved)| {
                    Jpake3SessionKeyResponse {
                        app_instance_id,
                        device_key_nonce,
                        device_key_reserved,
                    }
                    .into()
                })
                .boxed(),
            (
                id(),
                any::<[u8; NONCE_SIZE]>(),
                any::<[u8; NONCE_SIZE]>(),
                any::<[u8; DIGEST_SIZE]>(),
            )
                .prop_map::<MessageKind, _>(|(app_instance_id, nonce, reserved, hash_digest)| {
                    Jpake4KeyConfirmationRequest { app_instance_id, nonce, reserved, hash_digest }
                        .into()
                })
                .boxed(),
            (
                id(),
                any::<[u8; NONCE_SIZE]>(),
                any::<[u8; NONCE_SIZE]>(),
                any::<[u8; DIGEST_SIZE]>(),
            )
                .prop_map::<MessageKind, _>(|(app_instance_id, nonce, reserved, hash_digest)| {
                    Jpake4KeyConfirmationResponse { app_instance_id, nonce, reserved, hash_digest }
                        .into()
                })
                .boxed(),
            Just(MessageKind::from(CurrentBolusStatusRequest)).boxed(),
            (
                any::<u8>(),
                any::<u16>(),
                any::<u32>(),
                any::<u32>(),
                any::<u8>(),
                any::<u8>(),
            )
                .prop_map::<MessageKind, _>(|(status_id, bolus_id, timestamp, requested_volume, source, kind)| {
                    CurrentBolusStatusResponse {
                        status_id,
                        bolus_id,
                        timestamp,
                        requested_volume,
                        bolus_source_id: source,
                        bolus_type_bitmask: kind,
                    }
                    .into()
                })
                .boxed(),
            Just(MessageKind::from(CurrentBatteryV1Request)).boxed(),
            (any::<u8>(), any::<u8>())
                .prop_map::<MessageKind, _>(|(battery_abc, battery_ibc)| {
                    CurrentBatteryV1Response { battery_abc, battery_ibc }.into()
                })
                .boxed(),
            Just(MessageKind::from(PumpVersionRequest)).boxed(),
            (
                prop::array::uniform6(any::<u32>()),
                revision(),
                any::<u32>(),
                revision(),
                any::<u32>(),
            )
                .prop_map::<MessageKind, _>(|(words, pump_rev, pcba_sn, pcba_rev, model_num)| {
                    PumpVersionResponse {
                        arm_sw_ver: words[0],
                        msp_sw_ver: words[1],
                        config_a_bits: words[2],
                        config_b_bits: words[3],
                        serial_num: words[4],
                        part_num: words[5],
                        pump_rev,
                        pcba_sn,
                        pcba_rev,
                        model_num,
                    }
                    .into()
                })
                .boxed(),
        ])
    }

    proptest! {
        #[test]
        fn test_every_type_round_trips(kind in any_kind(), tx in any::<u8>()) {
            let catalog = MessageCatalog::standard();
            let message = kind.to_message(tx).unwrap();

            let parsed = catalog.parse_message(&message.serialize()).unwrap();

            prop_assert_eq!(parsed.message.transaction_id, tx);
            prop_assert_eq!(&parsed.message, &message);
            prop_assert_eq!(parsed.kind, kind);
        }
    }

    #[test]
    fn test_strategies_cover_the_catalog() {
        let catalog = MessageCatalog::standard();
        let mut runner = proptest::test_runner::TestRunner::deterministic();
        let strategy = any_kind();

        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..2_000 {
            let kind = strategy.new_tree(&mut runner).unwrap().current();
            seen.insert(kind.opcode());
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), catalog.opcodes());
    }

    #[test]
    fn test_standard_catalog_opcodes() {
        let catalog = MessageCatalog::standard();

        assert_eq!(
            catalog.opcodes(),
            vec![16, 17, 18, 19, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 44, 45, 52, 53, 84, 85]
        );
        assert_eq!(catalog.name(38), Some("Jpake3SessionKeyRequest"));
        assert_eq!(catalog.name(39), Some("Jpake3SessionKeyResponse"));
        assert_eq!(catalog.signed_opcodes(), SignedOpcodes::none());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut catalog = MessageCatalog::standard();

        let err = catalog.register_type::<PumpVersionRequest>().unwrap_err();
        assert!(matches!(err, PumpError::DuplicateOpcode(84)));

        let mut empty = MessageCatalog::new();
        assert!(empty.is_empty());
        empty.register_type::<PumpVersionRequest>().unwrap();
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_parse_typed_message() {
        let catalog = MessageCatalog::standard();
        let msg = CurrentBatteryV1Response {
            battery_abc: 99,
            battery_ibc: 98,
        }
        .to_message(12)
        .unwrap();

        let parsed = catalog.parse_message(&msg.serialize()).unwrap();

        assert_eq!(parsed.message, msg);
        assert_eq!(
            parsed.kind,
            MessageKind::CurrentBatteryV1Response(CurrentBatteryV1Response {
                battery_abc: 99,
                battery_ibc: 98
            })
        );
        assert_eq!(parsed.kind.name(), "CurrentBatteryV1Response");
    }

    #[test]
    fn test_unknown_opcode_falls_back_to_raw() {
        let catalog = MessageCatalog::standard();

        let parsed = catalog.parse_message(&[0xC8, 1, 2, 0xAB, 0xCD]).unwrap();

        assert_eq!(parsed.kind.opcode(), 0xC8);
        assert!(matches!(
            &parsed.kind,
            MessageKind::Raw(raw) if &raw.payload[..] == [0xAB, 0xCD]
        ));
    }

    #[test]
    fn test_signed_descriptor_captures_auth_block() {
        let mut catalog = MessageCatalog::new();
        catalog
            .register(MessageDescriptor::raw(0x90, "SignedProbe", true))
            .unwrap();
        assert!(catalog.signed_opcodes().contains(0x90));

        let key = [3u8; 32];
        let msg = Message::new(0x90, 1, &[5]).unwrap().sign(&key, Some(10));

        let parsed = catalog.parse_message(&msg.serialize()).unwrap();
        assert!(parsed.message.is_signed());
        assert!(parsed.message.verify_signature(&key, None).0);

        // Same bytes without the auth block are rejected, not misread.
        assert!(catalog.parse_message(&[0x90, 1, 1, 5]).is_err());
    }

    #[test]
    fn test_parse_wrong_size_fixed_record() {
        let catalog = MessageCatalog::standard();
        let mut data = vec![85, 0, 40];
        data.extend_from_slice(&[0; 40]);

        let err = catalog.parse_message(&data).unwrap_err();
        assert!(matches!(err, PumpError::InvalidPayloadSize { expected: 48, .. }));
    }

    #[test]
    fn test_parse_empty_input() {
        let catalog = MessageCatalog::standard();
        assert!(matches!(
            catalog.parse_message(&[]),
            Err(PumpError::InsufficientData { .. })
        ));
    }
}
