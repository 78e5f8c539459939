//! Authentication messages.
//!
//! Challenge/response pair (16–19) followed by the J-PAKE rounds (32–41).
//! All `app_instance_id` fields are u16 LE at offset 0.
//!
//! ```text
//! 16 CentralChallengeRequest      id(2) challenge(8)
//! 17 CentralChallengeResponse     id(2) hash(20) hmac_key(8)
//! 18 PumpChallengeRequest         id(2) hash(20)
//! 19 PumpChallengeResponse        id(2) success(1)
//! 32-35 Jpake1a/1b Req/Resp       id(2) ECJPAKEKeyKP(165)
//! 36/37 Jpake2 Req/Resp           id(2) data(variable)
//! 38 Jpake3SessionKeyRequest      challenge_param(2)
//! 39 Jpake3SessionKeyResponse     id(2) nonce(8) reserved(8)
//! 40/41 Jpake4 Req/Resp           id(2) nonce(8) reserved(8) digest(32)
//! ```

use bytes::Bytes;

use super::{require_size, PumpMessage};
use crate::codec::{FieldCodec, PayloadWriter};
use crate::error::Result;

/// Encoded ECJPAKEKeyKP size: X(65) + V(65) + len(1) + r(34).
pub const KEY_KP_SIZE: usize = 165;

/// SHA-1 sized challenge hash.
pub const CHALLENGE_HASH_SIZE: usize = 20;

/// Central challenge / HMAC key / nonce size.
pub const NONCE_SIZE: usize = 8;

/// SHA-256 sized confirmation digest.
pub const DIGEST_SIZE: usize = 32;

/// App opens the legacy challenge exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralChallengeRequest {
    pub app_instance_id: u16,
    pub central_challenge: [u8; NONCE_SIZE],
}

impl PumpMessage for CentralChallengeRequest {
    const OPCODE: u8 = 16;
    const NAME: &'static str = "CentralChallengeRequest";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(10)
            .u16(self.app_instance_id)
            .bytes(&self.central_challenge)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 10)?;
        Ok(Self {
            app_instance_id: FieldCodec::read_u16(payload, 0)?,
            central_challenge: FieldCodec::read_array(payload, 2)?,
        })
    }
}

/// Pump answers the central challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralChallengeResponse {
    pub app_instance_id: u16,
    pub central_challenge_hash: [u8; CHALLENGE_HASH_SIZE],
    pub hmac_key: [u8; NONCE_SIZE],
}

impl PumpMessage for CentralChallengeResponse {
    const OPCODE: u8 = 17;
    const NAME: &'static str = "CentralChallengeResponse";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(30)
            .u16(self.app_instance_id)
            .bytes(&self.central_challenge_hash)
            .bytes(&self.hmac_key)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 30)?;
        Ok(Self {
            app_instance_id: FieldCodec::read_u16(payload, 0)?,
            central_challenge_hash: FieldCodec::read_array(payload, 2)?,
            hmac_key: FieldCodec::read_array(payload, 22)?,
        })
    }
}

/// App proves knowledge of the pairing code over the pump's HMAC key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpChallengeRequest {
    pub app_instance_id: u16,
    pub pump_challenge_hash: [u8; CHALLENGE_HASH_SIZE],
}

impl PumpMessage for PumpChallengeRequest {
    const OPCODE: u8 = 18;
    const NAME: &'static str = "PumpChallengeRequest";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(22)
            .u16(self.app_instance_id)
            .bytes(&self.pump_challenge_hash)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 22)?;
        Ok(Self {
            app_instance_id: FieldCodec::read_u16(payload, 0)?,
            pump_challenge_hash: FieldCodec::read_array(payload, 2)?,
        })
    }
}

/// Result of the pump challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpChallengeResponse {
    pub app_instance_id: u16,
    pub success: bool,
}

impl PumpMessage for PumpChallengeResponse {
    const OPCODE: u8 = 19;
    const NAME: &'static str = "PumpChallengeResponse";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(3)
            .u16(self.app_instance_id)
            .u8(self.success as u8)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 3)?;
        Ok(Self {
            app_instance_id: FieldCodec::read_u16(payload, 0)?,
            success: FieldCodec::read_u8(payload, 2)? != 0,
        })
    }
}

/// Defines a round-1 message: app_instance_id followed by one ECJPAKEKeyKP.
macro_rules! key_kp_message {
    ($(#[$doc:meta])* $name:ident, $opcode:expr, $field:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub app_instance_id: u16,
            pub $field: [u8; KEY_KP_SIZE],
        }

        impl PumpMessage for $name {
            const OPCODE: u8 = $opcode;
            const NAME: &'static str = stringify!($name);

            fn encode_payload(&self) -> Bytes {
                PayloadWriter::with_capacity(2 + KEY_KP_SIZE)
                    .u16(self.app_instance_id)
                    .bytes(&self.$field)
                    .finish()
            }

            fn decode_payload(payload: &[u8]) -> Result<Self> {
                require_size(Self::NAME, payload, 2 + KEY_KP_SIZE)?;
                Ok(Self {
                    app_instance_id: FieldCodec::read_u16(payload, 0)?,
                    $field: FieldCodec::read_array(payload, 2)?,
                })
            }
        }
    };
}

key_kp_message!(
    /// Pump's first round-1 point (G1).
    Jpake1aRequest, 32, central_challenge
);
key_kp_message!(
    /// App's first round-1 point (G3).
    Jpake1aResponse, 33, central_challenge_hash
);
key_kp_message!(
    /// App's second round-1 point (G4).
    Jpake1bRequest, 34, central_challenge
);
key_kp_message!(
    /// Pump's second round-1 point (G2).
    Jpake1bResponse, 35, central_challenge_hash
);

/// Defines a round-2 message: app_instance_id followed by variable data.
macro_rules! round2_message {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub app_instance_id: u16,
            /// ECJPAKEKeyKP, optionally prefixed with 3 bytes of ECParameters.
            pub data: Bytes,
        }

        impl PumpMessage for $name {
            const OPCODE: u8 = $opcode;
            const NAME: &'static str = stringify!($name);

            fn encode_payload(&self) -> Bytes {
                PayloadWriter::with_capacity(2 + self.data.len())
                    .u16(self.app_instance_id)
                    .bytes(&self.data)
                    .finish()
            }

            fn decode_payload(payload: &[u8]) -> Result<Self> {
                require_size(Self::NAME, payload, 2)?;
                Ok(Self {
                    app_instance_id: FieldCodec::read_u16(payload, 0)?,
                    data: Bytes::copy_from_slice(&payload[2..]),
                })
            }
        }
    };
}

round2_message!(
    /// Pump's round-2 value (A).
    Jpake2Request, 36
);
round2_message!(
    /// App's round-2 value (B).
    Jpake2Response, 37
);

/// App asks the pump to derive the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jpake3SessionKeyRequest {
    pub challenge_param: u16,
}

impl PumpMessage for Jpake3SessionKeyRequest {
    const OPCODE: u8 = 38;
    const NAME: &'static str = "Jpake3SessionKeyRequest";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(2)
            .u16(self.challenge_param)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 2)?;
        Ok(Self {
            challenge_param: FieldCodec::read_u16(payload, 0)?,
        })
    }
}

/// Pump's key-derivation nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jpake3SessionKeyResponse {
    pub app_instance_id: u16,
    pub device_key_nonce: [u8; NONCE_SIZE],
    pub device_key_reserved: [u8; NONCE_SIZE],
}

impl PumpMessage for Jpake3SessionKeyResponse {
    const OPCODE: u8 = 39;
    const NAME: &'static str = "Jpake3SessionKeyResponse";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(18)
            .u16(self.app_instance_id)
            .bytes(&self.device_key_nonce)
            .bytes(&self.device_key_reserved)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 18)?;
        Ok(Self {
            app_instance_id: FieldCodec::read_u16(payload, 0)?,
            device_key_nonce: FieldCodec::read_array(payload, 2)?,
            device_key_reserved: FieldCodec::read_array(payload, 10)?,
        })
    }
}

/// Defines a key confirmation message: id, nonce, reserved, HMAC digest.
macro_rules! confirmation_message {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub app_instance_id: u16,
            pub nonce: [u8; NONCE_SIZE],
            pub reserved: [u8; NONCE_SIZE],
            pub hash_digest: [u8; DIGEST_SIZE],
        }

        impl PumpMessage for $name {
            const OPCODE: u8 = $opcode;
            const NAME: &'static str = stringify!($name);

            fn encode_payload(&self) -> Bytes {
                PayloadWriter::with_capacity(50)
                    .u16(self.app_instance_id)
                    .bytes(&self.nonce)
                    .bytes(&self.reserved)
                    .bytes(&self.hash_digest)
                    .finish()
            }

            fn decode_payload(payload: &[u8]) -> Result<Self> {
                require_size(Self::NAME, payload, 50)?;
                Ok(Self {
                    app_instance_id: FieldCodec::read_u16(payload, 0)?,
                    nonce: FieldCodec::read_array(payload, 2)?,
                    reserved: FieldCodec::read_array(payload, 10)?,
                    hash_digest: FieldCodec::read_array(payload, 18)?,
                })
            }
        }
    };
}

confirmation_message!(
    /// Pump's key confirmation.
    Jpake4KeyConfirmationRequest, 40
);
confirmation_message!(
    /// App's key confirmation.
    Jpake4KeyConfirmationResponse, 41
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PumpError;

    #[test]
    fn test_central_challenge_layout() {
        let req = CentralChallengeRequest {
            app_instance_id: 0x0102,
            central_challenge: [9; 8],
        };
        let payload = req.encode_payload();

        assert_eq!(payload.len(), 10);
        assert_eq!(&payload[..2], &[0x02, 0x01]);
        assert_eq!(CentralChallengeRequest::decode_payload(&payload).unwrap(), req);
    }

    #[test]
    fn test_central_challenge_response_offsets() {
        let resp = CentralChallengeResponse {
            app_instance_id: 1,
            central_challenge_hash: [0xAA; 20],
            hmac_key: [0xBB; 8],
        };
        let payload = resp.encode_payload();

        assert_eq!(payload.len(), 30);
        assert_eq!(payload[2], 0xAA);
        assert_eq!(payload[21], 0xAA);
        assert_eq!(payload[22], 0xBB);
        assert_eq!(CentralChallengeResponse::decode_payload(&payload).unwrap(), resp);
    }

    #[test]
    fn test_pump_challenge_response_success_byte() {
        let payload = PumpChallengeResponse {
            app_instance_id: 0,
            success: true,
        }
        .encode_payload();
        assert_eq!(&payload[..], &[0, 0, 1]);

        let decoded = PumpChallengeResponse::decode_payload(&[0, 0, 0]).unwrap();
        assert!(!decoded.success);
    }

    #[test]
    fn test_key_kp_message_size() {
        let req = Jpake1aRequest {
            app_instance_id: 7,
            central_challenge: [0x04; KEY_KP_SIZE],
        };
        let msg = req.to_message(1).unwrap();

        assert_eq!(msg.opcode, 32);
        assert_eq!(msg.payload_len(), 167);
        assert_eq!(Jpake1aRequest::from_message(&msg).unwrap(), req);

        let err = Jpake1bResponse::decode_payload(&[0; 100]).unwrap_err();
        assert!(matches!(
            err,
            PumpError::InvalidPayloadSize {
                message: "Jpake1bResponse",
                expected: 167,
                actual: 100
            }
        ));
    }

    #[test]
    fn test_round2_variable_data() {
        for len in [165usize, 168] {
            let resp = Jpake2Response {
                app_instance_id: 3,
                data: Bytes::from(vec![0x11; len]),
            };
            let decoded = Jpake2Response::decode_payload(&resp.encode_payload()).unwrap();
            assert_eq!(decoded.data.len(), len);
            assert_eq!(decoded, resp);
        }

        assert!(Jpake2Request::decode_payload(&[1]).is_err());
    }

    #[test]
    fn test_jpake3_layouts() {
        let req = Jpake3SessionKeyRequest { challenge_param: 0xBEEF };
        assert_eq!(&req.encode_payload()[..], &[0xEF, 0xBE]);

        let resp = Jpake3SessionKeyResponse {
            app_instance_id: 0,
            device_key_nonce: [1, 2, 3, 4, 5, 6, 7, 8],
            device_key_reserved: [0; 8],
        };
        let payload = resp.encode_payload();
        assert_eq!(payload.len(), 18);
        assert_eq!(&payload[2..10], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(Jpake3SessionKeyResponse::decode_payload(&payload).unwrap(), resp);
    }

    #[test]
    fn test_confirmation_layout() {
        let req = Jpake4KeyConfirmationRequest {
            app_instance_id: 2,
            nonce: [0x10; 8],
            reserved: [0; 8],
            hash_digest: [0x20; 32],
        };
        let payload = req.encode_payload();

        assert_eq!(payload.len(), 50);
        assert_eq!(payload[2], 0x10);
        assert_eq!(payload[10], 0x00);
        assert_eq!(payload[18], 0x20);
        assert_eq!(payload[49], 0x20);
        assert_eq!(Jpake4KeyConfirmationRequest::decode_payload(&payload).unwrap(), req);
    }
}
