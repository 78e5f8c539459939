//! Wire encoding of curve points, scalars and ECJPAKEKeyKP.
//!
//! ```text
//! ECJPAKEKeyKP (165 bytes)
//! ┌───────────────┬───────────────┬────────┬──────────────────────┐
//! │ X             │ V             │ len=34 │ r                    │
//! │ 65 bytes SEC1 │ 65 bytes SEC1 │ 1 byte │ 00 00 + 32 bytes BE  │
//! └───────────────┴───────────────┴────────┴──────────────────────┘
//! ```
//!
//! Points are SEC1 uncompressed (`0x04 || x || y`). Round-2 payloads may be
//! prefixed with 3 bytes of TLS ECParameters (`03 00 17`, named curve
//! secp256r1), which are stripped on decode.

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::PrimeField;
use p256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};

use super::schnorr::SchnorrProof;
use crate::error::{PumpError, Result};
use crate::messages::KEY_KP_SIZE;

/// SEC1 uncompressed point size.
pub const POINT_SIZE: usize = 65;

/// Encoded ZKP scalar size (two zero bytes + 32-byte scalar).
pub const SCALAR_SIZE: usize = 34;

/// TLS ECParameters prefix for named curve secp256r1.
pub const EC_PARAMETERS_PREFIX: [u8; 3] = [0x03, 0x00, 0x17];

const UNCOMPRESSED_TAG: u8 = 0x04;

/// Encode a point as 65-byte SEC1 uncompressed.
///
/// # Errors
///
/// The identity has no uncompressed encoding and is rejected.
pub fn encode_point(point: &ProjectivePoint) -> Result<[u8; POINT_SIZE]> {
    let encoded = point.to_affine().to_encoded_point(false);
    encoded
        .as_bytes()
        .try_into()
        .map_err(|_| PumpError::InvalidPoint("identity point has no uncompressed form".into()))
}

/// Decode a 65-byte SEC1 uncompressed point.
///
/// # Errors
///
/// Returns `InvalidPoint` on wrong length, wrong prefix byte, or a point not
/// on the curve.
pub fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    if bytes.len() != POINT_SIZE {
        return Err(PumpError::InvalidPoint(format!(
            "expected {} bytes, got {}",
            POINT_SIZE,
            bytes.len()
        )));
    }
    if bytes[0] != UNCOMPRESSED_TAG {
        return Err(PumpError::InvalidPoint(format!(
            "expected prefix 0x04, got {:#04x}",
            bytes[0]
        )));
    }

    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| PumpError::InvalidPoint(format!("malformed SEC1 encoding: {}", e)))?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| PumpError::InvalidPoint("point is not on the curve".into()))?;

    Ok(ProjectivePoint::from(affine))
}

/// Encode a scalar as 34 bytes: two zero bytes then 32 bytes big-endian.
pub fn encode_scalar(scalar: &Scalar) -> [u8; SCALAR_SIZE] {
    let mut out = [0u8; SCALAR_SIZE];
    out[2..].copy_from_slice(&scalar.to_repr());
    out
}

/// Decode a 34-byte scalar field.
///
/// # Errors
///
/// Rejects non-zero padding and values not below the group order.
pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    if bytes.len() != SCALAR_SIZE {
        return Err(PumpError::InvalidPoint(format!(
            "expected {} byte scalar, got {}",
            SCALAR_SIZE,
            bytes.len()
        )));
    }
    if bytes[0] != 0 || bytes[1] != 0 {
        return Err(PumpError::InvalidPoint("non-zero scalar padding".into()));
    }

    Option::<Scalar>::from(Scalar::from_repr(FieldBytes::clone_from_slice(&bytes[2..])))
        .ok_or_else(|| PumpError::InvalidPoint("scalar is not below the group order".into()))
}

/// A public point with its Schnorr proof of knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyKp {
    /// Public point.
    pub x: ProjectivePoint,
    /// Proof that the sender knows the discrete log of `x`.
    pub proof: SchnorrProof,
}

impl KeyKp {
    /// Encode to the 165-byte wire form.
    pub fn encode(&self) -> Result<[u8; KEY_KP_SIZE]> {
        let mut out = [0u8; KEY_KP_SIZE];
        out[..POINT_SIZE].copy_from_slice(&encode_point(&self.x)?);
        out[POINT_SIZE..2 * POINT_SIZE].copy_from_slice(&encode_point(&self.proof.v)?);
        out[2 * POINT_SIZE] = SCALAR_SIZE as u8;
        out[2 * POINT_SIZE + 1..].copy_from_slice(&encode_scalar(&self.proof.r));
        Ok(out)
    }

    /// Decode the 165-byte wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_KP_SIZE {
            return Err(PumpError::InvalidPoint(format!(
                "expected {} byte ECJPAKEKeyKP, got {}",
                KEY_KP_SIZE,
                bytes.len()
            )));
        }

        let x = decode_point(&bytes[..POINT_SIZE])?;
        let v = decode_point(&bytes[POINT_SIZE..2 * POINT_SIZE])?;

        let len = bytes[2 * POINT_SIZE];
        if len as usize != SCALAR_SIZE {
            return Err(PumpError::InvalidPoint(format!(
                "expected scalar length byte {}, got {}",
                SCALAR_SIZE, len
            )));
        }
        let r = decode_scalar(&bytes[2 * POINT_SIZE + 1..])?;

        Ok(Self {
            x,
            proof: SchnorrProof { v, r },
        })
    }

    /// Decode a round-2 value, with or without the ECParameters prefix.
    pub fn decode_round2(data: &[u8]) -> Result<Self> {
        match data.len() {
            KEY_KP_SIZE => Self::decode(data),
            n if n == KEY_KP_SIZE + EC_PARAMETERS_PREFIX.len() => {
                if data[..3] != EC_PARAMETERS_PREFIX {
                    return Err(PumpError::InvalidPoint(
                        "unsupported ECParameters prefix".into(),
                    ));
                }
                Self::decode(&data[3..])
            }
            n => Err(PumpError::InvalidPoint(format!(
                "round 2 data must be {} or {} bytes, got {}",
                KEY_KP_SIZE,
                KEY_KP_SIZE + EC_PARAMETERS_PREFIX.len(),
                n
            ))),
        }
    }
}
