//! Schnorr zero-knowledge proofs of discrete-log knowledge.
//!
//! For public `X = G·x` the prover picks random `v`, sends `V = G·v` and
//! `r = v − x·h`, where `h` hashes the generator, `V`, `X` and the prover's
//! identity. The verifier checks `V == G·r + X·h`.

use p256::elliptic_curve::bigint::U256;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::Field;
use p256::{FieldBytes, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::encoding::encode_point;
use crate::error::{PumpError, Result};

/// Commitment point and response scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchnorrProof {
    pub v: ProjectivePoint,
    pub r: Scalar,
}

/// Reduce a 32-byte digest modulo the group order.
pub(crate) fn reduce_digest(digest: &[u8]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::clone_from_slice(digest))
}

/// Random non-zero scalar.
pub(crate) fn random_scalar() -> Scalar {
    loop {
        let scalar = Scalar::random(&mut OsRng);
        if !bool::from(scalar.is_zero()) {
            return scalar;
        }
    }
}

/// `h = SHA-256(len‖G ‖ len‖V ‖ len‖X ‖ len‖user_id) mod n`, lengths 4-byte BE.
fn challenge(
    generator: &ProjectivePoint,
    v: &ProjectivePoint,
    x: &ProjectivePoint,
    user_id: &[u8],
) -> Result<Scalar> {
    let mut hasher = Sha256::new();
    for point in [generator, v, x] {
        let encoded = encode_point(point)?;
        hasher.update((encoded.len() as u32).to_be_bytes());
        hasher.update(encoded);
    }
    hasher.update((user_id.len() as u32).to_be_bytes());
    hasher.update(user_id);

    Ok(reduce_digest(&hasher.finalize()))
}

/// Prove knowledge of `secret` where `public = generator·secret`.
pub fn prove(
    generator: &ProjectivePoint,
    secret: &Scalar,
    public: &ProjectivePoint,
    user_id: &[u8],
) -> Result<SchnorrProof> {
    let nonce = random_scalar();
    let v = *generator * nonce;
    let h = challenge(generator, &v, public, user_id)?;

    Ok(SchnorrProof {
        v,
        r: nonce - *secret * h,
    })
}

/// Verify a proof for `public` against `generator`.
///
/// # Errors
///
/// Returns `ZkpVerificationFailed` for the identity point or a bad proof.
pub fn verify(
    generator: &ProjectivePoint,
    public: &ProjectivePoint,
    proof: &SchnorrProof,
    user_id: &[u8],
) -> Result<()> {
    if *public == ProjectivePoint::IDENTITY {
        return Err(PumpError::ZkpVerificationFailed("public point is the identity"));
    }

    let h = challenge(generator, &proof.v, public, user_id)?;
    if proof.v != *generator * proof.r + *public * h {
        return Err(PumpError::ZkpVerificationFailed("proof does not match"));
    }

    Ok(())
}
