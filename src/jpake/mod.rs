//! EC-JPAKE over P-256.
//!
//! Password-authenticated key agreement keyed by the 6-digit pairing code.
//! [`JpakeEngine`] drives one side; [`KeyKp`] is the 165-byte wire form of a
//! point with its Schnorr proof.

mod encoding;
mod engine;
pub mod schnorr;

pub use encoding::{
    decode_point, decode_scalar, encode_point, encode_scalar, KeyKp, EC_PARAMETERS_PREFIX,
    POINT_SIZE, SCALAR_SIZE,
};
pub use engine::{derive_shared_secret, JpakeEngine, JpakeState, Role, SESSION_KEY_SIZE};
pub use schnorr::SchnorrProof;
