//! EC-JPAKE state machine for one side of a pairing.
//!
//! ```text
//! Created ──generate_round1──► Round1Generated ──process_round1──► Round1Received
//!                                                                      │
//!                                                                generate_round2
//!                                                                      ▼
//! SessionKeyDerived ◄──derive_session_key── Round2Received ◄──process_round2── Round2Generated
//!        │
//!  verify_key_confirmation
//!        ▼
//!    Confirmed
//! ```
//!
//! Each side owns secrets `(a, b)` and publishes `X_a = G·a`, `X_b = G·b`
//! with Schnorr proofs. With peer points `P_a`, `P_b` and the shared secret
//! `s` derived from the pairing code, round 2 publishes
//! `(X_a + P_a + P_b)·(b·s)`. Both sides then agree on
//! `K = (R_peer − P_b·(b·s))·b`.

use hmac::{Hmac, Mac};
use p256::{ProjectivePoint, Scalar};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::encoding::{encode_point, KeyKp};
use super::schnorr::{self, reduce_digest, random_scalar};
use crate::error::{PumpError, Result};

/// Session key length.
pub const SESSION_KEY_SIZE: usize = 32;

const CONFIRMATION_LABEL: &[u8] = b"JPake-Confirmation-";

type HmacSha256 = Hmac<Sha256>;

/// Which side of the exchange this engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Pump,
    App,
}

impl Role {
    /// Identity bound into Schnorr proofs.
    pub fn user_id(&self) -> &'static [u8] {
        match self {
            Role::Pump => b"tandem-pump",
            Role::App => b"tandem-app",
        }
    }

    /// Label mixed into key confirmation.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Pump => "pump",
            Role::App => "app",
        }
    }

    /// The other side.
    pub fn peer(&self) -> Role {
        match self {
            Role::Pump => Role::App,
            Role::App => Role::Pump,
        }
    }
}

/// Engine progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JpakeState {
    Created,
    Round1Generated,
    Round1Received,
    Round2Generated,
    Round2Received,
    SessionKeyDerived,
    Confirmed,
}

struct OwnKeys {
    a: Scalar,
    b: Scalar,
    x_a: ProjectivePoint,
    x_b: ProjectivePoint,
}

struct PeerKeys {
    p_a: ProjectivePoint,
    p_b: ProjectivePoint,
}

/// Derive the shared secret scalar from a pairing code.
pub fn derive_shared_secret(pairing_code: &str) -> Scalar {
    reduce_digest(&Sha256::digest(pairing_code.as_bytes()))
}

/// One side of an EC-JPAKE exchange over P-256.
pub struct JpakeEngine {
    role: Role,
    state: JpakeState,
    secret: Scalar,
    own: Option<OwnKeys>,
    peer: Option<PeerKeys>,
    own_round2: Option<ProjectivePoint>,
    peer_round2: Option<ProjectivePoint>,
    session_key: Option<Zeroizing<[u8; SESSION_KEY_SIZE]>>,
}

impl JpakeEngine {
    /// Create an engine for `role` keyed by `pairing_code`.
    pub fn new(role: Role, pairing_code: &str) -> Self {
        Self {
            role,
            state: JpakeState::Created,
            secret: derive_shared_secret(pairing_code),
            own: None,
            peer: None,
            own_round2: None,
            peer_round2: None,
            session_key: None,
        }
    }

    /// Get this engine's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Get the current state.
    pub fn state(&self) -> JpakeState {
        self.state
    }

    /// Derived session key, once available.
    pub fn session_key(&self) -> Option<[u8; SESSION_KEY_SIZE]> {
        self.session_key.as_deref().copied()
    }

    /// Discard all progress and secrets. The pairing code is kept.
    pub fn reset(&mut self) {
        self.state = JpakeState::Created;
        self.own = None;
        self.peer = None;
        self.own_round2 = None;
        self.peer_round2 = None;
        self.session_key = None;
    }

    fn require(&self, expected: &[JpakeState], operation: &'static str) -> Result<()> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(PumpError::ProtocolSequenceError {
                operation,
                state: format!("{:?}", self.state),
            })
        }
    }

    fn own_keys(&self, operation: &'static str) -> Result<&OwnKeys> {
        self.own.as_ref().ok_or_else(|| self.sequence_error(operation))
    }

    fn peer_keys(&self, operation: &'static str) -> Result<&PeerKeys> {
        self.peer.as_ref().ok_or_else(|| self.sequence_error(operation))
    }

    fn sequence_error(&self, operation: &'static str) -> PumpError {
        PumpError::ProtocolSequenceError {
            operation,
            state: format!("{:?}", self.state),
        }
    }

    /// Generate `(X_a, X_b)` with proofs.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolSequenceError` unless the engine is fresh.
    pub fn generate_round1(&mut self) -> Result<(KeyKp, KeyKp)> {
        self.require(&[JpakeState::Created], "generate_round1")?;

        let g = ProjectivePoint::GENERATOR;
        let a = random_scalar();
        let b = random_scalar();
        let x_a = g * a;
        let x_b = g * b;
        let user_id = self.role.user_id();

        let first = KeyKp {
            x: x_a,
            proof: schnorr::prove(&g, &a, &x_a, user_id)?,
        };
        let second = KeyKp {
            x: x_b,
            proof: schnorr::prove(&g, &b, &x_b, user_id)?,
        };

        self.own = Some(OwnKeys { a, b, x_a, x_b });
        self.state = JpakeState::Round1Generated;
        tracing::debug!(role = ?self.role, "Generated J-PAKE round 1");
        Ok((first, second))
    }

    /// Verify and store the peer's round-1 points.
    ///
    /// # Errors
    ///
    /// Returns `ZkpVerificationFailed` if either proof is invalid.
    pub fn process_round1(&mut self, first: &KeyKp, second: &KeyKp) -> Result<()> {
        self.require(&[JpakeState::Round1Generated], "process_round1")?;

        let g = ProjectivePoint::GENERATOR;
        let peer_id = self.role.peer().user_id();
        schnorr::verify(&g, &first.x, &first.proof, peer_id)?;
        schnorr::verify(&g, &second.x, &second.proof, peer_id)?;

        self.peer = Some(PeerKeys {
            p_a: first.x,
            p_b: second.x,
        });
        self.state = JpakeState::Round1Received;
        tracing::debug!(role = ?self.role, "Verified peer J-PAKE round 1");
        Ok(())
    }

    /// Generate the round-2 value `(X_a + P_a + P_b)·(b·s)` with proof.
    pub fn generate_round2(&mut self) -> Result<KeyKp> {
        self.require(&[JpakeState::Round1Received], "generate_round2")?;

        let own = self.own_keys("generate_round2")?;
        let peer = self.peer_keys("generate_round2")?;

        let generator = own.x_a + peer.p_a + peer.p_b;
        let exponent = own.b * self.secret;
        let value = generator * exponent;
        let proof = schnorr::prove(&generator, &exponent, &value, self.role.user_id())?;

        self.own_round2 = Some(value);
        self.state = JpakeState::Round2Generated;
        Ok(KeyKp { x: value, proof })
    }

    /// Verify and store the peer's round-2 value.
    ///
    /// # Errors
    ///
    /// Returns `ZkpVerificationFailed` if the proof is invalid.
    pub fn process_round2(&mut self, value: &KeyKp) -> Result<()> {
        self.require(&[JpakeState::Round2Generated], "process_round2")?;

        let own = self.own_keys("process_round2")?;
        let peer = self.peer_keys("process_round2")?;

        let generator = peer.p_a + own.x_a + own.x_b;
        schnorr::verify(&generator, &value.x, &value.proof, self.role.peer().user_id())?;

        self.peer_round2 = Some(value.x);
        self.state = JpakeState::Round2Received;
        Ok(())
    }

    /// Compute `K` and hash it with the transcript into the session key.
    ///
    /// Both roles order the transcript pump-first so their keys match.
    pub fn derive_session_key(&mut self) -> Result<[u8; SESSION_KEY_SIZE]> {
        self.require(&[JpakeState::Round2Received], "derive_session_key")?;

        let own = self.own_keys("derive_session_key")?;
        let peer = self.peer_keys("derive_session_key")?;
        let (own_r2, peer_r2) = match (self.own_round2, self.peer_round2) {
            (Some(own_r2), Some(peer_r2)) => (own_r2, peer_r2),
            _ => return Err(self.sequence_error("derive_session_key")),
        };

        let k = (peer_r2 - peer.p_b * (own.b * self.secret)) * own.b;

        let transcript = match self.role {
            Role::Pump => [own.x_a, own.x_b, peer.p_a, peer.p_b, own_r2, peer_r2],
            Role::App => [peer.p_a, peer.p_b, own.x_a, own.x_b, peer_r2, own_r2],
        };

        let mut hasher = Sha256::new();
        hasher.update(encode_point(&k)?);
        for point in &transcript {
            hasher.update(encode_point(point)?);
        }

        let mut key = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
        key.copy_from_slice(&hasher.finalize());
        let out = *key;

        self.session_key = Some(key);
        self.state = JpakeState::SessionKeyDerived;
        tracing::debug!(role = ?self.role, "Derived J-PAKE session key");
        Ok(out)
    }

    fn confirmation_mac(&self, role: Role, nonce: &[u8], reserved: &[u8]) -> Result<[u8; 32]> {
        let key = self
            .session_key
            .as_ref()
            .ok_or_else(|| self.sequence_error("key_confirmation"))?;

        let mut mac =
            HmacSha256::new_from_slice(&key[..]).map_err(|_| PumpError::KeyConfirmationFailed)?;
        mac.update(CONFIRMATION_LABEL);
        mac.update(role.label().as_bytes());
        mac.update(nonce);
        mac.update(reserved);

        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    /// HMAC proving this side holds the session key.
    pub fn generate_key_confirmation(&self, nonce: &[u8], reserved: &[u8]) -> Result<[u8; 32]> {
        self.require(
            &[JpakeState::SessionKeyDerived, JpakeState::Confirmed],
            "generate_key_confirmation",
        )?;
        self.confirmation_mac(self.role, nonce, reserved)
    }

    /// Check a confirmation HMAC produced by `expected_role`.
    ///
    /// Compares in constant time. On success the engine moves to
    /// `Confirmed`; on mismatch it stays put and `false` is returned.
    pub fn verify_key_confirmation(
        &mut self,
        mac: &[u8],
        expected_role: Role,
        nonce: &[u8],
        reserved: &[u8],
    ) -> Result<bool> {
        self.require(&[JpakeState::SessionKeyDerived], "verify_key_confirmation")?;

        let expected = self.confirmation_mac(expected_role, nonce, reserved)?;
        let matches: bool = expected[..].ct_eq(mac).into();
        if matches {
            self.state = JpakeState::Confirmed;
        } else {
            tracing::warn!(role = ?self.role, "J-PAKE key confirmation mismatch");
        }
        Ok(matches)
    }
}

impl std::fmt::Debug for JpakeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JpakeEngine")
            .field("role", &self.role)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
