//! Pump-side pairing state machine.
//!
//! ```text
//! Idle ─start_pairing─► WaitingForPairingCode
//!                          │  (optional challenge probe)
//!                          ├─► CentralChallengeSent ─► PumpChallengeReady
//!                          ▼                               │
//!                    JpakeRound1Sent ◄─────────────────────┘
//!                          │ 1a response (G3), 1b request (G4) → 1b response (G2)
//!                          ▼
//!                  JpakeRound1Complete ─► JpakeRound2Sent ─► JpakeRound2Complete
//!                                                               │ round 3: key derived
//!                                                               ▼
//!                              Authenticated ◄─── KeyConfirmationSent
//! ```
//!
//! Any failure or out-of-order call before `Authenticated` moves to
//! `Failed`; pairing must then restart with [`Authenticator::start_pairing`].

use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;

use super::pairing::{PairingManager, PairingStatus};
use super::session::{SessionKey, SessionStore};
use crate::error::{PumpError, Result};
use crate::jpake::{JpakeEngine, JpakeState, KeyKp, Role};
use crate::messages::*;
use crate::protocol::{next_transaction_id, signing};

/// Authenticator progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    Idle,
    WaitingForPairingCode,
    CentralChallengeSent,
    PumpChallengeReady,
    JpakeRound1Sent,
    JpakeRound1Complete,
    JpakeRound2Sent,
    JpakeRound2Complete,
    KeyConfirmationSent,
    Authenticated,
    Failed,
}

/// States from which J-PAKE round 1 may start.
const ROUND1_START: &[AuthState] = &[
    AuthState::WaitingForPairingCode,
    AuthState::CentralChallengeSent,
    AuthState::PumpChallengeReady,
];

/// Serializable snapshot, free of key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub state: AuthState,
    pub device: Option<String>,
    pub app_instance_id: u16,
    pub jpake: Option<JpakeState>,
    pub pairing: PairingStatus,
    pub authenticated: bool,
}

/// Drives one device through pairing.
pub struct Authenticator {
    state: AuthState,
    device: Option<String>,
    pairing: PairingManager,
    sessions: Arc<SessionStore>,
    engine: Option<JpakeEngine>,
    app_instance_id: u16,
    transaction_id: u8,
    /// G2, held back until the app sends G4.
    pending_round1: Option<KeyKp>,
    /// G3, held until G4 arrives.
    peer_round1: Option<KeyKp>,
    device_nonce: Option<[u8; NONCE_SIZE]>,
    hmac_key: Option<[u8; NONCE_SIZE]>,
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

impl Authenticator {
    /// Create an idle authenticator that records sessions in `sessions`.
    pub fn new(sessions: Arc<SessionStore>, pairing: PairingManager) -> Self {
        Self {
            state: AuthState::Idle,
            device: None,
            pairing,
            sessions,
            engine: None,
            app_instance_id: 0,
            transaction_id: 0,
            pending_round1: None,
            peer_round1: None,
            device_nonce: None,
            hmac_key: None,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Check if pairing completed.
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Device being paired.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// App instance id echoed in pump-originated messages.
    pub fn app_instance_id(&self) -> u16 {
        self.app_instance_id
    }

    /// Pairing code manager.
    pub fn pairing(&self) -> &PairingManager {
        &self.pairing
    }

    /// Session key, only once authenticated.
    pub fn session_key(&self) -> Option<SessionKey> {
        if !self.is_authenticated() {
            return None;
        }
        self.device
            .as_deref()
            .and_then(|device| self.sessions.session_key(device))
    }

    /// Transaction id for the next pump-originated message.
    pub fn next_transaction_id(&mut self) -> u8 {
        let id = self.transaction_id;
        self.transaction_id = next_transaction_id(id);
        id
    }

    /// Serializable snapshot.
    pub fn status(&self) -> AuthStatus {
        AuthStatus {
            state: self.state,
            device: self.device.clone(),
            app_instance_id: self.app_instance_id,
            jpake: self.engine.as_ref().map(|e| e.state()),
            pairing: self.pairing.status(),
            authenticated: self.is_authenticated(),
        }
    }

    /// Check a code entered out of band. Consumes one attempt.
    pub fn verify_pairing_code(&mut self, code: &str) -> Result<()> {
        self.pairing.verify_code(code)
    }

    /// Issue a new pairing code for `device` and wait for the app.
    ///
    /// Abandons any handshake in progress.
    pub fn start_pairing(&mut self, device: &str) -> String {
        self.discard_handshake();
        self.device = Some(device.to_string());
        let code = self.pairing.generate_code();
        self.transition(AuthState::WaitingForPairingCode);
        code
    }

    /// Return to `Idle`, dropping the pairing code and handshake state.
    ///
    /// Existing sessions are kept.
    pub fn reset(&mut self) {
        self.discard_handshake();
        self.pairing.clear();
        self.device = None;
        self.app_instance_id = 0;
        self.transition(AuthState::Idle);
    }

    fn discard_handshake(&mut self) {
        self.engine = None;
        self.pending_round1 = None;
        self.peer_round1 = None;
        self.device_nonce = None;
        self.hmac_key = None;
    }

    fn transition(&mut self, next: AuthState) {
        tracing::debug!("Authenticator {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: PumpError) -> PumpError {
        if self.state != AuthState::Authenticated {
            tracing::warn!(device = ?self.device, "Pairing failed");
            tracing::debug!("Pairing failure cause: {}", err);
            self.discard_handshake();
            self.transition(AuthState::Failed);
        }
        err
    }

    /// Run `step` if the current state is allowed, failing the handshake on error.
    fn step<T>(
        &mut self,
        operation: &'static str,
        allowed: &[AuthState],
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if !allowed.contains(&self.state) {
            let err = PumpError::ProtocolSequenceError {
                operation,
                state: format!("{:?}", self.state),
            };
            return Err(self.fail(err));
        }
        body(self).map_err(|err| self.fail(err))
    }

    fn engine_mut(&mut self, operation: &'static str) -> Result<&mut JpakeEngine> {
        let state = self.state;
        self.engine
            .as_mut()
            .ok_or_else(|| PumpError::ProtocolSequenceError {
                operation,
                state: format!("{:?}", state),
            })
    }

    fn active_code(&mut self) -> Result<String> {
        self.pairing.require_usable()
    }

    /// Answer the app's central challenge with `HMAC-SHA1(code, challenge)`
    /// and a fresh HMAC key.
    pub fn handle_central_challenge(
        &mut self,
        request: &CentralChallengeRequest,
    ) -> Result<CentralChallengeResponse> {
        self.step(
            "handle_central_challenge",
            &[AuthState::WaitingForPairingCode],
            |this| {
                let code = this.active_code()?;
                let hmac_key = random_nonce();

                this.app_instance_id = request.app_instance_id;
                this.hmac_key = Some(hmac_key);
                this.transition(AuthState::CentralChallengeSent);

                Ok(CentralChallengeResponse {
                    app_instance_id: request.app_instance_id,
                    central_challenge_hash: signing::hmac_sha1(
                        code.as_bytes(),
                        &request.central_challenge,
                    ),
                    hmac_key,
                })
            },
        )
    }

    /// Check the app's `HMAC-SHA1(code, hmac_key)` and report the outcome.
    ///
    /// A mismatch is reported in `success` only; J-PAKE decides pairing.
    pub fn handle_pump_challenge(
        &mut self,
        request: &PumpChallengeRequest,
    ) -> Result<PumpChallengeResponse> {
        self.step(
            "handle_pump_challenge",
            &[AuthState::CentralChallengeSent],
            |this| {
                let code = this.active_code()?;
                let hmac_key = this.hmac_key.ok_or(PumpError::ProtocolSequenceError {
                    operation: "handle_pump_challenge",
                    state: "no hmac key".into(),
                })?;

                let expected = signing::hmac_sha1(code.as_bytes(), &hmac_key);
                let success: bool = expected[..].ct_eq(&request.pump_challenge_hash[..]).into();
                if !success {
                    tracing::debug!("Pump challenge hash mismatch");
                }

                this.transition(AuthState::PumpChallengeReady);
                Ok(PumpChallengeResponse {
                    app_instance_id: this.app_instance_id,
                    success,
                })
            },
        )
    }

    /// Start J-PAKE: send G1 and hold G2 back for the 1b exchange.
    pub fn generate_jpake_round1(&mut self) -> Result<Jpake1aRequest> {
        self.step("generate_jpake_round1", ROUND1_START, |this| {
            let code = this.active_code()?;
            let mut engine = JpakeEngine::new(Role::Pump, &code);
            let (g1, g2) = engine.generate_round1()?;

            this.engine = Some(engine);
            this.pending_round1 = Some(g2);
            this.peer_round1 = None;
            this.transition(AuthState::JpakeRound1Sent);

            Ok(Jpake1aRequest {
                app_instance_id: this.app_instance_id,
                central_challenge: g1.encode()?,
            })
        })
    }

    /// Store the app's G3.
    pub fn handle_jpake1a_response(&mut self, response: &Jpake1aResponse) -> Result<()> {
        self.step(
            "handle_jpake1a_response",
            &[AuthState::JpakeRound1Sent],
            |this| {
                if this.peer_round1.is_some() {
                    return Err(PumpError::ProtocolSequenceError {
                        operation: "handle_jpake1a_response",
                        state: "G3 already received".into(),
                    });
                }
                this.app_instance_id = response.app_instance_id;
                this.peer_round1 = Some(KeyKp::decode(&response.central_challenge_hash)?);
                Ok(())
            },
        )
    }

    /// Take the app's G4, verify both app points, answer with G2.
    pub fn handle_jpake_round1(&mut self, request: &Jpake1bRequest) -> Result<Jpake1bResponse> {
        self.step("handle_jpake_round1", &[AuthState::JpakeRound1Sent], |this| {
            let g3 = this.peer_round1.ok_or(PumpError::ProtocolSequenceError {
                operation: "handle_jpake_round1",
                state: "G3 not received".into(),
            })?;
            let g4 = KeyKp::decode(&request.central_challenge)?;

            this.engine_mut("handle_jpake_round1")?.process_round1(&g3, &g4)?;

            let g2 = this
                .pending_round1
                .take()
                .ok_or(PumpError::ProtocolSequenceError {
                    operation: "handle_jpake_round1",
                    state: "G2 missing".into(),
                })?;
            this.peer_round1 = None;
            this.transition(AuthState::JpakeRound1Complete);

            Ok(Jpake1bResponse {
                app_instance_id: this.app_instance_id,
                central_challenge_hash: g2.encode()?,
            })
        })
    }

    /// Send the pump's round-2 value A.
    pub fn generate_jpake_round2(&mut self) -> Result<Jpake2Request> {
        self.step(
            "generate_jpake_round2",
            &[AuthState::JpakeRound1Complete],
            |this| {
                let a = this.engine_mut("generate_jpake_round2")?.generate_round2()?;
                this.transition(AuthState::JpakeRound2Sent);

                Ok(Jpake2Request {
                    app_instance_id: this.app_instance_id,
                    data: Bytes::copy_from_slice(&a.encode()?),
                })
            },
        )
    }

    /// Verify the app's round-2 value B.
    pub fn handle_jpake_round2_response(&mut self, response: &Jpake2Response) -> Result<()> {
        self.step(
            "handle_jpake_round2_response",
            &[AuthState::JpakeRound2Sent],
            |this| {
                let b = KeyKp::decode_round2(&response.data)?;
                this.engine_mut("handle_jpake_round2_response")?
                    .process_round2(&b)?;
                this.transition(AuthState::JpakeRound2Complete);
                Ok(())
            },
        )
    }

    /// Derive the session key and answer with the device nonce.
    pub fn handle_jpake_round3(
        &mut self,
        _request: &Jpake3SessionKeyRequest,
    ) -> Result<Jpake3SessionKeyResponse> {
        self.step(
            "handle_jpake_round3",
            &[AuthState::JpakeRound2Complete],
            |this| {
                this.engine_mut("handle_jpake_round3")?.derive_session_key()?;

                let nonce = random_nonce();
                this.device_nonce = Some(nonce);

                Ok(Jpake3SessionKeyResponse {
                    app_instance_id: this.app_instance_id,
                    device_key_nonce: nonce,
                    device_key_reserved: [0; NONCE_SIZE],
                })
            },
        )
    }

    /// Whether round 3 has derived the key and round 4 can be sent.
    pub fn is_key_derived(&self) -> bool {
        self.state == AuthState::JpakeRound2Complete && self.device_nonce.is_some()
    }

    /// Send the pump's key confirmation over the device nonce.
    pub fn generate_jpake_round4(&mut self) -> Result<Jpake4KeyConfirmationRequest> {
        self.step(
            "generate_jpake_round4",
            &[AuthState::JpakeRound2Complete],
            |this| {
                let nonce = this.device_nonce.ok_or(PumpError::ProtocolSequenceError {
                    operation: "generate_jpake_round4",
                    state: "session key not derived".into(),
                })?;
                let reserved = [0u8; NONCE_SIZE];
                let digest = this
                    .engine_mut("generate_jpake_round4")?
                    .generate_key_confirmation(&nonce, &reserved)?;

                this.transition(AuthState::KeyConfirmationSent);
                Ok(Jpake4KeyConfirmationRequest {
                    app_instance_id: this.app_instance_id,
                    nonce,
                    reserved,
                    hash_digest: digest,
                })
            },
        )
    }

    /// Verify the app's key confirmation and promote the key to a session.
    pub fn handle_jpake_round4_response(
        &mut self,
        response: &Jpake4KeyConfirmationResponse,
    ) -> Result<()> {
        self.step(
            "handle_jpake_round4_response",
            &[AuthState::KeyConfirmationSent],
            |this| {
                let device = this.device.clone().ok_or(PumpError::ProtocolSequenceError {
                    operation: "handle_jpake_round4_response",
                    state: "no pairing device".into(),
                })?;
                let nonce = this.device_nonce.ok_or(PumpError::ProtocolSequenceError {
                    operation: "handle_jpake_round4_response",
                    state: "session key not derived".into(),
                })?;
                // The app must confirm over the nonce this pump issued.
                let same_nonce: bool = nonce[..].ct_eq(&response.nonce[..]).into();
                if !same_nonce {
                    tracing::warn!("Key confirmation used a foreign nonce");
                    return Err(PumpError::KeyConfirmationFailed);
                }

                let engine = this.engine_mut("handle_jpake_round4_response")?;
                let confirmed = engine.verify_key_confirmation(
                    &response.hash_digest,
                    Role::App,
                    &nonce,
                    &response.reserved,
                )?;
                if !confirmed {
                    return Err(PumpError::KeyConfirmationFailed);
                }

                let key = engine
                    .session_key()
                    .ok_or(PumpError::KeyConfirmationFailed)?;
                this.sessions.create(&device, key);

                this.pairing.clear();
                this.discard_handshake();
                this.transition(AuthState::Authenticated);
                tracing::info!(device = %device, "Device paired");
                Ok(())
            },
        )
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("state", &self.state)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
