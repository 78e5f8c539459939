//! Simulator builder and message pipeline.
//!
//! The [`SimulatorBuilder`] assembles the catalog, session store, pump
//! model and configuration. The [`PumpSimulator`] turns one inbound frame
//! into the frames the pump sends back:
//! 1. Parse the frame through the catalog
//! 2. Check the auth block on signed opcodes
//! 3. Dispatch to the authenticator or the status handlers
//! 4. Append pump-initiated follow-ups (the next J-PAKE round)
//! 5. Sign where required and append CRC
//!
//! # Example
//!
//! ```
//! use tandem_sim::PumpSimulator;
//!
//! let mut simulator = PumpSimulator::builder()
//!     .serial_number(12345678)
//!     .require_authentication(false)
//!     .build()
//!     .unwrap();
//!
//! // CurrentBatteryV1Request, transaction 1, empty payload.
//! let replies = simulator.handle_frame("AA:BB", &[52, 1, 0]).unwrap();
//! assert_eq!(&replies[0][..5], &[53, 1, 2, 100, 100]);
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, PairingManager, SessionStore};
use crate::config::SimulatorConfig;
use crate::error::{PumpError, Result};
use crate::messages::{MessageCatalog, MessageKind};
use crate::protocol::{Message, SignedOpcodes};
use crate::pump::{EventQueue, PumpState};

/// Builder for configuring and creating a pump simulator.
pub struct SimulatorBuilder {
    config: SimulatorConfig,
    catalog: Option<MessageCatalog>,
    sessions: Option<Arc<SessionStore>>,
    state: Option<PumpState>,
}

impl SimulatorBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: SimulatorConfig::default(),
            catalog: None,
            sessions: None,
            state: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SimulatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pump serial number.
    pub fn serial_number(mut self, serial: u32) -> Self {
        self.config.serial_number = serial;
        self
    }

    /// Set the firmware version string.
    pub fn firmware_version(mut self, version: &str) -> Self {
        self.config.firmware_version = version.to_string();
        self
    }

    /// Set the pairing code validity.
    ///
    /// Default: 60 seconds
    pub fn pairing_timeout(mut self, timeout: Duration) -> Self {
        self.config.pairing_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the attempts allowed per pairing code.
    ///
    /// Default: 3
    pub fn max_pairing_attempts(mut self, attempts: u32) -> Self {
        self.config.max_pairing_attempts = attempts;
        self
    }

    /// Require a paired session for status requests.
    ///
    /// Default: true
    pub fn require_authentication(mut self, required: bool) -> Self {
        self.config.require_authentication = required;
        self
    }

    /// Maximum clock skew accepted on signed messages.
    pub fn max_signature_age(mut self, secs: Option<u32>) -> Self {
        self.config.max_signature_age_secs = secs;
        self
    }

    /// Use a custom message catalog instead of the standard one.
    pub fn catalog(mut self, catalog: MessageCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Share a session store with other simulators.
    pub fn sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Start from a prepared pump state.
    pub fn state(mut self, state: PumpState) -> Self {
        self.state = Some(state);
        self
    }

    /// Validate the configuration and build the simulator.
    pub fn build(self) -> Result<PumpSimulator> {
        self.config.validate()?;

        let catalog = Arc::new(self.catalog.unwrap_or_else(MessageCatalog::standard));
        let sessions = self.sessions.unwrap_or_default();
        let pairing = PairingManager::new(
            self.config.pairing_timeout(),
            self.config.max_pairing_attempts,
        );
        let state = self.state.unwrap_or_else(|| {
            PumpState::new(self.config.serial_number, &self.config.firmware_version)
        });

        tracing::debug!(
            "Simulator built: serial {}, firmware {}, {} opcodes",
            state.serial_number,
            state.firmware_version,
            catalog.len()
        );

        Ok(PumpSimulator {
            authenticator: Authenticator::new(sessions.clone(), pairing),
            catalog,
            sessions,
            state,
            events: EventQueue::new(),
            config: self.config,
        })
    }
}

impl Default for SimulatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A simulated pump answering framed messages.
pub struct PumpSimulator {
    config: SimulatorConfig,
    catalog: Arc<MessageCatalog>,
    sessions: Arc<SessionStore>,
    authenticator: Authenticator,
    state: PumpState,
    events: EventQueue,
}

/// A reply before framing.
type Reply = (MessageKind, u8);

impl PumpSimulator {
    /// Create a new simulator builder.
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::new()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<MessageCatalog> {
        &self.catalog
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn authenticator_mut(&mut self) -> &mut Authenticator {
        &mut self.authenticator
    }

    pub fn state(&self) -> &PumpState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PumpState {
        &mut self.state
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Opcodes whose frames carry an auth block, for sizing reassembly.
    pub fn signed_opcodes(&self) -> SignedOpcodes {
        self.catalog.signed_opcodes()
    }

    /// Issue a pairing code for `device`.
    pub fn start_pairing(&mut self, device: &str) -> String {
        tracing::info!(device, "Pairing started");
        self.authenticator.start_pairing(device)
    }

    /// Skip the challenge probe and send J-PAKE round 1 to `device`.
    pub fn begin_jpake(&mut self, device: &str) -> Result<Vec<Vec<u8>>> {
        self.ensure_pairing_device(device, "begin_jpake")?;
        let round1 = self.authenticator.generate_jpake_round1()?;
        let tx = self.authenticator.next_transaction_id();
        self.encode_replies(device, vec![(round1.into(), tx)])
    }

    /// Forget `device`'s session.
    pub fn unpair(&mut self, device: &str) -> bool {
        self.sessions.remove(device)
    }

    /// Advance the pump clock and raise any threshold alerts.
    pub fn tick(&mut self, seconds: u32) -> Vec<u32> {
        self.state.tick(seconds);
        self.events.check_thresholds(&self.state)
    }

    /// Handle one reassembled frame (CRC already checked and stripped).
    ///
    /// Returns wire frames, CRC included, in sending order.
    ///
    /// # Errors
    ///
    /// - Parse errors from the catalog
    /// - `HmacMismatch` for a signed frame with a bad auth block
    /// - `NotAuthenticated` for status requests from unpaired devices
    /// - `NoHandler` for opcodes the pump does not answer
    /// - Handshake errors from the authenticator
    pub fn handle_frame(&mut self, device: &str, frame: &[u8]) -> Result<Vec<Vec<u8>>> {
        let parsed = self.catalog.parse_message(frame)?;
        tracing::debug!(
            device,
            opcode = parsed.message.opcode,
            tx = parsed.message.transaction_id,
            "Received {}",
            parsed.kind.name()
        );

        if self.catalog.is_signed(parsed.message.opcode) {
            self.verify_signature(device, &parsed.message)?;
        }

        let replies = self.dispatch(device, parsed.kind, parsed.message.transaction_id)?;
        self.encode_replies(device, replies)
    }

    fn verify_signature(&self, device: &str, message: &Message) -> Result<()> {
        let key = self
            .sessions
            .session_key(device)
            .ok_or_else(|| PumpError::NotAuthenticated(device.to_string()))?;

        let (valid, timestamp) =
            message.verify_signature(&key[..], self.config.max_signature_age_secs);
        if !valid {
            tracing::warn!(device, opcode = message.opcode, timestamp, "Rejected signed message");
            return Err(PumpError::HmacMismatch {
                opcode: message.opcode,
            });
        }

        self.sessions.touch(device);
        Ok(())
    }

    fn ensure_pairing_device(&self, device: &str, operation: &'static str) -> Result<()> {
        match self.authenticator.device() {
            Some(pairing) if pairing == device => Ok(()),
            _ => Err(PumpError::ProtocolSequenceError {
                operation,
                state: format!("no pairing in progress for {}", device),
            }),
        }
    }

    fn require_session(&self, device: &str) -> Result<()> {
        if self.sessions.touch(device) || !self.config.require_authentication {
            Ok(())
        } else {
            Err(PumpError::NotAuthenticated(device.to_string()))
        }
    }

    fn dispatch(&mut self, device: &str, kind: MessageKind, tx: u8) -> Result<Vec<Reply>> {
        let mut replies: Vec<Reply> = Vec::new();

        match kind {
            MessageKind::CentralChallengeRequest(req) => {
                self.ensure_pairing_device(device, "CentralChallengeRequest")?;
                let resp = self.authenticator.handle_central_challenge(&req)?;
                replies.push((resp.into(), tx));
            }
            MessageKind::PumpChallengeRequest(req) => {
                self.ensure_pairing_device(device, "PumpChallengeRequest")?;
                let resp = self.authenticator.handle_pump_challenge(&req)?;
                replies.push((resp.into(), tx));
                replies.push(self.follow_up_round1()?);
            }
            MessageKind::Jpake1aResponse(resp) => {
                self.ensure_pairing_device(device, "Jpake1aResponse")?;
                self.authenticator.handle_jpake1a_response(&resp)?;
            }
            MessageKind::Jpake1bRequest(req) => {
                self.ensure_pairing_device(device, "Jpake1bRequest")?;
                let resp = self.authenticator.handle_jpake_round1(&req)?;
                replies.push((resp.into(), tx));

                let round2 = self.authenticator.generate_jpake_round2()?;
                replies.push((round2.into(), self.authenticator.next_transaction_id()));
            }
            MessageKind::Jpake2Response(resp) => {
                self.ensure_pairing_device(device, "Jpake2Response")?;
                self.authenticator.handle_jpake_round2_response(&resp)?;
            }
            MessageKind::Jpake3SessionKeyRequest(req) => {
                self.ensure_pairing_device(device, "Jpake3SessionKeyRequest")?;
                let resp = self.authenticator.handle_jpake_round3(&req)?;
                replies.push((resp.into(), tx));

                let round4 = self.authenticator.generate_jpake_round4()?;
                replies.push((round4.into(), self.authenticator.next_transaction_id()));
            }
            MessageKind::Jpake4KeyConfirmationResponse(resp) => {
                self.ensure_pairing_device(device, "Jpake4KeyConfirmationResponse")?;
                self.authenticator.handle_jpake_round4_response(&resp)?;
            }
            MessageKind::CurrentBolusStatusRequest(_) => {
                self.require_session(device)?;
                replies.push((self.state.bolus_status_response().into(), tx));
            }
            MessageKind::CurrentBatteryV1Request(_) => {
                self.require_session(device)?;
                replies.push((self.state.battery_response().into(), tx));
            }
            MessageKind::PumpVersionRequest(_) => {
                self.require_session(device)?;
                let resp = self.state.version_response(self.config.model_number);
                replies.push((resp.into(), tx));
            }
            other => {
                tracing::debug!(device, "No handler for {}", other.name());
                return Err(PumpError::NoHandler(other.opcode()));
            }
        }

        Ok(replies)
    }

    fn follow_up_round1(&mut self) -> Result<Reply> {
        let round1 = self.authenticator.generate_jpake_round1()?;
        Ok((round1.into(), self.authenticator.next_transaction_id()))
    }

    fn encode_replies(&self, device: &str, replies: Vec<Reply>) -> Result<Vec<Vec<u8>>> {
        replies
            .into_iter()
            .map(|(kind, tx)| {
                let mut message = kind.to_message(tx)?;
                if self.catalog.is_signed(message.opcode) {
                    let key = self
                        .sessions
                        .session_key(device)
                        .ok_or_else(|| PumpError::NotAuthenticated(device.to_string()))?;
                    message = message.sign(&key[..], None);
                }
                tracing::debug!(device, opcode = message.opcode, tx, "Sending {}", kind.name());
                Ok(message.to_wire())
            })
            .collect()
    }
}

impl std::fmt::Debug for PumpSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpSimulator")
            .field("serial_number", &self.state.serial_number)
            .field("auth_state", &self.authenticator.state())
            .field("paired_devices", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::messages::{
        CurrentBolusStatusResponse, MessageDescriptor, PumpMessage, PumpVersionResponse,
    };
    use crate::protocol::crc;

    const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

    fn strip(frame: &[u8]) -> &[u8] {
        let (ok, body) = crc::verify_and_strip(frame);
        assert!(ok, "reply CRC must be valid");
        body
    }

    #[test]
    fn test_builder_defaults() {
        let sim = PumpSimulator::builder().build().unwrap();

        assert_eq!(sim.config().chunk_size, 18);
        assert_eq!(sim.catalog().len(), 20);
        assert_eq!(sim.authenticator().state(), AuthState::Idle);
        assert_eq!(sim.state().firmware_version, "7.7.1");
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = PumpSimulator::builder().max_pairing_attempts(0).build();
        assert!(matches!(result, Err(PumpError::Config(_))));
    }

    #[test]
    fn test_status_requires_session() {
        let mut sim = PumpSimulator::builder().build().unwrap();

        let err = sim.handle_frame(DEVICE, &[52, 1, 0]).unwrap_err();
        assert!(matches!(err, PumpError::NotAuthenticated(d) if d == DEVICE));

        sim.sessions().create(DEVICE, [5; 32]);
        let replies = sim.handle_frame(DEVICE, &[52, 1, 0]).unwrap();
        assert_eq!(strip(&replies[0]), &[53, 1, 2, 100, 100]);
    }

    #[test]
    fn test_bolus_and_version_replies() {
        let mut sim = PumpSimulator::builder()
            .serial_number(777)
            .require_authentication(false)
            .build()
            .unwrap();
        sim.state_mut().start_bolus(50_000, 1, 1);

        let replies = sim.handle_frame(DEVICE, &[44, 9, 0]).unwrap();
        let msg = Message::parse(strip(&replies[0]), false).unwrap();
        assert_eq!(msg.transaction_id, 9);
        let bolus = CurrentBolusStatusResponse::from_message(&msg).unwrap();
        assert_eq!(bolus.bolus_id, 1);
        assert_eq!(bolus.requested_volume, 50_000);

        let replies = sim.handle_frame(DEVICE, &[84, 10, 0]).unwrap();
        let msg = Message::parse(strip(&replies[0]), false).unwrap();
        let version = PumpVersionResponse::from_message(&msg).unwrap();
        assert_eq!(version.serial_num, 777);
        assert_eq!(version.arm_sw_ver, 7_070_001);
    }

    #[test]
    fn test_unhandled_opcodes() {
        let mut sim = PumpSimulator::builder().build().unwrap();

        assert!(matches!(
            sim.handle_frame(DEVICE, &[0xC8, 0, 0]),
            Err(PumpError::NoHandler(0xC8))
        ));
        // Responses are never handled by the pump.
        assert!(matches!(
            sim.handle_frame(DEVICE, &[53, 0, 2, 1, 1]),
            Err(PumpError::NoHandler(53))
        ));
    }

    #[test]
    fn test_signed_opcode_checks_auth_block() {
        let mut catalog = MessageCatalog::standard();
        catalog
            .register(MessageDescriptor::raw(0x90, "SignedProbe", true))
            .unwrap();
        let mut sim = PumpSimulator::builder().catalog(catalog).build().unwrap();
        assert!(sim.signed_opcodes().contains(0x90));

        let key = [3u8; 32];
        let signed = Message::new(0x90, 1, &[7]).unwrap().sign(&key, None);

        // Unpaired device.
        assert!(matches!(
            sim.handle_frame(DEVICE, &signed.serialize()),
            Err(PumpError::NotAuthenticated(_))
        ));

        sim.sessions().create(DEVICE, [4; 32]);
        assert!(matches!(
            sim.handle_frame(DEVICE, &signed.serialize()),
            Err(PumpError::HmacMismatch { opcode: 0x90 })
        ));

        // Correct key gets past verification to dispatch.
        sim.sessions().create(DEVICE, key);
        assert!(matches!(
            sim.handle_frame(DEVICE, &signed.serialize()),
            Err(PumpError::NoHandler(0x90))
        ));
    }

    #[test]
    fn test_auth_messages_need_pairing_in_progress() {
        let mut sim = PumpSimulator::builder().build().unwrap();
        let frame = [38, 0, 2, 0, 0];

        let err = sim.handle_frame(DEVICE, &frame).unwrap_err();
        assert!(matches!(err, PumpError::ProtocolSequenceError { .. }));

        sim.start_pairing("other-device");
        assert!(sim.handle_frame(DEVICE, &frame).is_err());
        assert_eq!(sim.authenticator().state(), AuthState::WaitingForPairingCode);
    }

    #[test]
    fn test_begin_jpake_emits_round1() {
        let mut sim = PumpSimulator::builder().build().unwrap();
        sim.start_pairing(DEVICE);

        let frames = sim.begin_jpake(DEVICE).unwrap();
        assert_eq!(frames.len(), 1);

        let body = strip(&frames[0]);
        assert_eq!(body[0], 32);
        assert_eq!(body[2] as usize, 167);
        assert_eq!(sim.authenticator().state(), AuthState::JpakeRound1Sent);
    }

    #[test]
    fn test_tick_raises_alerts() {
        let mut sim = PumpSimulator::builder().build().unwrap();
        sim.state_mut().update_battery(10);

        assert_eq!(sim.tick(60), vec![1]);
        assert_eq!(sim.events().pending(false).len(), 1);
        assert_eq!(sim.state().time_since_reset, 60);

        sim.events_mut().acknowledge_all();
        assert!(sim.events().pending(false).is_empty());
    }

    #[test]
    fn test_unpair() {
        let mut sim = PumpSimulator::builder().build().unwrap();
        sim.sessions().create(DEVICE, [1; 32]);
        assert!(sim.unpair(DEVICE));
        assert!(!sim.unpair(DEVICE));
    }
}
