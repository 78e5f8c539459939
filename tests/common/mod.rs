//! Shared test helpers: an app-side peer that pairs with the simulator
//! using nothing but wire frames.

#![allow(dead_code)]

use std::collections::VecDeque;

use bytes::Bytes;
use tandem_sim::jpake::{JpakeEngine, KeyKp, Role};
use tandem_sim::messages::*;
use tandem_sim::protocol::{crc, signing};
use tandem_sim::{PumpSimulator, Result};

pub const DEVICE: &str = "AA:BB:CC:DD:EE:FF";
pub const APP_INSTANCE_ID: u16 = 0x0107;

/// Strip and check the CRC of a pump frame, then parse it.
pub fn parse_reply(frame: &[u8]) -> ParsedMessage {
    let (ok, body) = crc::verify_and_strip(frame);
    assert!(ok, "pump frame has a bad CRC: {:02x?}", frame);
    MessageCatalog::standard().parse_message(body).unwrap()
}

/// Frame a message from the app with CRC.
pub fn app_frame<T: PumpMessage>(message: &T, tx: u8) -> Vec<u8> {
    message.to_message(tx).unwrap().to_wire()
}

/// Phone app side of pairing, driven by pump frames.
pub struct AppPeer {
    code: String,
    engine: JpakeEngine,
    tx: u8,
    g1: Option<KeyKp>,
    g4: Option<KeyKp>,
    /// Outcome of the challenge probe as reported by the pump.
    pub probe_success: Option<bool>,
    /// Whether the pump's key confirmation checked out.
    pub pump_confirmed: Option<bool>,
    /// Set once the final confirmation has been sent.
    pub finished: bool,
    /// Pump frames the peer did not consume.
    pub unhandled: Vec<MessageKind>,
}

impl AppPeer {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            engine: JpakeEngine::new(Role::App, code),
            tx: 0,
            g1: None,
            g4: None,
            probe_success: None,
            pump_confirmed: None,
            finished: false,
            unhandled: Vec::new(),
        }
    }

    fn frame<T: PumpMessage>(&mut self, message: &T) -> Vec<u8> {
        let frame = app_frame(message, self.tx);
        self.tx = self.tx.wrapping_add(1);
        frame
    }

    /// Session key once derived.
    pub fn session_key(&self) -> Option<[u8; 32]> {
        self.engine.session_key()
    }

    /// First frame of the challenge probe.
    pub fn central_challenge(&mut self) -> Vec<u8> {
        self.frame(&CentralChallengeRequest {
            app_instance_id: APP_INSTANCE_ID,
            central_challenge: [0x5C; NONCE_SIZE],
        })
    }

    /// React to one pump frame; returns the frames to send back.
    pub fn on_frame(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        match parse_reply(frame).kind {
            MessageKind::CentralChallengeResponse(resp) => {
                let hash = signing::hmac_sha1(self.code.as_bytes(), &resp.hmac_key);
                vec![self.frame(&PumpChallengeRequest {
                    app_instance_id: APP_INSTANCE_ID,
                    pump_challenge_hash: hash,
                })]
            }
            MessageKind::PumpChallengeResponse(resp) => {
                self.probe_success = Some(resp.success);
                Vec::new()
            }
            MessageKind::Jpake1aRequest(req) => {
                self.g1 = Some(KeyKp::decode(&req.central_challenge).unwrap());
                let (g3, g4) = self.engine.generate_round1().unwrap();
                self.g4 = Some(g4);
                vec![
                    self.frame(&Jpake1aResponse {
                        app_instance_id: APP_INSTANCE_ID,
                        central_challenge_hash: g3.encode().unwrap(),
                    }),
                    self.frame(&Jpake1bRequest {
                        app_instance_id: APP_INSTANCE_ID,
                        central_challenge: g4.encode().unwrap(),
                    }),
                ]
            }
            MessageKind::Jpake1bResponse(resp) => {
                let g2 = KeyKp::decode(&resp.central_challenge_hash).unwrap();
                let g1 = self.g1.expect("1a before 1b");
                self.engine.process_round1(&g1, &g2).unwrap();
                Vec::new()
            }
            MessageKind::Jpake2Request(req) => {
                let b = self.engine.generate_round2().unwrap();
                self.engine
                    .process_round2(&KeyKp::decode_round2(&req.data).unwrap())
                    .unwrap();
                vec![
                    self.frame(&Jpake2Response {
                        app_instance_id: APP_INSTANCE_ID,
                        data: Bytes::copy_from_slice(&b.encode().unwrap()),
                    }),
                    self.frame(&Jpake3SessionKeyRequest { challenge_param: 0 }),
                ]
            }
            MessageKind::Jpake3SessionKeyResponse(_) => {
                self.engine.derive_session_key().unwrap();
                Vec::new()
            }
            MessageKind::Jpake4KeyConfirmationRequest(req) => {
                let confirmed = self
                    .engine
                    .verify_key_confirmation(&req.hash_digest, Role::Pump, &req.nonce, &req.reserved)
                    .unwrap();
                self.pump_confirmed = Some(confirmed);

                let nonce = req.nonce;
                let reserved = [0; NONCE_SIZE];
                let digest = self.engine.generate_key_confirmation(&nonce, &reserved).unwrap();
                self.finished = true;
                vec![self.frame(&Jpake4KeyConfirmationResponse {
                    app_instance_id: APP_INSTANCE_ID,
                    nonce,
                    reserved,
                    hash_digest: digest,
                })]
            }
            other => {
                self.unhandled.push(other);
                Vec::new()
            }
        }
    }

    /// Run the exchange against a simulator starting from `initial` pump
    /// frames, stopping at the first frame the pump rejects.
    pub fn drive(
        &mut self,
        simulator: &mut PumpSimulator,
        device: &str,
        initial: Vec<Vec<u8>>,
    ) -> Result<()> {
        let mut pending: VecDeque<Vec<u8>> = initial.into();
        while let Some(pump_frame) = pending.pop_front() {
            for app_frame in self.on_frame(&pump_frame) {
                let (ok, body) = crc::verify_and_strip(&app_frame);
                assert!(ok);
                pending.extend(simulator.handle_frame(device, body)?);
            }
        }
        Ok(())
    }

    /// Full pairing including the challenge probe.
    pub fn pair_with_probe(&mut self, simulator: &mut PumpSimulator, device: &str) -> Result<()> {
        let first = self.central_challenge();
        let (_, body) = crc::verify_and_strip(&first);
        let replies = simulator.handle_frame(device, body)?;
        self.drive(simulator, device, replies)
    }
}
