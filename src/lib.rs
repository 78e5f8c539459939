//! # tandem-sim
//!
//! Wire protocol and pairing core for a virtual Tandem insulin pump.
//!
//! The crate plays the pump side of the BLE protocol: it reassembles chunks
//! written by a phone app, parses framed messages, runs the J-PAKE pairing
//! handshake and answers status requests.
//!
//! ## Architecture
//!
//! ```text
//! chunks ─► Packetizer ─► MessageCatalog ─► PumpSimulator ─┬─► Authenticator ─► JpakeEngine
//!   ▲          (CRC)        (typed parse)     (dispatch)   │        │
//!   │                                                      │        ▼
//!   │                                                      │   SessionStore
//!   │                                                      └─► PumpState / EventQueue
//!   └──── Packetizer ◄── Message::to_wire ◄── replies + follow-ups (signed where required)
//! ```
//!
//! - [`protocol`] - header, CRC16, HMAC-SHA1 auth block, chunking
//! - [`messages`] - typed payload layouts and the opcode catalog
//! - [`jpake`] - EC J-PAKE over P-256 with Schnorr proofs
//! - [`auth`] - pairing codes, handshake state machine, paired sessions
//! - [`pump`] - simulated pump state and alert queue
//! - [`transport`] - async link feeding a simulator one characteristic at a time
//!
//! ## Example
//!
//! ```
//! use tandem_sim::PumpSimulator;
//!
//! let mut simulator = PumpSimulator::builder()
//!     .serial_number(90_556_643)
//!     .build()
//!     .unwrap();
//!
//! let code = simulator.start_pairing("AA:BB:CC:DD:EE:FF");
//! assert_eq!(code.len(), 6);
//!
//! // Pump sends J-PAKE round 1 as soon as the app is ready.
//! let frames = simulator.begin_jpake("AA:BB:CC:DD:EE:FF").unwrap();
//! assert_eq!(frames[0][0], 32);
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod jpake;
pub mod messages;
pub mod protocol;
pub mod pump;
pub mod transport;

mod simulator;

pub use auth::{AuthState, Authenticator};
pub use config::SimulatorConfig;
pub use error::{PumpError, Result};
pub use messages::MessageCatalog;
pub use simulator::{PumpSimulator, SimulatorBuilder};
