//! Pairing and session management.
//!
//! - [`PairingManager`] - issues and checks the 6-digit pairing code
//! - [`SessionStore`] - paired devices and their session keys
//! - [`Authenticator`] - walks one device through the challenge probe and
//!   the J-PAKE rounds, creating a session on success

mod authenticator;
mod pairing;
mod session;

pub use authenticator::{AuthState, AuthStatus, Authenticator};
pub use pairing::{
    PairingManager, PairingStatus, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAIRING_TIMEOUT,
    PAIRING_CODE_DIGITS,
};
pub use session::{PairingSession, SessionKey, SessionStore, SessionSummary};
