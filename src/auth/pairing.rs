//! Pairing code issuance and verification.
//!
//! A code is usable while it is younger than the timeout and has attempts
//! left. Every comparison consumes an attempt. Expired or exhausted codes
//! are cleared the next time they are touched.

use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{PumpError, Result};

/// Digits in a pairing code.
pub const PAIRING_CODE_DIGITS: usize = 6;

/// Default validity window.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(60);

/// Default attempts per code.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

struct PairingCode {
    code: Zeroizing<String>,
    issued_at: Instant,
    attempts_used: u32,
}

/// Snapshot of the pairing code without the code itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingStatus {
    pub active: bool,
    pub remaining_secs: u64,
    pub remaining_attempts: u32,
}

/// Issues and checks the 6-digit pairing code.
pub struct PairingManager {
    timeout: Duration,
    max_attempts: u32,
    current: Option<PairingCode>,
}

impl PairingManager {
    /// Create a manager with the given validity window and attempt limit.
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts,
            current: None,
        }
    }

    /// Issue a fresh code, replacing any previous one.
    pub fn generate_code(&mut self) -> String {
        let value: u32 = OsRng.gen_range(0..1_000_000);
        let code = format!("{:0width$}", value, width = PAIRING_CODE_DIGITS);

        self.current = Some(PairingCode {
            code: Zeroizing::new(code.clone()),
            issued_at: Instant::now(),
            attempts_used: 0,
        });
        tracing::debug!("Issued pairing code valid for {:?}", self.timeout);
        code
    }

    fn is_expired(&self, code: &PairingCode) -> bool {
        code.issued_at.elapsed() >= self.timeout
    }

    fn is_exhausted(&self, code: &PairingCode) -> bool {
        code.attempts_used >= self.max_attempts
    }

    /// Compare `candidate` against the active code.
    ///
    /// # Errors
    ///
    /// - `NoActivePairingCode` if none was issued
    /// - `PairingCodeExpired` / `PairingAttemptsExhausted` (the code is cleared)
    /// - `InvalidPairingCode` with the attempts left after this one
    pub fn verify_code(&mut self, candidate: &str) -> Result<()> {
        let current = self.current.as_ref().ok_or(PumpError::NoActivePairingCode)?;

        if self.is_expired(current) {
            self.current = None;
            return Err(PumpError::PairingCodeExpired);
        }
        if self.is_exhausted(current) {
            self.current = None;
            return Err(PumpError::PairingAttemptsExhausted);
        }

        let max_attempts = self.max_attempts;
        let current = self.current.as_mut().ok_or(PumpError::NoActivePairingCode)?;
        current.attempts_used += 1;

        let matches: bool = current.code.as_bytes().ct_eq(candidate.as_bytes()).into();
        if matches {
            self.current = None;
            tracing::debug!("Pairing code accepted");
            return Ok(());
        }

        let remaining = max_attempts.saturating_sub(current.attempts_used);
        tracing::warn!("Pairing code rejected, {} attempts remaining", remaining);
        Err(PumpError::InvalidPairingCode { remaining })
    }

    /// The active code, or the reason it cannot be used.
    ///
    /// # Errors
    ///
    /// - `NoActivePairingCode` if none was issued
    /// - `PairingCodeExpired` / `PairingAttemptsExhausted` (the code is cleared)
    pub fn require_usable(&mut self) -> Result<String> {
        let current = self.current.as_ref().ok_or(PumpError::NoActivePairingCode)?;

        let err = if self.is_expired(current) {
            PumpError::PairingCodeExpired
        } else if self.is_exhausted(current) {
            PumpError::PairingAttemptsExhausted
        } else {
            return Ok(current.code.to_string());
        };

        tracing::debug!("Clearing unusable pairing code: {}", err);
        self.current = None;
        Err(err)
    }

    /// The active code, if it is still usable.
    pub fn current_code(&mut self) -> Option<String> {
        self.discard_unusable();
        self.current.as_ref().map(|c| c.code.to_string())
    }

    /// Time left before the code expires.
    pub fn remaining_time(&self) -> Duration {
        self.current
            .as_ref()
            .map(|c| self.timeout.saturating_sub(c.issued_at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Attempts left on the active code.
    pub fn remaining_attempts(&self) -> u32 {
        self.current
            .as_ref()
            .map(|c| self.max_attempts.saturating_sub(c.attempts_used))
            .unwrap_or(0)
    }

    /// Whether a usable code exists.
    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| !self.is_expired(c) && !self.is_exhausted(c))
    }

    /// Drop the active code.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Serializable snapshot.
    pub fn status(&self) -> PairingStatus {
        let active = self.is_active();
        PairingStatus {
            active,
            remaining_secs: if active { self.remaining_time().as_secs() } else { 0 },
            remaining_attempts: if active { self.remaining_attempts() } else { 0 },
        }
    }

    fn discard_unusable(&mut self) {
        if self.current.is_some() && !self.is_active() {
            tracing::debug!("Clearing unusable pairing code");
            self.current = None;
        }
    }
}

impl Default for PairingManager {
    fn default() -> Self {
        Self::new(DEFAULT_PAIRING_TIMEOUT, DEFAULT_MAX_ATTEMPTS)
    }
}

impl std::fmt::Debug for PairingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingManager")
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("active", &self.is_active())
            .finish()
    }
}
