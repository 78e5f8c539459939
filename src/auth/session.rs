//! Paired-device session store.
//!
//! One session per device address, created after successful key
//! confirmation. Entries live in a `DashMap` so links for different devices
//! never contend on a shared lock.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::jpake::SESSION_KEY_SIZE;

/// Zeroized-on-drop session key.
pub type SessionKey = Zeroizing<[u8; SESSION_KEY_SIZE]>;

/// A paired device.
pub struct PairingSession {
    /// Device address.
    pub device: String,
    key: SessionKey,
    /// Created time.
    pub created_at: Instant,
    /// Wall-clock pairing time, seconds since the Unix epoch.
    pub paired_at: u64,
    /// Last activity time.
    pub last_seen: Instant,
}

impl PairingSession {
    fn new(device: &str, key: [u8; SESSION_KEY_SIZE]) -> Self {
        let now = Instant::now();
        Self {
            device: device.to_string(),
            key: Zeroizing::new(key),
            created_at: now,
            paired_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            last_seen: now,
        }
    }

    /// Session key.
    pub fn key(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }

    /// Summary without key material.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            device: self.device.clone(),
            paired_at: self.paired_at,
            idle_secs: self.last_seen.elapsed().as_secs(),
        }
    }
}

impl std::fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingSession")
            .field("device", &self.device)
            .field("paired_at", &self.paired_at)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub device: String,
    pub paired_at: u64,
    pub idle_secs: u64,
}

/// Sessions keyed by device address.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, PairingSession>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Store a session for `device`, replacing any previous one.
    pub fn create(&self, device: &str, key: [u8; SESSION_KEY_SIZE]) {
        let replaced = self
            .sessions
            .insert(device.to_string(), PairingSession::new(device, key))
            .is_some();
        tracing::info!(device, replaced, "Pairing session created");
    }

    /// Summary of the session for `device`.
    pub fn get(&self, device: &str) -> Option<SessionSummary> {
        self.sessions.get(device).map(|s| s.summary())
    }

    /// Copy of the session key for `device`.
    pub fn session_key(&self, device: &str) -> Option<SessionKey> {
        self.sessions
            .get(device)
            .map(|entry| Zeroizing::new(*entry.value().key()))
    }

    /// Mark `device` as active now. Returns false if it is not paired.
    pub fn touch(&self, device: &str) -> bool {
        match self.sessions.get_mut(device) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Unpair `device`.
    pub fn remove(&self, device: &str) -> bool {
        let removed = self.sessions.remove(device).is_some();
        if removed {
            tracing::info!(device, "Pairing session removed");
        }
        removed
    }

    /// Whether `device` has a session.
    pub fn is_paired(&self, device: &str) -> bool {
        self.sessions.contains_key(device)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no device is paired.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Summaries of all sessions, sorted by device.
    pub fn paired_devices(&self) -> Vec<SessionSummary> {
        let mut devices: Vec<SessionSummary> =
            self.sessions.iter().map(|entry| entry.summary()).collect();
        devices.sort_by(|a, b| a.device.cmp(&b.device));
        devices
    }

    /// Remove sessions idle for at least `max_idle`. Returns how many were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_seen.elapsed() < max_idle);
        let swept = before.saturating_sub(self.sessions.len());
        if swept > 0 {
            tracing::info!("Swept {} idle pairing sessions", swept);
        }
        swept
    }
}
