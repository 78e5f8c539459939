//! Signed-message authentication block.
//!
//! Post-handshake messages carry a 24-byte trailer:
//! ```text
//! ┌─────────────┬──────────────────────────┐
//! │ Timestamp   │ HMAC-SHA1                │
//! │ 4 bytes LE  │ 20 bytes                 │
//! └─────────────┴──────────────────────────┘
//! ```
//!
//! The MAC is computed over `message || timestamp_bytes` with the session
//! key. Verification is constant-time.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::wire_format::AUTH_BLOCK_SIZE;

type HmacSha1 = Hmac<Sha1>;

/// Timestamp prefix length.
pub const TIMESTAMP_SIZE: usize = 4;

/// HMAC-SHA1 output length.
pub const MAC_SIZE: usize = 20;

/// Current wall-clock time in seconds, truncated to 32 bits.
pub fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn mac_for(key: &[u8], message: &[u8], timestamp: [u8; TIMESTAMP_SIZE]) -> HmacSha1 {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.update(&timestamp);
    mac
}

/// Plain HMAC-SHA1 of `data` under `key`.
pub fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; MAC_SIZE] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);

    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Build an auth block for `message`.
///
/// Uses the current wall-clock time when `timestamp` is `None`.
pub fn create(key: &[u8], message: &[u8], timestamp: Option<u32>) -> [u8; AUTH_BLOCK_SIZE] {
    let timestamp = timestamp.unwrap_or_else(unix_timestamp).to_le_bytes();
    let tag = mac_for(key, message, timestamp).finalize().into_bytes();

    let mut block = [0u8; AUTH_BLOCK_SIZE];
    block[..TIMESTAMP_SIZE].copy_from_slice(&timestamp);
    block[TIMESTAMP_SIZE..].copy_from_slice(&tag);
    block
}

/// Validate an auth block against `message`.
///
/// Returns `(valid, timestamp)`. The timestamp is returned even on failure
/// for logging. When `max_time_diff` is set, blocks whose timestamp is more
/// than that many seconds away from now are rejected.
pub fn validate(
    key: &[u8],
    message: &[u8],
    auth_block: &[u8; AUTH_BLOCK_SIZE],
    max_time_diff: Option<u32>,
) -> (bool, u32) {
    let mut ts = [0u8; TIMESTAMP_SIZE];
    ts.copy_from_slice(&auth_block[..TIMESTAMP_SIZE]);
    let timestamp = u32::from_le_bytes(ts);

    let mac_ok = mac_for(key, message, ts)
        .verify_slice(&auth_block[TIMESTAMP_SIZE..])
        .is_ok();

    let fresh = match max_time_diff {
        Some(max) => unix_timestamp().abs_diff(timestamp) <= max,
        None => true,
    };

    (mac_ok && fresh, timestamp)
}
