//! Simulator configuration.
//!
//! Every field has a default, so a JSON file only needs the fields it
//! changes:
//!
//! ```
//! use tandem_sim::config::SimulatorConfig;
//!
//! let config = SimulatorConfig::from_json_str(r#"{ "serial_number": 12345678 }"#).unwrap();
//! assert_eq!(config.serial_number, 12345678);
//! assert_eq!(config.chunk_size, 18);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PumpError, Result};
use crate::protocol::{CONTROL_CHUNK_SIZE, DEFAULT_CHUNK_SIZE};

/// Settings for a [`PumpSimulator`](crate::PumpSimulator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Pump serial number.
    pub serial_number: u32,
    /// Model number reported in the version response.
    pub model_number: u32,
    /// Firmware version, `major.minor.patch`.
    pub firmware_version: String,
    /// Pairing code validity in seconds.
    pub pairing_timeout_secs: u64,
    /// Attempts allowed per pairing code.
    pub max_pairing_attempts: u32,
    /// Chunk size on the regular characteristics.
    pub chunk_size: usize,
    /// Chunk size on the control characteristics.
    pub control_chunk_size: usize,
    /// Maximum clock skew for signed messages; `None` skips the check.
    pub max_signature_age_secs: Option<u32>,
    /// Status requests need a paired session.
    pub require_authentication: bool,
    /// Capacity of each link channel.
    pub link_channel_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            serial_number: 0,
            model_number: 1_000_096,
            firmware_version: "7.7.1".to_string(),
            pairing_timeout_secs: 60,
            max_pairing_attempts: 3,
            chunk_size: DEFAULT_CHUNK_SIZE,
            control_chunk_size: CONTROL_CHUNK_SIZE,
            max_signature_age_secs: None,
            require_authentication: true,
            link_channel_capacity: 64,
        }
    }
}

impl SimulatorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Json` if it does not parse,
    /// `Config` if a value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading simulator config from {:?}", path);
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the simulator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.control_chunk_size == 0 {
            return Err(PumpError::Config("chunk sizes must be non-zero".into()));
        }
        if self.max_pairing_attempts == 0 {
            return Err(PumpError::Config(
                "max_pairing_attempts must be at least 1".into(),
            ));
        }
        if self.link_channel_capacity == 0 {
            return Err(PumpError::Config(
                "link_channel_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Pairing code validity.
    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_secs)
    }
}
