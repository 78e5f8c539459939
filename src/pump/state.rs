//! Simulated pump state.
//!
//! Volumes are in milliunits of insulin, rates in milliunits per hour and
//! times in seconds since pump reset, matching the status message fields.

use serde::{Deserialize, Serialize};

use crate::messages::{
    BolusStatus, CurrentBatteryV1Response, CurrentBolusStatusResponse, PumpVersionResponse,
};

/// Full reservoir, 300 U.
pub const FULL_RESERVOIR: u32 = 300_000;

/// Bolus being delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBolus {
    pub id: u16,
    /// Milliunits.
    pub requested_volume: u32,
    /// Seconds since reset when delivery started.
    pub started_at: u32,
    pub source_id: u8,
    pub type_bitmask: u8,
}

/// Battery, insulin and delivery state of the simulated pump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpState {
    pub battery_percent: u8,
    /// Milliunits per hour.
    pub basal_rate: u32,
    /// Milliunits.
    pub reservoir: u32,
    pub active_bolus: Option<ActiveBolus>,
    pub suspended: bool,
    pub time_since_reset: u32,
    pub serial_number: u32,
    pub firmware_version: String,
    last_bolus_id: u16,
}

impl PumpState {
    /// Fresh pump: full battery and reservoir, no basal programmed.
    pub fn new(serial_number: u32, firmware_version: &str) -> Self {
        Self {
            battery_percent: 100,
            basal_rate: 0,
            reservoir: FULL_RESERVOIR,
            active_bolus: None,
            suspended: false,
            time_since_reset: 0,
            serial_number,
            firmware_version: firmware_version.to_string(),
            last_bolus_id: 0,
        }
    }

    /// Set battery charge, clamped to 100.
    pub fn update_battery(&mut self, percent: u8) {
        self.battery_percent = percent.min(100);
    }

    /// Set the basal rate in milliunits per hour.
    pub fn set_basal_rate(&mut self, rate: u32) {
        self.basal_rate = rate;
    }

    /// Start a bolus and return its id.
    ///
    /// Returns `None` while suspended or if a bolus is already running.
    pub fn start_bolus(&mut self, volume: u32, source_id: u8, type_bitmask: u8) -> Option<u16> {
        if self.suspended || self.active_bolus.is_some() {
            return None;
        }

        self.last_bolus_id = self.last_bolus_id.wrapping_add(1).max(1);
        self.active_bolus = Some(ActiveBolus {
            id: self.last_bolus_id,
            requested_volume: volume,
            started_at: self.time_since_reset,
            source_id,
            type_bitmask,
        });
        tracing::debug!("Bolus {} started: {} mU", self.last_bolus_id, volume);
        Some(self.last_bolus_id)
    }

    /// Finish the running bolus, drawing its volume from the reservoir.
    pub fn complete_bolus(&mut self) -> Option<ActiveBolus> {
        let bolus = self.active_bolus.take()?;
        self.reservoir = self.reservoir.saturating_sub(bolus.requested_volume);
        tracing::debug!("Bolus {} complete", bolus.id);
        Some(bolus)
    }

    /// Stop delivery. A running bolus is cancelled.
    pub fn suspend(&mut self) {
        self.suspended = true;
        if let Some(bolus) = self.active_bolus.take() {
            tracing::debug!("Bolus {} cancelled by suspend", bolus.id);
        }
    }

    /// Resume delivery.
    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Advance the clock, delivering basal insulin while not suspended.
    pub fn tick(&mut self, seconds: u32) {
        self.time_since_reset = self.time_since_reset.saturating_add(seconds);
        if !self.suspended {
            let delivered = u64::from(self.basal_rate) * u64::from(seconds) / 3600;
            self.reservoir = self
                .reservoir
                .saturating_sub(u32::try_from(delivered).unwrap_or(u32::MAX));
        }
    }

    /// Battery response. Both charge fields report the same percentage.
    pub fn battery_response(&self) -> CurrentBatteryV1Response {
        CurrentBatteryV1Response {
            battery_abc: self.battery_percent,
            battery_ibc: self.battery_percent,
        }
    }

    /// Bolus status response; all zeros when no bolus is running.
    pub fn bolus_status_response(&self) -> CurrentBolusStatusResponse {
        match &self.active_bolus {
            Some(bolus) => CurrentBolusStatusResponse {
                status_id: BolusStatus::Delivering as u8,
                bolus_id: bolus.id,
                timestamp: bolus.started_at,
                requested_volume: bolus.requested_volume,
                bolus_source_id: bolus.source_id,
                bolus_type_bitmask: bolus.type_bitmask,
            },
            None => CurrentBolusStatusResponse::default(),
        }
    }

    /// Version response for this pump.
    pub fn version_response(&self, model_number: u32) -> PumpVersionResponse {
        let version = firmware_version_number(&self.firmware_version);
        PumpVersionResponse {
            arm_sw_ver: version,
            msp_sw_ver: version,
            config_a_bits: 0,
            config_b_bits: 0,
            serial_num: self.serial_number,
            part_num: 0,
            pump_rev: self.firmware_version.clone(),
            pcba_sn: self.serial_number,
            pcba_rev: "0".to_string(),
            model_num: model_number,
        }
    }
}

impl Default for PumpState {
    fn default() -> Self {
        Self::new(0, "7.7.1")
    }
}

/// `"major.minor.patch"` as `major·1_000_000 + minor·10_000 + patch`.
///
/// Missing or non-numeric components count as zero.
pub fn firmware_version_number(version: &str) -> u32 {
    let mut parts = version
        .split('.')
        .map(|p| p.trim().parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);

    major
        .saturating_mul(1_000_000)
        .saturating_add(minor.saturating_mul(10_000))
        .saturating_add(patch)
}
