//! Current-status messages.
//!
//! Requests are empty; responses are fixed layouts:
//!
//! ```text
//! 45 CurrentBolusStatusResponse (15)
//!    status(1) bolus_id(2) pad(2) timestamp(4) volume(4) source(1) type(1)
//! 53 CurrentBatteryV1Response (2)
//!    abc(1) ibc(1)
//! 85 PumpVersionResponse (48)
//!    arm(4) msp(4) cfgA(4) cfgB(4) serial(4) part(4) pump_rev(8)
//!    pcba_sn(4) pcba_rev(8) model(4)
//! ```

use bytes::Bytes;
use serde::Serialize;

use super::{require_size, PumpMessage};
use crate::codec::{FieldCodec, PayloadWriter};
use crate::error::Result;

/// Defines an empty-payload request.
macro_rules! empty_request {
    ($(#[$doc:meta])* $name:ident, $opcode:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl PumpMessage for $name {
            const OPCODE: u8 = $opcode;
            const NAME: &'static str = stringify!($name);

            fn encode_payload(&self) -> Bytes {
                Bytes::new()
            }

            fn decode_payload(_payload: &[u8]) -> Result<Self> {
                Ok(Self)
            }
        }
    };
}

empty_request!(
    /// Ask for the active bolus.
    CurrentBolusStatusRequest, 44
);
empty_request!(
    /// Ask for battery charge.
    CurrentBatteryV1Request, 52
);
empty_request!(
    /// Ask for firmware and hardware identification.
    PumpVersionRequest, 84
);

/// Bolus status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum BolusStatus {
    AlreadyDeliveredOrInvalid = 0,
    Delivering = 1,
    Requesting = 2,
}

impl BolusStatus {
    /// Map a wire status id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(BolusStatus::AlreadyDeliveredOrInvalid),
            1 => Some(BolusStatus::Delivering),
            2 => Some(BolusStatus::Requesting),
            _ => None,
        }
    }
}

/// Active bolus snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CurrentBolusStatusResponse {
    pub status_id: u8,
    pub bolus_id: u16,
    /// Seconds since pump reset.
    pub timestamp: u32,
    /// Milliunits.
    pub requested_volume: u32,
    pub bolus_source_id: u8,
    pub bolus_type_bitmask: u8,
}

impl CurrentBolusStatusResponse {
    /// Decoded status, `None` for unknown ids.
    pub fn status(&self) -> Option<BolusStatus> {
        BolusStatus::from_id(self.status_id)
    }

    /// False for the all-zero "no bolus" record.
    pub fn is_valid(&self) -> bool {
        !(self.status_id == 0 && self.bolus_id == 0 && self.timestamp == 0)
    }
}

impl PumpMessage for CurrentBolusStatusResponse {
    const OPCODE: u8 = 45;
    const NAME: &'static str = "CurrentBolusStatusResponse";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(15)
            .u8(self.status_id)
            .u16(self.bolus_id)
            .zeros(2)
            .u32(self.timestamp)
            .u32(self.requested_volume)
            .u8(self.bolus_source_id)
            .u8(self.bolus_type_bitmask)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 15)?;
        Ok(Self {
            status_id: FieldCodec::read_u8(payload, 0)?,
            bolus_id: FieldCodec::read_u16(payload, 1)?,
            timestamp: FieldCodec::read_u32(payload, 5)?,
            requested_volume: FieldCodec::read_u32(payload, 9)?,
            bolus_source_id: FieldCodec::read_u8(payload, 13)?,
            bolus_type_bitmask: FieldCodec::read_u8(payload, 14)?,
        })
    }
}

/// Battery charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentBatteryV1Response {
    pub battery_abc: u8,
    pub battery_ibc: u8,
}

impl PumpMessage for CurrentBatteryV1Response {
    const OPCODE: u8 = 53;
    const NAME: &'static str = "CurrentBatteryV1Response";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(2)
            .u8(self.battery_abc)
            .u8(self.battery_ibc)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 2)?;
        Ok(Self {
            battery_abc: FieldCodec::read_u8(payload, 0)?,
            battery_ibc: FieldCodec::read_u8(payload, 1)?,
        })
    }
}

/// Width of the revision string fields.
pub const REVISION_SIZE: usize = 8;

/// Firmware and hardware identification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PumpVersionResponse {
    pub arm_sw_ver: u32,
    pub msp_sw_ver: u32,
    pub config_a_bits: u32,
    pub config_b_bits: u32,
    pub serial_num: u32,
    pub part_num: u32,
    pub pump_rev: String,
    pub pcba_sn: u32,
    pub pcba_rev: String,
    pub model_num: u32,
}

impl PumpMessage for PumpVersionResponse {
    const OPCODE: u8 = 85;
    const NAME: &'static str = "PumpVersionResponse";

    fn encode_payload(&self) -> Bytes {
        PayloadWriter::with_capacity(48)
            .u32(self.arm_sw_ver)
            .u32(self.msp_sw_ver)
            .u32(self.config_a_bits)
            .u32(self.config_b_bits)
            .u32(self.serial_num)
            .u32(self.part_num)
            .string(&self.pump_rev, REVISION_SIZE)
            .u32(self.pcba_sn)
            .string(&self.pcba_rev, REVISION_SIZE)
            .u32(self.model_num)
            .finish()
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        require_size(Self::NAME, payload, 48)?;
        Ok(Self {
            arm_sw_ver: FieldCodec::read_u32(payload, 0)?,
            msp_sw_ver: FieldCodec::read_u32(payload, 4)?,
            config_a_bits: FieldCodec::read_u32(payload, 8)?,
            config_b_bits: FieldCodec::read_u32(payload, 12)?,
            serial_num: FieldCodec::read_u32(payload, 16)?,
            part_num: FieldCodec::read_u32(payload, 20)?,
            pump_rev: FieldCodec::read_string(payload, 24, REVISION_SIZE)?,
            pcba_sn: FieldCodec::read_u32(payload, 32)?,
            pcba_rev: FieldCodec::read_string(payload, 36, REVISION_SIZE)?,
            model_num: FieldCodec::read_u32(payload, 44)?,
        })
    }
}
