//! Simulated pump model: delivery state and the pending-event queue.

mod events;
mod state;

pub use events::{
    EventCondition, EventQueue, EventType, PumpEvent, Severity, LOW_BATTERY_PERCENT,
    LOW_INSULIN_MILLIUNITS,
};
pub use state::{firmware_version_number, ActiveBolus, PumpState, FULL_RESERVOIR};
