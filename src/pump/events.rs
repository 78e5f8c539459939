//! Pending alerts, alarms and notifications.

use serde::Serialize;

use super::state::PumpState;

/// Battery percentage below which a low-battery alert is raised.
pub const LOW_BATTERY_PERCENT: u8 = 20;

/// Reservoir level (milliunits) below which a low-insulin alert is raised.
pub const LOW_INSULIN_MILLIUNITS: u32 = 30_000;

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum EventType {
    Alert = 1,
    Alarm = 2,
    Notification = 3,
    StatusChange = 4,
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What raised an event, used to avoid duplicate alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCondition {
    LowBattery,
    LowInsulin,
    Occlusion,
    BolusComplete,
    Other,
}

/// A pending event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PumpEvent {
    pub id: u32,
    pub event_type: EventType,
    pub condition: EventCondition,
    pub severity: Severity,
    pub message: String,
    /// Seconds since pump reset.
    pub timestamp: u32,
    pub acknowledged: bool,
}

/// Queue of events awaiting acknowledgement.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<PumpEvent>,
    last_id: u32,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event and return its id. Ids start at 1.
    pub fn push(
        &mut self,
        event_type: EventType,
        condition: EventCondition,
        severity: Severity,
        message: impl Into<String>,
        timestamp: u32,
    ) -> u32 {
        self.last_id += 1;
        let event = PumpEvent {
            id: self.last_id,
            event_type,
            condition,
            severity,
            message: message.into(),
            timestamp,
            acknowledged: false,
        };

        match severity {
            Severity::Info => tracing::info!(id = event.id, "{}", event.message),
            Severity::Warning | Severity::Critical => {
                tracing::warn!(id = event.id, ?severity, "{}", event.message)
            }
        }

        self.events.push(event);
        self.last_id
    }

    pub fn low_battery_alert(&mut self, state: &PumpState) -> u32 {
        self.push(
            EventType::Alert,
            EventCondition::LowBattery,
            Severity::Warning,
            format!("Low battery: {}%", state.battery_percent),
            state.time_since_reset,
        )
    }

    pub fn low_insulin_alert(&mut self, state: &PumpState) -> u32 {
        self.push(
            EventType::Alert,
            EventCondition::LowInsulin,
            Severity::Warning,
            format!(
                "Low insulin: {}.{:03}U remaining",
                state.reservoir / 1000,
                state.reservoir % 1000
            ),
            state.time_since_reset,
        )
    }

    pub fn occlusion_alarm(&mut self, state: &PumpState) -> u32 {
        self.push(
            EventType::Alarm,
            EventCondition::Occlusion,
            Severity::Critical,
            "Occlusion detected - delivery stopped",
            state.time_since_reset,
        )
    }

    /// Notification for a finished bolus of `volume` milliunits.
    pub fn bolus_complete_notification(&mut self, state: &PumpState, volume: u32) -> u32 {
        self.push(
            EventType::Notification,
            EventCondition::BolusComplete,
            Severity::Info,
            format!("Bolus complete: {}.{:03}U delivered", volume / 1000, volume % 1000),
            state.time_since_reset,
        )
    }

    fn has_unacknowledged(&self, condition: EventCondition) -> bool {
        self.events
            .iter()
            .any(|e| e.condition == condition && !e.acknowledged)
    }

    /// Raise threshold alerts that are not already pending.
    ///
    /// Returns the ids of new events.
    pub fn check_thresholds(&mut self, state: &PumpState) -> Vec<u32> {
        let mut raised = Vec::new();

        if state.battery_percent < LOW_BATTERY_PERCENT
            && !self.has_unacknowledged(EventCondition::LowBattery)
        {
            raised.push(self.low_battery_alert(state));
        }
        if state.reservoir < LOW_INSULIN_MILLIUNITS
            && !self.has_unacknowledged(EventCondition::LowInsulin)
        {
            raised.push(self.low_insulin_alert(state));
        }

        raised
    }

    /// Mark one event acknowledged. Returns false for unknown ids.
    pub fn acknowledge(&mut self, id: u32) -> bool {
        match self.events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Mark everything acknowledged.
    pub fn acknowledge_all(&mut self) {
        for event in &mut self.events {
            event.acknowledged = true;
        }
    }

    /// Events in arrival order, optionally including acknowledged ones.
    pub fn pending(&self, include_acknowledged: bool) -> Vec<&PumpEvent> {
        self.events
            .iter()
            .filter(|e| include_acknowledged || !e.acknowledged)
            .collect()
    }

    /// Drop acknowledged events.
    pub fn clear_acknowledged(&mut self) {
        self.events.retain(|e| !e.acknowledged);
        tracing::debug!("{} events remaining", self.events.len());
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
