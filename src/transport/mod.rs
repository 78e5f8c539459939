//! Transport module - async link driving a simulator with raw chunks.
//!
//! The radio itself is out of scope; a link stands in for one
//! characteristic of one connected device. Chunks written by the app go in,
//! chunks the pump would notify come out.

mod link;

use serde::{Deserialize, Serialize};

use crate::config::SimulatorConfig;

pub use link::{spawn_link, LinkHandle};

/// Pump service characteristics that carry framed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Characteristic {
    CurrentStatus,
    QualifyingEvents,
    HistoryLog,
    Authorization,
    Control,
    ControlStream,
}

impl Characteristic {
    /// Chunk size used on this characteristic.
    pub fn chunk_size(&self, config: &SimulatorConfig) -> usize {
        match self {
            Characteristic::Control | Characteristic::ControlStream => config.control_chunk_size,
            _ => config.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes() {
        let config = SimulatorConfig::default();
        assert_eq!(Characteristic::Authorization.chunk_size(&config), 18);
        assert_eq!(Characteristic::CurrentStatus.chunk_size(&config), 18);
        assert_eq!(Characteristic::Control.chunk_size(&config), 40);
        assert_eq!(Characteristic::ControlStream.chunk_size(&config), 40);
    }
}
