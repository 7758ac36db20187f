use std::fmt;

use serde::{Deserialize, Serialize};

/// Carrier frequency, in Hz.
pub type Frequency = u64;

/// Transmit or receive power, in dBm.
pub type PowerDbm = f64;

/// Number of data carriers in one OFDM symbol.
pub const NR_CARRIERS: u32 = 192;

/// Identity of a radio attached to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RadioId(pub u32);

impl fmt::Display for RadioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "radio#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Downlink,
    Uplink,
}

impl Direction {
    pub fn code(self) -> u8 {
        match self {
            Direction::Downlink => 0,
            Direction::Uplink => 1,
        }
    }
}
