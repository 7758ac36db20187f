//! Core data types for the WRAN OFDM physical layer

use thiserror::Error;

pub mod burst;
pub mod mcs;
pub mod types;

pub use burst::{Burst, HeaderType, Packet};
pub use mcs::{CodeRate, Mcs};
pub use types::{Direction, Frequency, PowerDbm, RadioId, NR_CARRIERS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown modulation and coding scheme code {0}")]
    UnknownMcs(u8),

    #[error("packet of {0} bytes does not fit the 11-bit length field")]
    PacketTooLarge(usize),

    #[error("packet of {0} bytes is shorter than its header")]
    PacketTooShort(usize),

    #[error("header type bit does not match the packet shape")]
    HeaderMismatch,
}
