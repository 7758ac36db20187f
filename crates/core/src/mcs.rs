//! Modulation and coding schemes and their FEC block geometry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::NR_CARRIERS;
use crate::CoreError;

/// Forward error correction code rate as an exact fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRate {
    pub num: u32,
    pub den: u32,
}

impl CodeRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for CodeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mcs {
    Bpsk12 = 0,
    Qpsk12 = 1,
    Qpsk34 = 2,
    Qam16_12 = 3,
    Qam16_34 = 4,
    Qam64_23 = 5,
    Qam64_34 = 6,
}

impl Mcs {
    pub const ALL: [Mcs; 7] = [
        Mcs::Bpsk12,
        Mcs::Qpsk12,
        Mcs::Qpsk34,
        Mcs::Qam16_12,
        Mcs::Qam16_34,
        Mcs::Qam64_23,
        Mcs::Qam64_34,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn bits_per_symbol(self) -> u32 {
        match self {
            Mcs::Bpsk12 => 1,
            Mcs::Qpsk12 | Mcs::Qpsk34 => 2,
            Mcs::Qam16_12 | Mcs::Qam16_34 => 4,
            Mcs::Qam64_23 | Mcs::Qam64_34 => 6,
        }
    }

    pub fn code_rate(self) -> CodeRate {
        match self {
            Mcs::Bpsk12 | Mcs::Qpsk12 | Mcs::Qam16_12 => CodeRate::new(1, 2),
            Mcs::Qam64_23 => CodeRate::new(2, 3),
            Mcs::Qpsk34 | Mcs::Qam16_34 | Mcs::Qam64_34 => CodeRate::new(3, 4),
        }
    }

    /// Uncoded FEC block payload, in bytes.
    pub fn payload_block_bytes(self) -> u32 {
        match self {
            Mcs::Bpsk12 => 12,
            Mcs::Qpsk12 => 24,
            Mcs::Qpsk34 => 36,
            Mcs::Qam16_12 => 48,
            Mcs::Qam16_34 => 72,
            Mcs::Qam64_23 => 96,
            Mcs::Qam64_34 => 108,
        }
    }

    /// On-air size of one block after channel coding, in bytes.
    pub fn coded_block_bytes(self) -> u32 {
        match self {
            Mcs::Bpsk12 => 24,
            Mcs::Qpsk12 | Mcs::Qpsk34 => 48,
            Mcs::Qam16_12 | Mcs::Qam16_34 => 96,
            Mcs::Qam64_23 | Mcs::Qam64_34 => 144,
        }
    }

    pub fn payload_block_bits(self) -> u32 {
        self.payload_block_bytes() * 8
    }

    pub fn coded_block_bits(self) -> u32 {
        self.coded_block_bytes() * 8
    }

    /// Data bits carried by one OFDM symbol across all carriers,
    /// rounded down to whole bits.
    pub fn data_bits_per_ofdm_symbol(self) -> u32 {
        let rate = self.code_rate();
        self.bits_per_symbol() * NR_CARRIERS * rate.num / rate.den
    }

    /// Number of FEC blocks needed for `burst_bytes`.
    pub fn nr_blocks(self, burst_bytes: u32) -> u32 {
        (burst_bytes as u64 * 8).div_ceil(self.payload_block_bits() as u64) as u32
    }
}

impl TryFrom<u8> for Mcs {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Mcs::ALL
            .get(code as usize)
            .copied()
            .ok_or(CoreError::UnknownMcs(code))
    }
}

impl fmt::Display for Mcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mcs::Bpsk12 => "BPSK",
            Mcs::Qpsk12 | Mcs::Qpsk34 => "QPSK",
            Mcs::Qam16_12 | Mcs::Qam16_34 => "16QAM",
            Mcs::Qam64_23 | Mcs::Qam64_34 => "64QAM",
        };
        write!(f, "{}-{}", name, self.code_rate())
    }
}
