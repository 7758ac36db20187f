//! OFDM symbol timing and MCS-dependent data rates.

use std::time::Duration;

use log::debug;
use wran_core::Mcs;

use crate::frame_clock::FrameDuration;
use crate::{PhyConfig, PhyError};

/// Added to every burst duration so that peers truncating to integer
/// nanoseconds still see the last symbol end inside the burst.
pub const BURST_TIME_COMPENSATION: Duration = Duration::from_nanos(3);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Sampling factor `n` for the channel bandwidth. The first divisor that
/// divides the bandwidth wins.
pub fn sampling_factor(bandwidth_hz: u32) -> Result<f64, PhyError> {
    let factor = if bandwidth_hz % 1_750_000 == 0 {
        8.0 / 7.0
    } else if bandwidth_hz % 1_500_000 == 0 {
        86.0 / 75.0
    } else if bandwidth_hz % 1_250_000 == 0 {
        144.0 / 125.0
    } else if bandwidth_hz % 2_750_000 == 0 {
        316.0 / 275.0
    } else if bandwidth_hz % 2_000_000 == 0 {
        57.0 / 50.0
    } else {
        return Err(PhyError::UnsupportedBandwidth(bandwidth_hz));
    };
    Ok(factor)
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::from_nanos((secs * 1e9).round() as u64)
}

#[derive(Debug, Clone)]
pub struct OfdmTiming {
    bandwidth_hz: u32,
    nfft: u16,
    g: f64,
    frame_duration: FrameDuration,
    sampling_frequency: f64,
    ps_duration: Duration,
    symbol_duration: Duration,
    ps_per_symbol: u16,
    symbols_per_frame: u32,
    ps_per_frame: u32,
    data_rates: [u64; 7],
}

impl OfdmTiming {
    pub fn new(config: &PhyConfig) -> Result<Self, PhyError> {
        Self::from_parts(config.bandwidth_hz, config.nfft, config.g, config.frame_duration)
    }

    pub fn from_parts(
        bandwidth_hz: u32,
        nfft: u16,
        g: f64,
        frame_duration: FrameDuration,
    ) -> Result<Self, PhyError> {
        let sampling_frequency = (sampling_factor(bandwidth_hz)? * bandwidth_hz as f64 / 8000.0) * 8000.0;
        let ps_secs = 4.0 / sampling_frequency;
        let subcarrier_spacing = sampling_frequency / nfft as f64;
        let tb = 1.0 / subcarrier_spacing;
        let tg = g * tb;

        let ps_duration = secs_to_duration(ps_secs);
        let symbol_duration = secs_to_duration(tb + tg);
        let frame_ns = frame_duration.as_duration().as_nanos();
        let symbol_ns = symbol_duration.as_nanos();
        let ps_ns = ps_duration.as_nanos();

        let ps_per_symbol = (symbol_ns as f64 / ps_ns as f64).round() as u16;
        let symbols_per_frame = (frame_ns as f64 / symbol_ns as f64).round() as u32;
        let ps_per_frame = (frame_ns / ps_ns) as u32;

        let symbols_per_second = (NANOS_PER_SEC / symbol_ns) as u64;
        let data_rates = Mcs::ALL.map(|mcs| symbols_per_second * mcs.data_bits_per_ofdm_symbol() as u64);

        debug!(
            "OFDM timing: fs={} Hz, symbol={:?}, ps={:?}, {} symbols/frame",
            sampling_frequency, symbol_duration, ps_duration, symbols_per_frame
        );

        Ok(Self {
            bandwidth_hz,
            nfft,
            g,
            frame_duration,
            sampling_frequency,
            ps_duration,
            symbol_duration,
            ps_per_symbol,
            symbols_per_frame,
            ps_per_frame,
            data_rates,
        })
    }

    pub fn bandwidth_hz(&self) -> u32 {
        self.bandwidth_hz
    }

    pub fn nfft(&self) -> u16 {
        self.nfft
    }

    pub fn g(&self) -> f64 {
        self.g
    }

    pub fn frame_duration(&self) -> FrameDuration {
        self.frame_duration
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Physical slot duration, four samples.
    pub fn ps_duration(&self) -> Duration {
        self.ps_duration
    }

    pub fn symbol_duration(&self) -> Duration {
        self.symbol_duration
    }

    pub fn ps_per_symbol(&self) -> u16 {
        self.ps_per_symbol
    }

    pub fn symbols_per_frame(&self) -> u32 {
        self.symbols_per_frame
    }

    pub fn ps_per_frame(&self) -> u32 {
        self.ps_per_frame
    }

    /// Transmit/receive transition gap in physical slots.
    pub fn ttg(&self) -> u16 {
        2 * self.ps_per_symbol
    }

    /// Receive/transmit transition gap in physical slots.
    pub fn rtg(&self) -> u16 {
        2 * self.ps_per_symbol
    }

    /// Data rate in bits per second.
    pub fn data_rate(&self, mcs: Mcs) -> u64 {
        self.data_rates[mcs.code() as usize]
    }

    pub fn block_transmission_time(&self, mcs: Mcs) -> Duration {
        let rate = self.data_rate(mcs) as u128;
        let nanos = (mcs.coded_block_bits() as u128 * NANOS_PER_SEC + rate / 2) / rate;
        Duration::from_nanos(nanos as u64)
    }

    /// Whole symbols needed to carry `bytes` once split into coded blocks.
    pub fn nr_symbols(&self, bytes: u32, mcs: Mcs) -> u64 {
        let coded_bits = mcs.nr_blocks(bytes) as u128 * mcs.coded_block_bits() as u128;
        let denom = self.data_rate(mcs) as u128 * self.symbol_duration.as_nanos();
        (coded_bits * NANOS_PER_SEC).div_ceil(denom) as u64
    }

    pub fn burst_transmission_time(&self, bytes: u32, mcs: Mcs) -> Duration {
        let symbols = self.nr_symbols(bytes, mcs);
        Duration::from_nanos(symbols * self.symbol_duration.as_nanos() as u64) + BURST_TIME_COMPENSATION
    }

    /// Bytes that fit in `symbols` OFDM symbols.
    pub fn nr_bytes(&self, symbols: u64, mcs: Mcs) -> u64 {
        let bits = symbols as u128 * self.symbol_duration.as_nanos() * self.data_rate(mcs) as u128;
        (bits / (8 * NANOS_PER_SEC)) as u64
    }
}
