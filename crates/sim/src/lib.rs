//! simulation tools for the WRAN OFDM PHY

pub mod scenarios;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wran_core::Mcs;
use wran_phy::{FrameDuration, PhyConfig};

/// One point-to-point link run by the scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub name: String,
    pub phy: PhyConfig,
    pub propagation_delay: Duration,
    pub path_loss_db: f64,
    /// MCS code, 0 (BPSK-1/2) to 6 (64QAM-3/4).
    pub mcs: u8,
    pub bursts: usize,
    pub burst_bytes: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            phy: PhyConfig::default(),
            propagation_delay: Duration::from_micros(1),
            path_loss_db: 80.0,
            mcs: Mcs::Qpsk12.code(),
            bursts: 10,
            burst_bytes: 1000,
        }
    }
}

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn clear_channel() -> SimConfig {
        SimConfig {
            name: "Clear Channel".into(),
            phy: PhyConfig::default(),
            propagation_delay: Duration::from_micros(1), // ~300 m
            path_loss_db: 80.0,
            mcs: Mcs::Qam64_34.code(),
            bursts: 20,
            burst_bytes: 1500,
        }
    }

    pub fn suburban() -> SimConfig {
        SimConfig {
            name: "Suburban".into(),
            phy: PhyConfig {
                bandwidth_hz: 8_000_000,
                frame_duration: FrameDuration::Ms5,
                ..Default::default()
            },
            propagation_delay: Duration::from_micros(33), // ~10 km
            path_loss_db: 110.0,
            mcs: Mcs::Qam16_12.code(),
            bursts: 20,
            burst_bytes: 1000,
        }
    }

    pub fn rural_fringe() -> SimConfig {
        SimConfig {
            name: "Rural Fringe".into(),
            phy: PhyConfig {
                bandwidth_hz: 7_000_000,
                frame_duration: FrameDuration::Ms20,
                tx_power_dbm: 36.0,
                ..Default::default()
            },
            propagation_delay: Duration::from_micros(40), // ~12 km
            path_loss_db: 125.0,
            mcs: Mcs::Qpsk12.code(),
            bursts: 10,
            burst_bytes: 500,
        }
    }

    /// Propagation delay is about twice the 64QAM block time, so the
    /// receiver works on two blocks of a burst at once.
    pub fn regional_cell() -> SimConfig {
        SimConfig {
            name: "Regional Cell".into(),
            phy: PhyConfig {
                bandwidth_hz: 7_000_000,
                frame_duration: FrameDuration::Ms10,
                ..Default::default()
            },
            propagation_delay: Duration::from_micros(100), // ~30 km
            path_loss_db: 118.0,
            mcs: Mcs::Qam64_34.code(),
            bursts: 10,
            burst_bytes: 1500,
        }
    }

    pub fn all() -> Vec<SimConfig> {
        vec![
            Self::clear_channel(),
            Self::suburban(),
            Self::rural_fringe(),
            Self::regional_cell(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wran_phy::OfdmTiming;

    #[test]
    fn presets_are_valid() {
        for preset in SimulationPresets::all() {
            preset.phy.validate().unwrap();
            Mcs::try_from(preset.mcs).unwrap();
        }
    }

    #[test]
    fn regional_delay_spans_more_than_one_block() {
        let preset = SimulationPresets::regional_cell();
        let mcs = Mcs::try_from(preset.mcs).unwrap();
        let timing = OfdmTiming::new(&preset.phy).unwrap();
        assert!(preset.propagation_delay > timing.block_transmission_time(mcs) * 3 / 2);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"name": "lab", "phy": {"bandwidth_hz": 7000000}, "bursts": 3}"#).unwrap();
        assert_eq!(config.name, "lab");
        assert_eq!(config.bursts, 3);
        assert_eq!(config.phy.bandwidth_hz, 7_000_000);
        assert_eq!(config.phy.nfft, 256);
        assert_eq!(config.burst_bytes, 1000);
    }
}
