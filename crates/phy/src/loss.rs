//! Block loss decisions made when a block arrives.
//!
//! The default model accepts everything. [`SnrBlerLoss`] maps the received
//! power to an SNR and draws a block error rate from measured curves, one
//! file per MCS (`modulation0.txt` .. `modulation6.txt`).

use std::fs;
use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wran_core::{Mcs, PowerDbm};

use crate::{LossConfig, PhyError};

pub trait BlockLossModel: Send {
    /// Decides whether the block just received is erroneous.
    fn should_drop_block(&mut self, rx_power: &[PowerDbm], mcs: Mcs) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl BlockLossModel for NoLoss {
    fn should_drop_block(&mut self, _rx_power: &[PowerDbm], _mcs: Mcs) -> bool {
        false
    }
}

/// One line of a block error rate curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlerRecord {
    pub snr_db: f64,
    pub ber: f64,
    pub bler: f64,
    pub sigma2: f64,
    /// Lower bound of the block error rate confidence interval.
    pub i1: f64,
    /// Upper bound.
    pub i2: f64,
}

impl BlerRecord {
    fn certain(bler: f64) -> Self {
        Self {
            snr_db: 0.0,
            ber: bler,
            bler,
            sigma2: 0.0,
            i1: bler,
            i2: bler,
        }
    }
}

/// Thermal noise over the channel, in dBm.
pub fn noise_dbm(noise_figure_db: f64, bandwidth_hz: u32) -> f64 {
    -114.0 + noise_figure_db + 10.0 * (bandwidth_hz as f64 / 1e9).log10()
}

pub struct SnrBlerLoss {
    noise_dbm: f64,
    curves: [Vec<BlerRecord>; 7],
    rng: StdRng,
}

impl SnrBlerLoss {
    pub fn new(curves: [Vec<BlerRecord>; 7], noise_dbm: f64, seed: u64) -> Self {
        Self {
            noise_dbm,
            curves,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Loads all seven curves from `dir`.
    pub fn load(dir: &Path, noise_figure_db: f64, bandwidth_hz: u32, seed: u64) -> Result<Self, PhyError> {
        let mut curves: [Vec<BlerRecord>; 7] = Default::default();
        for mcs in Mcs::ALL {
            let path = dir.join(format!("modulation{}.txt", mcs.code()));
            curves[mcs.code() as usize] = load_curve(&path)?;
        }
        info!("loaded block error rate curves from {}", dir.display());
        Ok(Self::new(curves, noise_dbm(noise_figure_db, bandwidth_hz), seed))
    }

    pub fn from_config(config: &LossConfig, noise_figure_db: f64, bandwidth_hz: u32) -> Result<Self, PhyError> {
        let dir = config
            .trace_file_path
            .as_deref()
            .ok_or(PhyError::MissingTraceFilePath)?;
        Self::load(dir, noise_figure_db, bandwidth_hz, config.seed)
    }

    /// Curve point for `snr_db`: certain loss below the curve, certain
    /// success above it, otherwise the first point past `snr_db`.
    pub fn record(&self, snr_db: f64, mcs: Mcs) -> BlerRecord {
        let curve = &self.curves[mcs.code() as usize];
        match (curve.first(), curve.last()) {
            (Some(first), _) if snr_db <= first.snr_db => BlerRecord::certain(1.0),
            (_, Some(last)) if snr_db >= last.snr_db => BlerRecord::certain(0.0),
            (None, _) | (_, None) => BlerRecord::certain(0.0),
            _ => curve
                .iter()
                .find(|r| snr_db < r.snr_db)
                .copied()
                .unwrap_or_else(|| BlerRecord::certain(0.0)),
        }
    }
}

impl BlockLossModel for SnrBlerLoss {
    fn should_drop_block(&mut self, rx_power: &[PowerDbm], mcs: Mcs) -> bool {
        let Some(&power) = rx_power.first() else {
            return false;
        };
        let snr = power - self.noise_dbm;
        let record = self.record(snr, mcs);
        let (lo, hi) = (record.i1.min(record.i2), record.i1.max(record.i2));
        let bler = self.rng.random_range(lo..=hi);
        let draw: f64 = self.rng.random();

        let drop = if bler >= 1.0 {
            true
        } else if bler <= 0.0 {
            false
        } else {
            draw < bler
        };
        debug!(
            "rx power {:.2} dBm, noise {:.2} dBm, snr {:.2} dB, {} bler {:.4}, drop={}",
            power, self.noise_dbm, snr, mcs, bler, drop
        );
        drop
    }
}

fn load_curve(path: &Path) -> Result<Vec<BlerRecord>, PhyError> {
    let text = fs::read_to_string(path).map_err(|source| PhyError::TraceFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_curve(&text).map_err(|line| PhyError::TraceFormat {
        path: path.to_path_buf(),
        line,
    })
}

/// Parses six whitespace-separated columns per line. Returns the 1-based
/// line number of the first bad line.
fn parse_curve(text: &str) -> Result<Vec<BlerRecord>, usize> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<f64> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| idx + 1)?;
        let [snr_db, ber, bler, sigma2, i1, i2] = cols[..] else {
            return Err(idx + 1);
        };
        records.push(BlerRecord {
            snr_db,
            ber,
            bler,
            sigma2,
            i1,
            i2,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVE: &str = "\
-2.0 0.5 1.0 0.0 1.0 1.0
 0.0 0.1 0.5 0.01 0.4 0.6

 3.0 0.0 0.0 0.0 0.0 0.0
";

    fn model(seed: u64) -> SnrBlerLoss {
        let curve = parse_curve(CURVE).unwrap();
        SnrBlerLoss::new(std::array::from_fn(|_| curve.clone()), -100.0, seed)
    }

    #[test]
    fn no_loss_never_drops() {
        let mut model = NoLoss;
        assert!(!model.should_drop_block(&[-200.0], Mcs::Qam64_34));
    }

    #[test]
    fn noise_floor_for_a_6mhz_channel() {
        let n = noise_dbm(5.0, 6_000_000);
        assert!((n - (-109.0 + 10.0 * 0.006f64.log10())).abs() < 1e-9);
    }

    #[test]
    fn curve_lookup_clamps_at_both_ends() {
        let model = model(1);
        assert_eq!(model.record(-10.0, Mcs::Bpsk12).bler, 1.0);
        assert_eq!(model.record(10.0, Mcs::Bpsk12).bler, 0.0);
        let mid = model.record(-1.0, Mcs::Bpsk12);
        assert_eq!(mid.snr_db, 0.0);
        assert_eq!((mid.i1, mid.i2), (0.4, 0.6));
    }

    #[test]
    fn certain_rates_decide_without_chance() {
        let mut model = model(7);
        for _ in 0..50 {
            assert!(model.should_drop_block(&[-120.0], Mcs::Qpsk12));
            assert!(!model.should_drop_block(&[-80.0], Mcs::Qpsk12));
        }
    }

    #[test]
    fn same_seed_same_decisions() {
        let mut a = model(42);
        let mut b = model(42);
        let left: Vec<bool> = (0..64).map(|_| a.should_drop_block(&[-101.0], Mcs::Qam16_12)).collect();
        let right: Vec<bool> = (0..64).map(|_| b.should_drop_block(&[-101.0], Mcs::Qam16_12)).collect();
        assert_eq!(left, right);
        assert!(left.iter().any(|&d| d));
        assert!(left.iter().any(|&d| !d));
    }

    #[test]
    fn malformed_lines_are_reported() {
        assert_eq!(parse_curve("1 2 3 4 5 6\n1 2 3\n"), Err(2));
        assert_eq!(parse_curve("1 2 x 4 5 6\n"), Err(1));
    }

    #[test]
    fn loads_curves_from_a_directory() {
        let dir = std::env::temp_dir().join(format!("wran-bler-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for code in 0..7 {
            fs::write(dir.join(format!("modulation{code}.txt")), CURVE).unwrap();
        }
        let config = LossConfig {
            enabled: true,
            trace_file_path: Some(dir.clone()),
            seed: 3,
        };
        let model = SnrBlerLoss::from_config(&config, 5.0, 6_000_000).unwrap();
        assert_eq!(model.record(-1.0, Mcs::Qam64_23).bler, 0.5);

        fs::remove_file(dir.join("modulation6.txt")).unwrap();
        assert!(matches!(
            SnrBlerLoss::from_config(&config, 5.0, 6_000_000),
            Err(PhyError::TraceFile { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
