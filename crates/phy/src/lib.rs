//! OFDM physical layer for WRAN radios: FEC block framing, MCS timing and the
//! transmit/receive state machine, driven by a discrete-event scheduler.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wran_core::{CoreError, Frequency, RadioId};

pub mod cell;
pub mod channel;
pub mod codec;
pub mod frame_clock;
pub mod loss;
pub mod phy;
pub mod scheduler;
pub mod segmenter;
pub mod state;
pub mod timing;
pub mod trace;

pub use cell::{Cell, CellEvent};
pub use channel::{BlockArrival, BlockTransmission, Channel, SimpleOfdmChannel};
pub use codec::{deserialize_burst, serialize_burst, BitVec};
pub use frame_clock::{FrameClock, FrameDuration};
pub use loss::{BlockLossModel, NoLoss, SnrBlerLoss};
pub use phy::{OfdmPhy, PhyEvent, RadioContext, ScanOutcome, SendParams};
pub use scheduler::{EventId, EventScheduler, SimTime};
pub use segmenter::{BlockPlan, FecBlock};
pub use state::{DropReason, PhyInput, PhyState};
pub use timing::OfdmTiming;
pub use trace::{PhyStats, PhyTraceEvent, PhyTraceKind};

#[derive(Debug, Error)]
pub enum PhyError {
    #[error("channel bandwidth {0} Hz has no OFDM sampling factor")]
    UnsupportedBandwidth(u32),

    #[error("no radio {0} in this cell")]
    UnknownRadio(RadioId),

    #[error("invalid PHY configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown frame duration code {0}")]
    UnknownFrameDurationCode(u8),

    #[error("frame duration {0:?} has no duration code")]
    UnknownFrameDuration(Duration),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("bit buffer of {0} bits is not a whole number of bytes")]
    UnalignedBits(usize),

    #[error("packet at byte {offset} needs {needed} bytes but only {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("malformed packet at byte {offset}: {reason}")]
    MalformedPacket { offset: usize, reason: CoreError },

    #[error("loss model is enabled but no trace file path is configured")]
    MissingTraceFilePath,

    #[error("cannot read block error rate trace {path}: {source}")]
    TraceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad record in block error rate trace {path} line {line}")]
    TraceFormat { path: PathBuf, line: usize },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Enables the SNR to block error rate drop policy. When off every
    /// block is accepted.
    pub enabled: bool,
    /// Directory holding the `modulation<N>.txt` curves.
    pub trace_file_path: Option<PathBuf>,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    pub bandwidth_hz: u32,
    pub nfft: u16,
    /// Ratio of cyclic prefix time to useful symbol time.
    pub g: f64,
    pub frame_duration: FrameDuration,
    pub subchannels: u16,
    pub tx_power_dbm: f64,
    pub tx_gain_db: f64,
    pub rx_gain_db: f64,
    pub noise_figure_db: f64,
    pub tx_frequency: Frequency,
    pub rx_frequency: Frequency,
    pub duplex: bool,
    pub scan_timeout: Duration,
    pub loss: LossConfig,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            bandwidth_hz: 6_000_000,
            nfft: 256,
            g: 0.25,
            frame_duration: FrameDuration::Ms10,
            subchannels: 16,
            tx_power_dbm: 30.0,
            tx_gain_db: 0.0,
            rx_gain_db: 0.0,
            noise_figure_db: 5.0,
            tx_frequency: 605_000_000,
            rx_frequency: 605_000_000,
            duplex: false,
            scan_timeout: Duration::from_millis(500),
            loss: LossConfig::default(),
        }
    }
}

impl PhyConfig {
    pub fn validate(&self) -> Result<(), PhyError> {
        if !(256..=1024).contains(&self.nfft) {
            return Err(PhyError::InvalidConfig(format!(
                "FFT size {} outside 256..=1024",
                self.nfft
            )));
        }
        if !(self.g > 0.0 && self.g <= 1.0) {
            return Err(PhyError::InvalidConfig(format!(
                "cyclic prefix ratio {} outside (0, 1]",
                self.g
            )));
        }
        if self.subchannels == 0 {
            return Err(PhyError::InvalidConfig("no sub-channels".into()));
        }
        timing::sampling_factor(self.bandwidth_hz)?;
        if self.loss.enabled && self.loss.trace_file_path.is_none() {
            return Err(PhyError::MissingTraceFilePath);
        }
        Ok(())
    }
}
