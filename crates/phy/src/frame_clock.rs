//! Frame durations and the frame clock shared by every radio in a cell.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::SimTime;
use crate::PhyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameDuration {
    Ms2_5,
    Ms4,
    Ms5,
    Ms8,
    Ms10,
    Ms12_5,
    Ms20,
}

impl FrameDuration {
    pub const ALL: [FrameDuration; 7] = [
        FrameDuration::Ms2_5,
        FrameDuration::Ms4,
        FrameDuration::Ms5,
        FrameDuration::Ms8,
        FrameDuration::Ms10,
        FrameDuration::Ms12_5,
        FrameDuration::Ms20,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_duration(self) -> Duration {
        match self {
            FrameDuration::Ms2_5 => Duration::from_micros(2_500),
            FrameDuration::Ms4 => Duration::from_millis(4),
            FrameDuration::Ms5 => Duration::from_millis(5),
            FrameDuration::Ms8 => Duration::from_millis(8),
            FrameDuration::Ms10 => Duration::from_millis(10),
            FrameDuration::Ms12_5 => Duration::from_micros(12_500),
            FrameDuration::Ms20 => Duration::from_millis(20),
        }
    }

    /// Maps an exact frame length back to its duration code.
    pub fn from_duration(duration: Duration) -> Result<Self, PhyError> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_duration() == duration)
            .ok_or(PhyError::UnknownFrameDuration(duration))
    }
}

impl TryFrom<u8> for FrameDuration {
    type Error = PhyError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(PhyError::UnknownFrameDurationCode(code))
    }
}

/// Frame numbering for a cell. Radios read it through their handler
/// context instead of keeping a private copy.
#[derive(Debug, Clone)]
pub struct FrameClock {
    epoch: SimTime,
    duration: FrameDuration,
}

impl FrameClock {
    pub fn new(duration: FrameDuration) -> Self {
        Self {
            epoch: SimTime::ZERO,
            duration,
        }
    }

    pub fn starting_at(epoch: SimTime, duration: FrameDuration) -> Self {
        Self { epoch, duration }
    }

    pub fn duration(&self) -> FrameDuration {
        self.duration
    }

    /// Index of the frame containing `now`. Times before the epoch belong to
    /// frame 0.
    pub fn frame_number(&self, now: SimTime) -> u64 {
        let elapsed = now.saturating_sub(self.epoch);
        (elapsed.as_nanos() / self.duration.as_duration().as_nanos()) as u64
    }

    pub fn frame_start(&self, now: SimTime) -> SimTime {
        let frame = self.frame_number(now) as u32;
        self.epoch + self.duration.as_duration() * frame
    }

    pub fn next_frame_start(&self, now: SimTime) -> SimTime {
        self.frame_start(now) + self.duration.as_duration()
    }
}
