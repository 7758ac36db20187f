//! Shared medium between the radios of a cell.

use std::sync::Arc;
use std::time::Duration;

use log::trace;
use wran_core::{Burst, Direction, Frequency, Mcs, PowerDbm, RadioId};

use crate::cell::CellEvent;
use crate::phy::PhyEvent;
use crate::scheduler::EventScheduler;
use crate::segmenter::FecBlock;

/// One FEC block handed from a transmitter to the channel.
#[derive(Debug, Clone)]
pub struct BlockTransmission {
    pub sender: RadioId,
    pub block_duration: Duration,
    pub burst_size: u32,
    pub is_first_block: bool,
    pub is_last_block: bool,
    pub frequency: Frequency,
    pub mcs: Mcs,
    pub direction: Direction,
    pub subchannels: u16,
    /// Transmit power per sub-channel, gain included.
    pub tx_power: Vec<PowerDbm>,
    pub burst: Arc<Burst>,
    pub block: FecBlock,
}

/// One FEC block as seen by a receiver.
#[derive(Debug, Clone)]
pub struct BlockArrival {
    pub sender: RadioId,
    pub burst_size: u32,
    pub is_first_block: bool,
    pub frequency: Frequency,
    pub mcs: Mcs,
    pub direction: Direction,
    pub rx_power: Vec<PowerDbm>,
    pub burst: Arc<Burst>,
    pub block: FecBlock,
}

pub trait Channel {
    fn attach(&mut self, radio: RadioId);

    /// Schedules the arrivals caused by `tx` on every other attached radio.
    fn send(&mut self, tx: BlockTransmission, scheduler: &mut EventScheduler<CellEvent>);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub blocks_sent: u64,
    pub arrivals_scheduled: u64,
}

/// Ideal broadcast medium with a fixed delay and a flat path loss.
///
/// A delay longer than one block duration is fine: the receiver overlaps
/// consecutive blocks of the same burst.
#[derive(Debug)]
pub struct SimpleOfdmChannel {
    propagation_delay: Duration,
    path_loss_db: f64,
    radios: Vec<RadioId>,
    stats: ChannelStats,
}

impl SimpleOfdmChannel {
    pub fn new(propagation_delay: Duration, path_loss_db: f64) -> Self {
        Self {
            propagation_delay,
            path_loss_db,
            radios: Vec::new(),
            stats: ChannelStats::default(),
        }
    }

    pub fn propagation_delay(&self) -> Duration {
        self.propagation_delay
    }

    pub fn path_loss_db(&self) -> f64 {
        self.path_loss_db
    }

    pub fn radios(&self) -> &[RadioId] {
        &self.radios
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }
}

impl Default for SimpleOfdmChannel {
    fn default() -> Self {
        Self::new(Duration::from_micros(1), 80.0)
    }
}

impl Channel for SimpleOfdmChannel {
    fn attach(&mut self, radio: RadioId) {
        if !self.radios.contains(&radio) {
            self.radios.push(radio);
        }
    }

    fn send(&mut self, tx: BlockTransmission, scheduler: &mut EventScheduler<CellEvent>) {
        self.stats.blocks_sent += 1;
        let rx_power: Vec<PowerDbm> = tx.tx_power.iter().map(|p| p - self.path_loss_db).collect();

        for &radio in self.radios.iter().filter(|&&r| r != tx.sender) {
            let arrival = BlockArrival {
                sender: tx.sender,
                burst_size: tx.burst_size,
                is_first_block: tx.is_first_block,
                frequency: tx.frequency,
                mcs: tx.mcs,
                direction: tx.direction,
                rx_power: rx_power.clone(),
                burst: Arc::clone(&tx.burst),
                block: tx.block.clone(),
            };
            scheduler.schedule(
                self.propagation_delay,
                CellEvent::Phy {
                    radio,
                    event: PhyEvent::BlockArrival(arrival),
                },
            );
            self.stats.arrivals_scheduled += 1;
        }
        trace!(
            "{} block on {} Hz fanned out after {:?}",
            tx.sender,
            tx.frequency,
            self.propagation_delay
        );
    }
}
