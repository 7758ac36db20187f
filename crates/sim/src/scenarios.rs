//! Simulation scenarios exercising the OFDM PHY over a simulated channel

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use wran_core::burst::{HEADER_SIZE, MAX_PACKET_SIZE};
use wran_core::{Burst, Direction, Frequency, Mcs, Packet, RadioId};
use wran_phy::{
    BlockPlan, Cell, PhyTraceEvent, PhyTraceKind, ScanOutcome, SendParams, SimTime,
    SimpleOfdmChannel,
};

use crate::SimConfig;

/// Fills a burst with generic packets totalling `bytes` (at least one
/// header).
pub fn make_burst(bytes: usize, cid: u16) -> Result<Burst> {
    let mut burst = Burst::new();
    let mut remaining = bytes.max(HEADER_SIZE);
    let mut fill = 0u8;
    while remaining > 0 {
        let size = if remaining <= MAX_PACKET_SIZE {
            remaining
        } else if remaining - MAX_PACKET_SIZE < HEADER_SIZE {
            MAX_PACKET_SIZE - HEADER_SIZE
        } else {
            MAX_PACKET_SIZE
        };
        let payload: Vec<u8> = (0..size - HEADER_SIZE).map(|i| fill.wrapping_add(i as u8)).collect();
        burst.add_packet(Packet::generic(cid, &payload)?);
        fill = fill.wrapping_add(0x11);
        remaining -= size;
    }
    Ok(burst)
}

/// A base station and one subscriber on the same channel.
pub struct Link {
    pub cell: Cell,
    pub base: RadioId,
    pub subscriber: RadioId,
    delivered: UnboundedReceiver<Burst>,
}

impl Link {
    pub fn new(config: &SimConfig) -> Result<Self> {
        let channel = SimpleOfdmChannel::new(config.propagation_delay, config.path_loss_db);
        let mut cell = Cell::new(channel, config.phy.frame_duration);
        let base = cell
            .add_radio(config.phy.clone())
            .context("base station config rejected")?;
        let subscriber = cell
            .add_radio(config.phy.clone())
            .context("subscriber config rejected")?;

        let (tx, delivered) = mpsc::unbounded_channel();
        cell.radio_mut(subscriber)
            .ok_or_else(|| anyhow!("subscriber missing"))?
            .set_receive_callback(move |burst| {
                let _ = tx.send(burst);
            });
        Ok(Self {
            cell,
            base,
            subscriber,
            delivered,
        })
    }

    /// Subscribes `sink` to the trace events of both radios.
    pub fn trace_to(&mut self, sink: UnboundedSender<PhyTraceEvent>) {
        for id in [self.base, self.subscriber] {
            if let Some(radio) = self.cell.radio_mut(id) {
                radio.subscribe(sink.clone());
            }
        }
    }

    /// Sends one burst downlink and runs the cell until it goes quiet.
    /// Returns the burst the subscriber delivered, if any.
    pub fn exchange(&mut self, burst: Arc<Burst>, mcs: Mcs) -> Result<Option<Burst>> {
        let params = SendParams::Ofdm {
            burst,
            mcs,
            direction: Direction::Downlink,
        };
        if !self.cell.send(self.base, params)? {
            bail!("base station refused the burst");
        }
        self.cell.run();
        Ok(self.delivered.try_recv().ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeReport {
    pub sent: usize,
    pub delivered: usize,
    pub corrupted: usize,
    pub elapsed: SimTime,
    pub goodput_bps: f64,
}

/// Sends `config.bursts` bursts back to back and checks each delivery.
pub fn burst_exchange(config: &SimConfig) -> Result<ExchangeReport> {
    let mcs = Mcs::try_from(config.mcs)?;
    let mut link = Link::new(config)?;
    let mut delivered = 0;
    let mut corrupted = 0;

    for i in 0..config.bursts {
        let burst = Arc::new(make_burst(config.burst_bytes, i as u16)?);
        match link.exchange(burst.clone(), mcs)? {
            Some(got) if got == *burst => delivered += 1,
            Some(_) => corrupted += 1,
            None => debug!("burst {} lost", i),
        }
    }

    let elapsed = link.cell.now();
    let bits = (delivered * config.burst_bytes * 8) as f64;
    let goodput_bps = if elapsed.is_zero() { 0.0 } else { bits / elapsed.as_secs_f64() };
    info!(
        "{}: {}/{} bursts delivered in {:?}",
        config.name, delivered, config.bursts, elapsed
    );
    Ok(ExchangeReport {
        sent: config.bursts,
        delivered,
        corrupted,
        elapsed,
        goodput_bps,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct McsPoint {
    pub mcs: Mcs,
    pub data_rate: u64,
    pub blocks: u32,
    pub padding_bits: u32,
    pub symbols: u64,
    pub burst_time: Duration,
    pub delivered: bool,
}

/// Sends one burst of `config.burst_bytes` at `mcs` on a fresh link.
pub fn mcs_point(config: &SimConfig, mcs: Mcs) -> Result<McsPoint> {
    let mut link = Link::new(config)?;
    let timing = link
        .cell
        .radio(link.base)
        .ok_or_else(|| anyhow!("base station missing"))?
        .timing()
        .clone();
    let burst = Arc::new(make_burst(config.burst_bytes, 1)?);
    let bytes = burst.size() as u32;
    let plan = BlockPlan::new(bytes, mcs);
    let delivered = link.exchange(burst.clone(), mcs)?.as_ref() == Some(burst.as_ref());

    Ok(McsPoint {
        mcs,
        data_rate: timing.data_rate(mcs),
        blocks: plan.nr_blocks,
        padding_bits: plan.padding_bits,
        symbols: timing.nr_symbols(bytes, mcs),
        burst_time: timing.burst_transmission_time(bytes, mcs),
        delivered,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub locked: Option<Frequency>,
    pub attempts: usize,
    pub elapsed: SimTime,
}

/// The subscriber scans `candidates` in order while the base station
/// transmits on its own frequency after every scan start.
pub fn scan_for_base(config: &SimConfig, candidates: &[Frequency]) -> Result<ScanReport> {
    let mcs = Mcs::try_from(config.mcs)?;
    let mut link = Link::new(config)?;
    let (tx, mut outcomes) = mpsc::unbounded_channel();
    link.cell
        .radio_mut(link.subscriber)
        .ok_or_else(|| anyhow!("subscriber missing"))?
        .set_scan_callback(move |outcome| {
            let _ = tx.send(outcome);
        });
    let beacon = Arc::new(make_burst(64, 0)?);

    for (attempt, &frequency) in candidates.iter().enumerate() {
        if !link.cell.start_scanning(link.subscriber, frequency)? {
            bail!("subscriber busy, cannot scan");
        }
        link.exchange(beacon.clone(), mcs)?;
        match outcomes.try_recv() {
            Ok(ScanOutcome::Found(locked)) => {
                info!("locked on {} Hz after {} attempts", locked, attempt + 1);
                return Ok(ScanReport {
                    locked: Some(locked),
                    attempts: attempt + 1,
                    elapsed: link.cell.now(),
                });
            }
            Ok(ScanOutcome::TimedOut) => debug!("nothing on {} Hz", frequency),
            Err(_) => bail!("scan on {} Hz finished without an outcome", frequency),
        }
    }
    Ok(ScanReport {
        locked: None,
        attempts: candidates.len(),
        elapsed: link.cell.now(),
    })
}

/// Tallies trace events until every sender is gone.
pub async fn collect_traces(mut events: UnboundedReceiver<PhyTraceEvent>) -> HashMap<PhyTraceKind, u64> {
    let mut counts = HashMap::new();
    while let Some(event) = events.recv().await {
        debug!("{} {:?} at {:?} frame {}", event.radio, event.kind, event.at, event.frame);
        *counts.entry(event.kind).or_insert(0) += 1;
    }
    counts
}
