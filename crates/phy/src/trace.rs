//! Burst-level notifications and per-radio counters.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;
use tokio::sync::mpsc::UnboundedSender;
use wran_core::{Burst, RadioId};

use crate::scheduler::SimTime;
use crate::state::DropReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhyTraceKind {
    TxBegin,
    TxEnd,
    TxDrop,
    RxBegin,
    RxEnd,
    RxDrop,
    /// Burst accepted for transmission.
    Tx,
    /// Burst delivered to the upper layer.
    Rx,
}

#[derive(Debug, Clone)]
pub struct PhyTraceEvent {
    pub radio: RadioId,
    pub at: SimTime,
    pub frame: u64,
    pub kind: PhyTraceKind,
    pub burst: Arc<Burst>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PhyStats {
    pub tx_begin: u64,
    pub tx_end: u64,
    pub tx_drop: u64,
    pub rx_begin: u64,
    pub rx_end: u64,
    pub rx_drop: u64,
    pub tx_bursts: u64,
    pub rx_bursts: u64,
    pub blocks_sent: u64,
    pub blocks_received: u64,
    pub erroneous_blocks: u64,
    pub duplex_reserved: u64,
    pub scans_found: u64,
    pub scans_timed_out: u64,
    /// Arrivals and requests turned away, by reason.
    pub drops: HashMap<DropReason, u64>,
}

impl PhyStats {
    pub fn drops_for(&self, reason: DropReason) -> u64 {
        self.drops.get(&reason).copied().unwrap_or(0)
    }
}

/// Counts every notification and forwards it to an optional subscriber.
#[derive(Debug)]
pub struct PhyTracer {
    radio: RadioId,
    sink: Option<UnboundedSender<PhyTraceEvent>>,
    stats: PhyStats,
}

impl PhyTracer {
    pub fn new(radio: RadioId) -> Self {
        Self {
            radio,
            sink: None,
            stats: PhyStats::default(),
        }
    }

    pub fn subscribe(&mut self, sink: UnboundedSender<PhyTraceEvent>) {
        self.sink = Some(sink);
    }

    pub fn stats(&self) -> &PhyStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut PhyStats {
        &mut self.stats
    }

    pub fn notify(&mut self, kind: PhyTraceKind, at: SimTime, frame: u64, burst: &Arc<Burst>) {
        let counter = match kind {
            PhyTraceKind::TxBegin => &mut self.stats.tx_begin,
            PhyTraceKind::TxEnd => &mut self.stats.tx_end,
            PhyTraceKind::TxDrop => &mut self.stats.tx_drop,
            PhyTraceKind::RxBegin => &mut self.stats.rx_begin,
            PhyTraceKind::RxEnd => &mut self.stats.rx_end,
            PhyTraceKind::RxDrop => &mut self.stats.rx_drop,
            PhyTraceKind::Tx => &mut self.stats.tx_bursts,
            PhyTraceKind::Rx => &mut self.stats.rx_bursts,
        };
        *counter += 1;
        trace!("{} {:?} at {:?} (frame {})", self.radio, kind, at, frame);

        if let Some(sink) = &self.sink {
            let event = PhyTraceEvent {
                radio: self.radio,
                at,
                frame,
                kind,
                burst: Arc::clone(burst),
            };
            if sink.send(event).is_err() {
                // Subscriber went away; keep counting locally.
                self.sink = None;
            }
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        *self.stats.drops.entry(reason).or_insert(0) += 1;
    }
}
