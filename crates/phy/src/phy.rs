//! Block-coded OFDM transceiver.
//!
//! A burst is serialized, cut into FEC blocks and sent one block per block
//! duration. The receiver queues blocks until the burst is complete, then
//! rebuilds it from the bits, provided no block was marked erroneous.
//!
//! All handlers run inside a scheduler callback and receive a
//! [`RadioContext`] giving access to the cell's scheduler, channel and frame
//! clock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::mpsc::UnboundedSender;
use wran_core::{Burst, Direction, Frequency, Mcs, PowerDbm, RadioId};

use crate::cell::CellEvent;
use crate::channel::{BlockArrival, BlockTransmission, Channel};
use crate::codec::{deserialize_burst, serialize_burst};
use crate::frame_clock::FrameClock;
use crate::loss::{self, BlockLossModel, NoLoss, SnrBlerLoss};
use crate::scheduler::{EventId, EventScheduler, SimTime};
use crate::segmenter::{reassemble, segment, strip_padding, BlockPlan, FecBlock};
use crate::state::{transition, ArrivalMatch, DropReason, PhyInput, PhyState, Step};
use crate::timing::OfdmTiming;
use crate::trace::{PhyStats, PhyTraceEvent, PhyTraceKind, PhyTracer};
use crate::{PhyConfig, PhyError};

/// Transmit request from the MAC.
#[derive(Debug, Clone)]
pub enum SendParams {
    Ofdm {
        burst: Arc<Burst>,
        mcs: Mcs,
        direction: Direction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(Frequency),
    TimedOut,
}

/// A block whose reception completes one block duration after arrival.
#[derive(Debug, Clone)]
pub struct ReceivedBlock {
    pub burst_size: u32,
    pub mcs: Mcs,
    pub direction: Direction,
    pub erroneous: bool,
    pub burst: Arc<Burst>,
    pub block: FecBlock,
}

#[derive(Debug, Clone)]
pub enum PhyEvent {
    EndSendBlock { mcs: Mcs, direction: Direction },
    BlockArrival(BlockArrival),
    EndReceiveBlock(ReceivedBlock),
    DeliverBurst(Burst),
    ScanTimeout,
}

/// Handles a radio gets on the cell while one of its events runs.
pub struct RadioContext<'a> {
    pub id: RadioId,
    pub scheduler: &'a mut EventScheduler<CellEvent>,
    pub channel: &'a mut dyn Channel,
    pub frame_clock: &'a FrameClock,
}

impl RadioContext<'_> {
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_clock.frame_number(self.scheduler.now())
    }

    pub fn schedule(&mut self, delay: Duration, event: PhyEvent) -> EventId {
        self.scheduler.schedule(delay, CellEvent::Phy { radio: self.id, event })
    }

    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn transmit(&mut self, tx: BlockTransmission) {
        self.channel.send(tx, self.scheduler);
    }
}

struct TxSession {
    burst: Arc<Burst>,
    burst_size: u32,
    plan: BlockPlan,
    blocks: VecDeque<FecBlock>,
    remaining: u32,
    sent: u32,
    block_time: Duration,
}

struct RxSession {
    sender: RadioId,
    burst_size: u32,
    plan: BlockPlan,
    block_time: Duration,
    blocks: VecDeque<FecBlock>,
    received: u32,
    erroneous: u32,
    /// Accepted blocks whose reception has not ended yet.
    in_flight: u32,
}

type ReceiveCallback = Box<dyn FnMut(Burst) + Send>;
type ScanCallback = Box<dyn FnMut(ScanOutcome) + Send>;

pub struct OfdmPhy {
    id: RadioId,
    config: PhyConfig,
    timing: OfdmTiming,
    state: PhyState,
    tx_frequency: Frequency,
    rx_frequency: Frequency,
    scan_frequency: Option<Frequency>,
    scan_timeout: Option<EventId>,
    tx_power: Vec<PowerDbm>,
    rx_power: Vec<PowerDbm>,
    tx: Option<TxSession>,
    rx: Option<RxSession>,
    loss: Box<dyn BlockLossModel>,
    tracer: PhyTracer,
    receive_callback: Option<ReceiveCallback>,
    scan_callback: Option<ScanCallback>,
}

impl OfdmPhy {
    pub fn new(id: RadioId, config: PhyConfig) -> Result<Self, PhyError> {
        config.validate()?;
        let timing = OfdmTiming::new(&config)?;
        let loss: Box<dyn BlockLossModel> = if config.loss.enabled {
            Box::new(SnrBlerLoss::from_config(
                &config.loss,
                config.noise_figure_db,
                config.bandwidth_hz,
            )?)
        } else {
            Box::new(NoLoss)
        };
        let subchannels = config.subchannels as usize;
        info!(
            "{} up: {} Hz bandwidth, tx {} Hz, rx {} Hz, {} sub-channels",
            id, config.bandwidth_hz, config.tx_frequency, config.rx_frequency, subchannels
        );

        Ok(Self {
            id,
            timing,
            state: PhyState::Idle,
            tx_frequency: config.tx_frequency,
            rx_frequency: config.rx_frequency,
            scan_frequency: None,
            scan_timeout: None,
            tx_power: vec![config.tx_power_dbm; subchannels],
            rx_power: vec![0.0; subchannels],
            tx: None,
            rx: None,
            loss,
            tracer: PhyTracer::new(id),
            receive_callback: None,
            scan_callback: None,
            config,
        })
    }

    pub fn id(&self) -> RadioId {
        self.id
    }

    pub fn state(&self) -> PhyState {
        self.state
    }

    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    pub fn timing(&self) -> &OfdmTiming {
        &self.timing
    }

    pub fn stats(&self) -> &PhyStats {
        self.tracer.stats()
    }

    pub fn tx_frequency(&self) -> Frequency {
        self.tx_frequency
    }

    pub fn rx_frequency(&self) -> Frequency {
        self.rx_frequency
    }

    pub fn set_tx_frequency(&mut self, frequency: Frequency) {
        self.tx_frequency = frequency;
    }

    pub fn set_rx_frequency(&mut self, frequency: Frequency) {
        self.rx_frequency = frequency;
    }

    /// Uses `frequency` for both directions.
    pub fn set_simplex(&mut self, frequency: Frequency) {
        self.tx_frequency = frequency;
        self.rx_frequency = frequency;
    }

    pub fn is_duplex(&self) -> bool {
        self.config.duplex
    }

    pub fn tx_power(&self) -> &[PowerDbm] {
        &self.tx_power
    }

    pub fn set_tx_power(&mut self, subchannel: usize, power: PowerDbm) {
        if let Some(slot) = self.tx_power.get_mut(subchannel) {
            *slot = power;
        }
    }

    /// Powers of the last block received, rx gain included.
    pub fn rx_power(&self) -> &[PowerDbm] {
        &self.rx_power
    }

    pub fn noise_dbm(&self) -> f64 {
        loss::noise_dbm(self.config.noise_figure_db, self.config.bandwidth_hz)
    }

    pub fn set_loss_model(&mut self, model: Box<dyn BlockLossModel>) {
        self.loss = model;
    }

    pub fn set_receive_callback(&mut self, callback: impl FnMut(Burst) + Send + 'static) {
        self.receive_callback = Some(Box::new(callback));
    }

    pub fn set_scan_callback(&mut self, callback: impl FnMut(ScanOutcome) + Send + 'static) {
        self.scan_callback = Some(Box::new(callback));
    }

    pub fn subscribe(&mut self, sink: UnboundedSender<PhyTraceEvent>) {
        self.tracer.subscribe(sink);
    }

    pub fn handle(&mut self, ctx: &mut RadioContext<'_>, event: PhyEvent) {
        match event {
            PhyEvent::EndSendBlock { mcs, direction } => self.end_send_block(ctx, mcs, direction),
            PhyEvent::BlockArrival(arrival) => self.start_receive(ctx, arrival),
            PhyEvent::EndReceiveBlock(block) => self.end_receive_block(ctx, block),
            PhyEvent::DeliverBurst(burst) => self.deliver_burst(ctx, burst),
            PhyEvent::ScanTimeout => self.end_scanning(ctx),
        }
    }

    /// Starts transmitting a burst. Returns false if the request was dropped.
    pub fn send(&mut self, ctx: &mut RadioContext<'_>, params: SendParams) -> bool {
        let SendParams::Ofdm { burst, mcs, direction } = params;

        if burst.is_empty() {
            self.reject_send(ctx, DropReason::EmptyBurst, &burst);
            return false;
        }
        if let Step::Drop(reason) = self.decide(PhyInput::Send) {
            self.reject_send(ctx, reason, &burst);
            return false;
        }

        let burst_size = burst.size() as u32;
        let plan = BlockPlan::new(burst_size, mcs);
        let blocks = segment(&serialize_burst(&burst), plan.block_size_bits as usize);
        debug!(
            "{} sending {} bytes at {} in {} blocks ({} padding bits)",
            self.id, burst_size, mcs, plan.nr_blocks, plan.padding_bits
        );

        self.notify(ctx, PhyTraceKind::TxBegin, &burst);
        self.notify(ctx, PhyTraceKind::Tx, &burst);
        self.state = PhyState::Transmitting;
        self.tx = Some(TxSession {
            burst,
            burst_size,
            plan,
            remaining: plan.nr_blocks,
            blocks,
            sent: 0,
            block_time: Duration::ZERO,
        });
        self.start_send_block(ctx, true, mcs, direction);
        true
    }

    fn reject_send(&mut self, ctx: &RadioContext<'_>, reason: DropReason, burst: &Arc<Burst>) {
        warn!("{} send dropped: {:?}", self.id, reason);
        self.tracer.record_drop(reason);
        self.notify(ctx, PhyTraceKind::TxDrop, burst);
    }

    fn start_send_block(&mut self, ctx: &mut RadioContext<'_>, is_first: bool, mcs: Mcs, direction: Direction) {
        self.apply(PhyInput::TxBlockStart);
        let Some(session) = self.tx.as_mut() else {
            panic!("{}: block start with no burst in flight", self.id);
        };
        if is_first {
            session.block_time = self.timing.block_transmission_time(mcs);
        }
        let block = session
            .blocks
            .pop_front()
            .expect("segmenter produced fewer blocks than planned");
        let tx = BlockTransmission {
            sender: self.id,
            block_duration: session.block_time,
            burst_size: session.burst_size,
            is_first_block: is_first,
            is_last_block: session.remaining == 1,
            frequency: self.tx_frequency,
            mcs,
            direction,
            subchannels: self.config.subchannels,
            tx_power: self.tx_power.iter().map(|p| p + self.config.tx_gain_db).collect(),
            burst: Arc::clone(&session.burst),
            block,
        };
        session.remaining -= 1;
        let block_time = session.block_time;

        trace!("{} block out, {} left", self.id, session.remaining);
        ctx.transmit(tx);
        self.tracer.stats_mut().blocks_sent += 1;
        ctx.schedule(block_time, PhyEvent::EndSendBlock { mcs, direction });
    }

    fn end_send_block(&mut self, ctx: &mut RadioContext<'_>, mcs: Mcs, direction: Direction) {
        self.apply(PhyInput::TxBlockEnd);
        let Some(session) = self.tx.as_mut() else {
            panic!("{}: block end with no burst in flight", self.id);
        };
        session.sent += 1;

        if session.plan.is_complete(session.sent, session.burst_size) {
            assert_eq!(session.remaining, 0, "{}: burst ended with blocks still queued", self.id);
            let burst = Arc::clone(&session.burst);
            self.tx = None;
            self.notify(ctx, PhyTraceKind::TxEnd, &burst);
        } else {
            self.start_send_block(ctx, false, mcs, direction);
        }
    }

    /// Entry point for every block the channel delivers to this radio.
    pub fn start_receive(&mut self, ctx: &mut RadioContext<'_>, arrival: BlockArrival) {
        for (slot, power) in self.rx_power.iter_mut().zip(&arrival.rx_power) {
            *slot = power + self.config.rx_gain_db;
        }

        let matched = ArrivalMatch {
            scan_target: self.scan_frequency == Some(arrival.frequency),
            rx_frequency: arrival.frequency == self.rx_frequency,
            duplex: self.config.duplex,
            continuation: !arrival.is_first_block
                && self.rx.as_ref().is_some_and(|s| s.sender == arrival.sender),
        };
        match self.decide(PhyInput::BlockArrival(matched)) {
            Step::Drop(reason) => {
                trace!("{} block from {} dropped: {:?}", self.id, arrival.sender, reason);
                self.tracer.record_drop(reason);
            }
            Step::Reserved => {
                self.tracer.stats_mut().duplex_reserved += 1;
            }
            Step::Enter(PhyState::Idle) => self.scan_found(ctx, arrival.frequency),
            Step::Enter(PhyState::Receiving) => self.accept_block(ctx, arrival),
            Step::Enter(state) => unreachable!("block arrival cannot enter {state}"),
        }
    }

    fn accept_block(&mut self, ctx: &mut RadioContext<'_>, arrival: BlockArrival) {
        if arrival.is_first_block {
            self.notify(ctx, PhyTraceKind::RxBegin, &arrival.burst);
            self.rx = Some(RxSession {
                sender: arrival.sender,
                burst_size: arrival.burst_size,
                plan: BlockPlan::new(arrival.burst_size, arrival.mcs),
                block_time: self.timing.block_transmission_time(arrival.mcs),
                blocks: VecDeque::new(),
                received: 0,
                erroneous: 0,
                in_flight: 0,
            });
        }
        let Some(session) = self.rx.as_mut().filter(|s| s.sender == arrival.sender) else {
            trace!("{} continuation block from {} with no burst in progress", self.id, arrival.sender);
            self.tracer.record_drop(DropReason::NotSynchronized);
            return;
        };
        session.in_flight += 1;
        let block_time = session.block_time;

        let erroneous = self.loss.should_drop_block(&self.rx_power, arrival.mcs);
        self.state = PhyState::Receiving;
        ctx.schedule(
            block_time,
            PhyEvent::EndReceiveBlock(ReceivedBlock {
                burst_size: arrival.burst_size,
                mcs: arrival.mcs,
                direction: arrival.direction,
                erroneous,
                burst: arrival.burst,
                block: arrival.block,
            }),
        );
    }

    fn end_receive_block(&mut self, ctx: &mut RadioContext<'_>, received: ReceivedBlock) {
        let more_in_flight = self.rx.as_ref().is_some_and(|s| s.in_flight > 1);
        self.apply(PhyInput::RxBlockEnd { more_in_flight });
        let Some(session) = self.rx.as_mut() else {
            panic!("{}: block end with no reception in progress", self.id);
        };
        session.in_flight -= 1;
        session.received += 1;
        session.blocks.push_back(received.block);
        let stats = self.tracer.stats_mut();
        stats.blocks_received += 1;
        if received.erroneous {
            session.erroneous += 1;
            stats.erroneous_blocks += 1;
        }

        if !session.plan.is_complete(session.received, session.burst_size) {
            return;
        }
        let Some(mut session) = self.rx.take() else {
            return;
        };
        self.notify(ctx, PhyTraceKind::RxEnd, &received.burst);

        if session.erroneous > 0 {
            debug!(
                "{} burst lost: {} of {} blocks erroneous",
                self.id, session.erroneous, session.received
            );
            self.notify(ctx, PhyTraceKind::RxDrop, &received.burst);
            return;
        }

        let plan = session.plan;
        let mut bits = reassemble(
            &mut session.blocks,
            plan.nr_blocks as usize,
            plan.block_size_bits as usize,
        );
        strip_padding(&mut bits, plan.padding_bits as usize);
        match deserialize_burst(&bits) {
            Ok(burst) => {
                ctx.schedule(Duration::ZERO, PhyEvent::DeliverBurst(burst));
            }
            Err(e) => {
                warn!("{} cannot rebuild burst: {}", self.id, e);
                self.notify(ctx, PhyTraceKind::RxDrop, &received.burst);
            }
        }
    }

    fn deliver_burst(&mut self, ctx: &mut RadioContext<'_>, burst: Burst) {
        debug!("{} delivering {} packets", self.id, burst.nr_packets());
        if let Some(callback) = self.receive_callback.as_mut() {
            callback(burst.clone());
        }
        self.notify(ctx, PhyTraceKind::Rx, &Arc::new(burst));
    }

    /// Listens on `frequency` until a block arrives there or the scan
    /// timeout expires. Returns false if the radio was busy.
    pub fn start_scanning(&mut self, ctx: &mut RadioContext<'_>, frequency: Frequency) -> bool {
        if let Step::Drop(reason) = self.decide(PhyInput::ScanStart) {
            warn!("{} cannot scan while {}", self.id, self.state);
            self.tracer.record_drop(reason);
            return false;
        }
        info!("{} scanning {} Hz", self.id, frequency);
        self.state = PhyState::Scanning;
        self.scan_frequency = Some(frequency);
        self.scan_timeout = Some(ctx.schedule(self.config.scan_timeout, PhyEvent::ScanTimeout));
        true
    }

    fn scan_found(&mut self, ctx: &mut RadioContext<'_>, frequency: Frequency) {
        if let Some(timeout) = self.scan_timeout.take() {
            ctx.cancel(timeout);
        }
        info!("{} locked on {} Hz", self.id, frequency);
        self.scan_frequency = None;
        self.set_simplex(frequency);
        self.state = PhyState::Idle;
        self.tracer.stats_mut().scans_found += 1;
        if let Some(callback) = self.scan_callback.as_mut() {
            callback(ScanOutcome::Found(frequency));
        }
    }

    fn end_scanning(&mut self, _ctx: &mut RadioContext<'_>) {
        self.apply(PhyInput::ScanTimeout);
        info!("{} scan timed out", self.id);
        self.scan_frequency = None;
        self.scan_timeout = None;
        self.tracer.stats_mut().scans_timed_out += 1;
        if let Some(callback) = self.scan_callback.as_mut() {
            callback(ScanOutcome::TimedOut);
        }
    }

    fn decide(&self, input: PhyInput) -> Step {
        transition(self.state, input).unwrap_or_else(|e| panic!("{}: {}", self.id, e))
    }

    fn apply(&mut self, input: PhyInput) {
        if let Step::Enter(next) = self.decide(input) {
            self.state = next;
        }
    }

    fn notify(&mut self, ctx: &RadioContext<'_>, kind: PhyTraceKind, burst: &Arc<Burst>) {
        self.tracer.notify(kind, ctx.now(), ctx.frame_number(), burst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::channel::SimpleOfdmChannel;
    use crate::frame_clock::FrameDuration;
    use tokio::sync::mpsc;
    use wran_core::Packet;

    const F1: Frequency = 605_000_000;
    const F2: Frequency = 611_000_000;

    fn config() -> PhyConfig {
        PhyConfig {
            bandwidth_hz: 7_000_000,
            subchannels: 4,
            tx_gain_db: 2.0,
            rx_gain_db: 1.0,
            ..Default::default()
        }
    }

    fn cell() -> Cell {
        Cell::new(
            SimpleOfdmChannel::new(Duration::from_micros(1), 80.0),
            FrameDuration::Ms10,
        )
    }

    /// 100 bytes: five QPSK-1/2 blocks with 160 padding bits.
    fn burst_100() -> Arc<Burst> {
        let mut burst = Burst::new();
        burst.add_packet(Packet::generic(0x2A, &[0x5A; 88]).unwrap());
        burst.add_packet(Packet::bandwidth_request(0x2A, 512));
        assert_eq!(burst.size(), 100);
        Arc::new(burst)
    }

    fn ofdm(burst: Arc<Burst>) -> SendParams {
        SendParams::Ofdm {
            burst,
            mcs: Mcs::Qpsk12,
            direction: Direction::Downlink,
        }
    }

    fn kinds(rx: &mut mpsc::UnboundedReceiver<PhyTraceEvent>) -> Vec<(PhyTraceKind, SimTime)> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| (e.kind, e.at))
            .collect()
    }

    /// Marks exactly the n-th block it sees (1-based) as erroneous.
    struct NthBlockLost {
        seen: u32,
        nth: u32,
    }

    impl BlockLossModel for NthBlockLost {
        fn should_drop_block(&mut self, _rx_power: &[PowerDbm], _mcs: Mcs) -> bool {
            self.seen += 1;
            self.seen == self.nth
        }
    }

    #[test]
    fn burst_is_delivered_once_and_intact() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(config()).unwrap();
        let (tx_sink, mut tx_trace) = mpsc::unbounded_channel();
        let (rx_sink, mut rx_trace) = mpsc::unbounded_channel();
        let (deliver, mut delivered) = mpsc::unbounded_channel();
        cell.radio_mut(a).unwrap().subscribe(tx_sink);
        let receiver = cell.radio_mut(b).unwrap();
        receiver.subscribe(rx_sink);
        receiver.set_receive_callback(move |burst| {
            let _ = deliver.send(burst);
        });

        let burst = burst_100();
        assert!(cell.send(a, ofdm(burst.clone())).unwrap());
        assert_eq!(cell.radio(a).unwrap().state(), PhyState::Transmitting);
        cell.run();

        let got = delivered.try_recv().unwrap();
        assert!(delivered.try_recv().is_err());
        assert_eq!(got.size(), burst.size());
        assert_eq!(&got, burst.as_ref());

        let us = Duration::from_micros;
        assert_eq!(
            kinds(&mut tx_trace),
            vec![
                (PhyTraceKind::TxBegin, us(0)),
                (PhyTraceKind::Tx, us(0)),
                (PhyTraceKind::TxEnd, us(400)),
            ]
        );
        assert_eq!(
            kinds(&mut rx_trace),
            vec![
                (PhyTraceKind::RxBegin, us(1)),
                (PhyTraceKind::RxEnd, us(401)),
                (PhyTraceKind::Rx, us(401)),
            ]
        );

        let sender = cell.radio(a).unwrap();
        let receiver = cell.radio(b).unwrap();
        assert_eq!(sender.state(), PhyState::Idle);
        assert_eq!(receiver.state(), PhyState::Idle);
        assert_eq!(sender.stats().blocks_sent, 5);
        assert_eq!(receiver.stats().blocks_received, 5);
        // 30 dBm + 2 dB tx gain - 80 dB path loss + 1 dB rx gain
        assert_eq!(receiver.rx_power(), &[-47.0; 4]);
        assert_eq!(sender.tx_power(), &[30.0; 4]);
    }

    #[test]
    fn second_send_while_transmitting_is_a_noop() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        cell.add_radio(config()).unwrap();

        assert!(cell.send(a, ofdm(burst_100())).unwrap());
        assert!(!cell.send(a, ofdm(burst_100())).unwrap());
        let phy = cell.radio(a).unwrap();
        assert_eq!(phy.state(), PhyState::Transmitting);
        assert_eq!(phy.stats().tx_drop, 1);
        assert_eq!(
            phy.stats().drops_for(DropReason::NotIdle(PhyState::Transmitting)),
            1
        );

        cell.run();
        let phy = cell.radio(a).unwrap();
        assert_eq!(phy.stats().tx_begin, 1);
        assert_eq!(phy.stats().tx_end, 1);
        assert_eq!(phy.stats().blocks_sent, 5);
    }

    #[test]
    fn empty_burst_is_rejected() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        assert!(!cell.send(a, ofdm(Arc::new(Burst::new()))).unwrap());
        let phy = cell.radio(a).unwrap();
        assert_eq!(phy.state(), PhyState::Idle);
        assert_eq!(phy.stats().drops_for(DropReason::EmptyBurst), 1);
        assert!(cell.run_until(Duration::from_secs(1)) == 0);
    }

    #[test]
    fn one_erroneous_block_loses_the_whole_burst() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(config()).unwrap();
        let (deliver, mut delivered) = mpsc::unbounded_channel();
        let receiver = cell.radio_mut(b).unwrap();
        receiver.set_loss_model(Box::new(NthBlockLost { seen: 0, nth: 3 }));
        receiver.set_receive_callback(move |burst| {
            let _ = deliver.send(burst);
        });

        cell.send(a, ofdm(burst_100())).unwrap();
        cell.run();

        let stats = cell.radio(b).unwrap().stats().clone();
        assert_eq!(stats.rx_end, 1);
        assert_eq!(stats.rx_drop, 1);
        assert_eq!(stats.rx_bursts, 0);
        assert_eq!(stats.erroneous_blocks, 1);
        assert!(delivered.try_recv().is_err());

        // Counters start over with the next burst.
        cell.send(a, ofdm(burst_100())).unwrap();
        cell.run();
        let stats = cell.radio(b).unwrap().stats();
        assert_eq!(stats.rx_end, 2);
        assert_eq!(stats.rx_drop, 1);
        assert_eq!(stats.rx_bursts, 1);
        assert_eq!(delivered.try_recv().unwrap().size(), 100);
    }

    #[test]
    fn other_frequencies_are_ignored() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(PhyConfig {
            rx_frequency: F2,
            ..config()
        })
        .unwrap();

        cell.send(a, ofdm(burst_100())).unwrap();
        cell.run();
        let stats = cell.radio(b).unwrap().stats();
        assert_eq!(stats.rx_begin, 0);
        assert_eq!(stats.drops_for(DropReason::FrequencyMismatch), 5);
    }

    #[test]
    fn scan_locks_on_the_first_block_heard() {
        let mut cell = cell();
        let a = cell.add_radio(PhyConfig {
            tx_frequency: F2,
            ..config()
        })
        .unwrap();
        let b = cell.add_radio(config()).unwrap();
        let (found, mut outcomes) = mpsc::unbounded_channel();
        cell.radio_mut(b).unwrap().set_scan_callback(move |outcome| {
            let _ = found.send(outcome);
        });

        assert!(cell.start_scanning(b, F2).unwrap());
        assert_eq!(cell.radio(b).unwrap().state(), PhyState::Scanning);
        cell.send(a, ofdm(burst_100())).unwrap();
        cell.run();

        assert_eq!(outcomes.try_recv().unwrap(), ScanOutcome::Found(F2));
        assert!(outcomes.try_recv().is_err());
        let scanner = cell.radio(b).unwrap();
        assert_eq!(scanner.state(), PhyState::Idle);
        assert_eq!((scanner.tx_frequency(), scanner.rx_frequency()), (F2, F2));
        // The rest of the burst arrives with no reception started.
        assert_eq!(scanner.stats().drops_for(DropReason::NotSynchronized), 4);
        assert_eq!(scanner.stats().scans_timed_out, 0);
        // Cancelled timeout never ran.
        assert!(cell.now() < Duration::from_millis(500));
    }

    #[test]
    fn scan_times_out_when_nothing_is_heard() {
        let mut cell = cell();
        let b = cell.add_radio(config()).unwrap();
        let (found, mut outcomes) = mpsc::unbounded_channel();
        cell.radio_mut(b).unwrap().set_scan_callback(move |outcome| {
            let _ = found.send(outcome);
        });

        cell.start_scanning(b, F2).unwrap();
        assert!(!cell.start_scanning(b, F1).unwrap());
        cell.run();

        assert_eq!(outcomes.try_recv().unwrap(), ScanOutcome::TimedOut);
        assert_eq!(cell.now(), Duration::from_millis(500));
        let phy = cell.radio(b).unwrap();
        assert_eq!(phy.state(), PhyState::Idle);
        assert_eq!(phy.rx_frequency(), F1);
    }

    #[test]
    fn duplex_radio_reserves_blocks_heard_while_sending() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(PhyConfig {
            duplex: true,
            ..config()
        })
        .unwrap();

        cell.send(a, ofdm(burst_100())).unwrap();
        cell.send(b, ofdm(burst_100())).unwrap();
        cell.run();

        let simplex = cell.radio(a).unwrap().stats();
        let duplex = cell.radio(b).unwrap().stats();
        assert_eq!(duplex.duplex_reserved, 5);
        assert_eq!(duplex.rx_begin, 0);
        assert_eq!(simplex.drops_for(DropReason::WhileTransmitting), 5);
        assert_eq!(simplex.duplex_reserved, 0);
    }

    #[test]
    fn noise_floor_follows_bandwidth_and_noise_figure() {
        let phy = OfdmPhy::new(RadioId(0), config()).unwrap();
        let expected = -114.0 + 5.0 + 10.0 * (7e6f64 / 1e9).log10();
        assert!((phy.noise_dbm() - expected).abs() < 1e-9);
    }

    /// Ideal channel that records each block's position in its burst and
    /// can rewrite the length field of every burst's first header.
    struct TapChannel {
        inner: SimpleOfdmChannel,
        flags: Vec<(bool, bool)>,
        corrupt_length: bool,
    }

    impl TapChannel {
        fn new(corrupt_length: bool) -> Self {
            Self {
                inner: SimpleOfdmChannel::default(),
                flags: Vec::new(),
                corrupt_length,
            }
        }
    }

    impl Channel for TapChannel {
        fn attach(&mut self, radio: RadioId) {
            self.inner.attach(radio);
        }

        fn send(&mut self, mut tx: BlockTransmission, scheduler: &mut EventScheduler<CellEvent>) {
            self.flags.push((tx.is_first_block, tx.is_last_block));
            if self.corrupt_length && tx.is_first_block {
                let mut bits = tx.block.bits().to_vec();
                // 11-bit generic length, bits 13..24 of the header
                bits[13..24].fill(true);
                tx.block = segment(&bits, bits.len()).pop_front().unwrap();
            }
            self.inner.send(tx, scheduler);
        }
    }

    #[test]
    fn only_the_final_block_is_flagged_last() {
        let mut cell = Cell::new(TapChannel::new(false), FrameDuration::Ms10);
        let a = cell.add_radio(config()).unwrap();
        cell.add_radio(config()).unwrap();
        cell.send(a, ofdm(burst_100())).unwrap();
        cell.run();

        assert_eq!(
            cell.channel().flags,
            vec![
                (true, false),
                (false, false),
                (false, false),
                (false, false),
                (false, true),
            ]
        );
    }

    #[test]
    fn undecodable_burst_is_dropped_without_delivery() {
        let mut cell = Cell::new(TapChannel::new(true), FrameDuration::Ms10);
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(config()).unwrap();
        let (deliver, mut delivered) = mpsc::unbounded_channel();
        cell.radio_mut(b).unwrap().set_receive_callback(move |burst| {
            let _ = deliver.send(burst);
        });

        cell.send(a, ofdm(burst_100())).unwrap();
        cell.run();

        let stats = cell.radio(b).unwrap().stats();
        assert_eq!(stats.blocks_received, 5);
        assert_eq!(stats.erroneous_blocks, 0);
        assert_eq!(stats.rx_end, 1);
        assert_eq!(stats.rx_drop, 1);
        assert_eq!(stats.rx_bursts, 0);
        assert!(delivered.try_recv().is_err());
        assert_eq!(cell.radio(b).unwrap().state(), PhyState::Idle);
    }

    #[test]
    fn delay_longer_than_a_block_still_delivers() {
        // 100 us of propagation against 80 us QPSK-1/2 blocks.
        let mut cell = Cell::new(
            SimpleOfdmChannel::new(Duration::from_micros(100), 80.0),
            FrameDuration::Ms10,
        );
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(config()).unwrap();
        let (rx_sink, mut rx_trace) = mpsc::unbounded_channel();
        let (deliver, mut delivered) = mpsc::unbounded_channel();
        let receiver = cell.radio_mut(b).unwrap();
        receiver.subscribe(rx_sink);
        receiver.set_receive_callback(move |burst| {
            let _ = deliver.send(burst);
        });

        let burst = burst_100();
        cell.send(a, ofdm(burst.clone())).unwrap();
        cell.run_until(Duration::from_micros(250));
        assert_eq!(cell.radio(b).unwrap().state(), PhyState::Receiving);
        cell.run();
        cell.send(a, ofdm(burst.clone())).unwrap();
        cell.run();

        let us = Duration::from_micros;
        let trace = kinds(&mut rx_trace);
        assert_eq!(
            &trace[..3],
            &[
                (PhyTraceKind::RxBegin, us(100)),
                (PhyTraceKind::RxEnd, us(500)),
                (PhyTraceKind::Rx, us(500)),
            ]
        );
        assert_eq!(trace.len(), 6);

        let stats = cell.radio(b).unwrap().stats();
        assert_eq!(stats.rx_begin, 2);
        assert_eq!(stats.rx_end, 2);
        assert_eq!(stats.rx_bursts, 2);
        assert_eq!(stats.blocks_received, 10);
        assert_eq!(stats.drops_for(DropReason::WhileReceiving), 0);
        assert_eq!(cell.radio(b).unwrap().state(), PhyState::Idle);
        for _ in 0..2 {
            assert_eq!(&delivered.try_recv().unwrap(), burst.as_ref());
        }
    }

    #[test]
    fn another_sender_cannot_join_a_burst_in_progress() {
        let mut cell = cell();
        let a = cell.add_radio(config()).unwrap();
        let b = cell.add_radio(config()).unwrap();
        let c = cell.add_radio(config()).unwrap();

        cell.send(a, ofdm(burst_100())).unwrap();
        cell.send(c, ofdm(burst_100())).unwrap();
        cell.run();

        let stats = cell.radio(b).unwrap().stats();
        assert_eq!(stats.rx_bursts, 1);
        assert_eq!(stats.blocks_received, 5);
        assert_eq!(stats.drops_for(DropReason::WhileReceiving), 5);
    }
}
