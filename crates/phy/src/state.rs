//! PHY operating states and the transition table shared by the TX and RX
//! handlers.
//!
//! Every (state, input) pair is listed. Pairs that can only arise from a
//! broken handler sequence are reported as [`IllegalTransition`], which the
//! PHY treats as fatal.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhyState {
    Idle,
    Transmitting,
    Receiving,
    Scanning,
}

impl fmt::Display for PhyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhyState::Idle => "idle",
            PhyState::Transmitting => "transmitting",
            PhyState::Receiving => "receiving",
            PhyState::Scanning => "scanning",
        };
        f.write_str(name)
    }
}

/// How an arriving block relates to this radio's frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalMatch {
    pub scan_target: bool,
    pub rx_frequency: bool,
    pub duplex: bool,
    /// A later block of the burst already being received.
    pub continuation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyInput {
    Send,
    ScanStart,
    TxBlockStart,
    TxBlockEnd,
    BlockArrival(ArrivalMatch),
    /// `more_in_flight` is set when a later block of the same burst is
    /// already being received.
    RxBlockEnd { more_in_flight: bool },
    ScanTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// A send or scan request arrived while the radio was busy.
    NotIdle(PhyState),
    EmptyBurst,
    ScanMismatch,
    FrequencyMismatch,
    WhileReceiving,
    WhileTransmitting,
    /// A continuation block arrived with no burst reception in progress.
    NotSynchronized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Enter(PhyState),
    Drop(DropReason),
    /// Duplex reception while transmitting: accepted, not processed further.
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal PHY transition: {input:?} while {state}")]
pub struct IllegalTransition {
    pub state: PhyState,
    pub input: PhyInput,
}

pub fn transition(state: PhyState, input: PhyInput) -> Result<Step, IllegalTransition> {
    use PhyInput as I;
    use PhyState as S;

    let step = match (state, input) {
        (S::Idle, I::Send) => Step::Enter(S::Transmitting),
        (S::Transmitting | S::Receiving | S::Scanning, I::Send) => Step::Drop(DropReason::NotIdle(state)),

        (S::Idle, I::ScanStart) => Step::Enter(S::Scanning),
        (S::Transmitting | S::Receiving | S::Scanning, I::ScanStart) => {
            Step::Drop(DropReason::NotIdle(state))
        }

        (S::Idle | S::Transmitting, I::TxBlockStart) => Step::Enter(S::Transmitting),
        (S::Transmitting, I::TxBlockEnd) => Step::Enter(S::Idle),

        (S::Scanning, I::BlockArrival(m)) if m.scan_target => Step::Enter(S::Idle),
        (S::Scanning, I::BlockArrival(_)) => Step::Drop(DropReason::ScanMismatch),
        (S::Idle, I::BlockArrival(m)) if m.rx_frequency => Step::Enter(S::Receiving),
        (S::Idle, I::BlockArrival(_)) => Step::Drop(DropReason::FrequencyMismatch),
        (S::Receiving, I::BlockArrival(m)) if m.rx_frequency && m.continuation => Step::Enter(S::Receiving),
        (S::Receiving, I::BlockArrival(_)) => Step::Drop(DropReason::WhileReceiving),
        (S::Transmitting, I::BlockArrival(m)) if m.duplex && m.rx_frequency => Step::Reserved,
        (S::Transmitting, I::BlockArrival(_)) => Step::Drop(DropReason::WhileTransmitting),

        (S::Receiving, I::RxBlockEnd { more_in_flight: true }) => Step::Enter(S::Receiving),
        (S::Receiving, I::RxBlockEnd { more_in_flight: false }) => Step::Enter(S::Idle),
        (S::Scanning, I::ScanTimeout) => Step::Enter(S::Idle),

        (S::Receiving | S::Scanning, I::TxBlockStart)
        | (S::Idle | S::Receiving | S::Scanning, I::TxBlockEnd)
        | (S::Idle | S::Transmitting | S::Scanning, I::RxBlockEnd { .. })
        | (S::Idle | S::Transmitting | S::Receiving, I::ScanTimeout) => {
            return Err(IllegalTransition { state, input })
        }
    };
    Ok(step)
}
