//! A set of radios sharing one channel, one frame clock and one event queue.

use std::collections::BTreeMap;

use log::{debug, warn};
use wran_core::{Frequency, RadioId};

use crate::channel::{Channel, SimpleOfdmChannel};
use crate::frame_clock::{FrameClock, FrameDuration};
use crate::phy::{OfdmPhy, PhyEvent, RadioContext, SendParams};
use crate::scheduler::{EventScheduler, SchedulerStats, SimTime};
use crate::{PhyConfig, PhyError};

#[derive(Debug, Clone)]
pub enum CellEvent {
    Phy { radio: RadioId, event: PhyEvent },
}

pub struct Cell<C: Channel = SimpleOfdmChannel> {
    radios: BTreeMap<RadioId, OfdmPhy>,
    scheduler: EventScheduler<CellEvent>,
    channel: C,
    frame_clock: FrameClock,
    next_id: u32,
}

impl<C: Channel> Cell<C> {
    pub fn new(channel: C, frame_duration: FrameDuration) -> Self {
        Self {
            radios: BTreeMap::new(),
            scheduler: EventScheduler::new(),
            channel,
            frame_clock: FrameClock::new(frame_duration),
            next_id: 0,
        }
    }

    pub fn add_radio(&mut self, config: PhyConfig) -> Result<RadioId, PhyError> {
        let id = RadioId(self.next_id);
        let phy = OfdmPhy::new(id, config)?;
        self.next_id += 1;
        self.channel.attach(id);
        self.radios.insert(id, phy);
        Ok(id)
    }

    pub fn radio(&self, id: RadioId) -> Option<&OfdmPhy> {
        self.radios.get(&id)
    }

    pub fn radio_mut(&mut self, id: RadioId) -> Option<&mut OfdmPhy> {
        self.radios.get_mut(&id)
    }

    pub fn radio_ids(&self) -> impl Iterator<Item = RadioId> + '_ {
        self.radios.keys().copied()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn frame_clock(&self) -> &FrameClock {
        &self.frame_clock
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Hands a burst to radio `id`. `Ok(false)` means the radio dropped it.
    pub fn send(&mut self, id: RadioId, params: SendParams) -> Result<bool, PhyError> {
        let phy = self.radios.get_mut(&id).ok_or(PhyError::UnknownRadio(id))?;
        let mut ctx = RadioContext {
            id,
            scheduler: &mut self.scheduler,
            channel: &mut self.channel,
            frame_clock: &self.frame_clock,
        };
        Ok(phy.send(&mut ctx, params))
    }

    pub fn start_scanning(&mut self, id: RadioId, frequency: Frequency) -> Result<bool, PhyError> {
        let phy = self.radios.get_mut(&id).ok_or(PhyError::UnknownRadio(id))?;
        let mut ctx = RadioContext {
            id,
            scheduler: &mut self.scheduler,
            channel: &mut self.channel,
            frame_clock: &self.frame_clock,
        };
        Ok(phy.start_scanning(&mut ctx, frequency))
    }

    /// Runs the next pending event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((at, CellEvent::Phy { radio, event })) = self.scheduler.pop() else {
            return false;
        };
        let Some(phy) = self.radios.get_mut(&radio) else {
            warn!("event at {:?} for unknown {}", at, radio);
            return true;
        };
        let mut ctx = RadioContext {
            id: radio,
            scheduler: &mut self.scheduler,
            channel: &mut self.channel,
            frame_clock: &self.frame_clock,
        };
        phy.handle(&mut ctx, event);
        true
    }

    /// Runs until no events remain. Returns the number of events executed.
    pub fn run(&mut self) -> usize {
        let mut executed = 0;
        while self.step() {
            executed += 1;
        }
        debug!("cell idle at {:?} after {} events", self.now(), executed);
        executed
    }

    /// Runs every event due at or before `until`.
    pub fn run_until(&mut self, until: SimTime) -> usize {
        let mut executed = 0;
        while self.scheduler.peek_time().is_some_and(|at| at <= until) {
            self.step();
            executed += 1;
        }
        executed
    }
}
