//! Discrete-event scheduler for simulated PHY time

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use log::trace;

/// Simulated time elapsed since the start of the run.
pub type SimTime = Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

struct Scheduled<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

// Min-heap on (time, insertion order) so ties fire FIFO.
impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl<E> Eq for Scheduled<E> {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub executed: u64,
    pub cancelled: u64,
}

pub struct EventScheduler<E> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Scheduled<E>>,
    pending: HashSet<u64>,
    stats: SchedulerStats,
}

impl<E> Default for EventScheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventScheduler<E> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
            pending: HashSet::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Queues `event` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, event: E) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let at = self.now + delay;
        self.queue.push(Scheduled { at, seq, event });
        self.pending.insert(seq);
        self.stats.scheduled += 1;
        trace!("event {} scheduled for {:?}", seq, at);
        EventId(seq)
    }

    pub fn schedule_now(&mut self, event: E) -> EventId {
        self.schedule(Duration::ZERO, event)
    }

    /// Returns false if the event already fired or was cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let removed = self.pending.remove(&id.0);
        if removed {
            self.stats.cancelled += 1;
            trace!("event {} cancelled", id.0);
        }
        removed
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id.0)
    }

    /// Time of the next live event, if any.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        self.drop_cancelled_head();
        self.queue.peek().map(|s| s.at)
    }

    /// Removes the next live event and advances the clock to its time.
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        self.drop_cancelled_head();
        let next = self.queue.pop()?;
        self.pending.remove(&next.seq);
        self.now = next.at;
        self.stats.executed += 1;
        Some((next.at, next.event))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    fn drop_cancelled_head(&mut self) {
        while let Some(head) = self.queue.peek() {
            if self.pending.contains(&head.seq) {
                break;
            }
            self.queue.pop();
        }
    }
}
