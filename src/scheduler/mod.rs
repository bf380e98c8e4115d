//! The pending-event store.
//!
//! [`Scheduler`] owns every [`PendingEvent`] in a slot arena and delegates
//! ordering to a pluggable [`SchedulerBackend`]. Backends only ever see
//! [`EventKey`]s, ordered by `(fire time, insertion sequence)`; since
//! sequences are unique no two keys compare equal and ties at one instant
//! resolve in scheduling order.
//!
//! Cancellation flips the record to `Cancelled` and drops its payload
//! straight away. Backends that can delete cheaply ([`MapScheduler`],
//! [`CalendarScheduler`]) drop the key too; the binary heap leaves it in
//! place and the scheduler skips it when it surfaces.

pub mod calendar;
pub mod heap;
pub mod map;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::event::{EventPayload, EventState, PendingEvent};
use crate::time::VirtualTime;
use crate::types::{ContextId, SequenceNumber};

pub use calendar::{CalendarConfig, CalendarScheduler};
pub use heap::HeapScheduler;
pub use map::MapScheduler;

/// Ordering key handed to backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub time: VirtualTime,
    pub seq: SequenceNumber,
    /// Arena slot of the record; not part of the ordering.
    pub slot: u32,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordering strategy behind a [`Scheduler`].
///
/// Implementations must return keys in ascending `(time, seq)` order from
/// `peek`/`pop`, whatever the insertion order.
pub trait SchedulerBackend {
    /// Short name used in logs and statistics.
    fn name(&self) -> &'static str;

    fn insert(&mut self, key: EventKey);

    /// Smallest key, without removing it.
    fn peek(&self) -> Option<EventKey>;

    /// Removes and returns the smallest key.
    fn pop(&mut self) -> Option<EventKey>;

    /// Removes `key` if present.
    fn remove(&mut self, key: &EventKey) -> bool;

    /// Whether `remove` is cheap enough to run on every cancellation.
    /// When `false`, cancelled keys stay until they reach the front.
    fn eager_removal(&self) -> bool {
        true
    }

    /// Number of keys held, including lazily cancelled ones.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

/// The available backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Binary heap, the reference implementation.
    #[default]
    Heap,
    /// Ordered map.
    Map,
    /// Calendar queue.
    Calendar,
}

impl SchedulerKind {
    /// Instantiates the backend.
    pub fn build(self, calendar: &CalendarConfig) -> Box<dyn SchedulerBackend> {
        match self {
            SchedulerKind::Heap => Box::new(HeapScheduler::new()),
            SchedulerKind::Map => Box::new(MapScheduler::new()),
            SchedulerKind::Calendar => Box::new(CalendarScheduler::with_config(calendar)),
        }
    }
}

/// An event taken off the scheduler for execution.
#[derive(Debug)]
pub struct ReadyEvent {
    pub key: EventKey,
    pub context: ContextId,
    pub payload: EventPayload,
}

/// Arena of pending-event records plus an ordering backend.
pub struct Scheduler {
    slots: Vec<PendingEvent>,
    /// Slots whose record is terminal and no longer referenced by the backend.
    free: Vec<u32>,
    backend: Box<dyn SchedulerBackend>,
    /// Records in state Pending.
    pending: usize,
}

impl Scheduler {
    pub fn new(backend: Box<dyn SchedulerBackend>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            backend,
            pending: 0,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Stores `event` and queues it. Returns its ordering key.
    pub fn insert(&mut self, event: PendingEvent) -> EventKey {
        debug_assert_eq!(event.state, EventState::Pending);
        let (time, seq) = (event.fire_time, event.seq);
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = event;
                slot
            }
            None => {
                self.slots.push(event);
                (self.slots.len() - 1) as u32
            }
        };
        let key = EventKey { time, seq, slot };
        self.backend.insert(key);
        self.pending += 1;
        key
    }

    /// Earliest event that is still Pending.
    pub fn peek_earliest(&mut self) -> Option<&PendingEvent> {
        let key = self.front()?;
        Some(&self.slots[key.slot as usize])
    }

    /// Removes the earliest Pending event and marks it Running. The caller
    /// reports completion with [`finish`](Scheduler::finish).
    pub fn pop_earliest(&mut self) -> SimResult<Option<ReadyEvent>> {
        let Some(key) = self.front() else {
            return Ok(None);
        };
        self.backend.pop();
        self.pending -= 1;

        let record = &mut self.slots[key.slot as usize];
        let payload = record
            .payload
            .take()
            .ok_or(SimError::DoubleInvocation { seq: key.seq })?;
        record.state = EventState::Running;

        Ok(Some(ReadyEvent {
            key,
            context: record.context,
            payload,
        }))
    }

    /// Marks a Running event Done and recycles its slot.
    pub fn finish(&mut self, key: EventKey) {
        let finished = match self.record_mut(key.slot, key.seq) {
            Some(record) if record.state == EventState::Running => {
                record.state = EventState::Done;
                true
            }
            _ => false,
        };
        if finished {
            self.free.push(key.slot);
        }
    }

    /// Pending → Cancelled. Removes the key from the backend when the
    /// backend deletes cheaply, otherwise leaves it to be skipped.
    pub fn cancel(&mut self, slot: u32, seq: SequenceNumber) -> bool {
        let eager = self.backend.eager_removal();
        self.cancel_with(slot, seq, eager)
    }

    /// Pending → Cancelled, always removing the key from the backend.
    pub fn remove(&mut self, slot: u32, seq: SequenceNumber) -> bool {
        self.cancel_with(slot, seq, true)
    }

    fn cancel_with(&mut self, slot: u32, seq: SequenceNumber, remove_key: bool) -> bool {
        let Some(record) = self.record_mut(slot, seq) else {
            return false;
        };
        if record.state != EventState::Pending {
            return false;
        }
        record.state = EventState::Cancelled;
        record.release();
        let key = EventKey {
            time: record.fire_time,
            seq,
            slot,
        };
        self.pending -= 1;

        if remove_key && self.backend.remove(&key) {
            self.free.push(slot);
        }
        true
    }

    /// State of the record at `slot`, if it still belongs to `seq`.
    pub fn state(&self, slot: u32, seq: SequenceNumber) -> Option<EventState> {
        self.slots
            .get(slot as usize)
            .filter(|record| record.seq == seq)
            .map(|record| record.state)
    }

    /// Number of Pending events.
    pub fn len(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Cancels everything without invoking it. Returns how many Pending
    /// events were released.
    ///
    /// A Running record is left alone and keeps its slot until
    /// [`finish`](Scheduler::finish) is called for it.
    pub fn clear(&mut self) -> usize {
        let released = self.pending;
        self.free.clear();
        for (slot, record) in self.slots.iter_mut().enumerate().rev() {
            if record.state == EventState::Running {
                continue;
            }
            if record.state == EventState::Pending {
                record.state = EventState::Cancelled;
            }
            record.release();
            self.free.push(slot as u32);
        }
        self.backend.clear();
        self.pending = 0;
        released
    }

    /// Fire time of the earliest Pending event, through a shared borrow.
    ///
    /// Falls back to a scan of the arena when the backend front is a lazily
    /// cancelled key.
    pub fn earliest_time(&self) -> Option<VirtualTime> {
        let key = self.backend.peek()?;
        let record = &self.slots[key.slot as usize];
        if record.seq == key.seq && record.state == EventState::Pending {
            return Some(key.time);
        }
        self.slots
            .iter()
            .filter(|record| record.state == EventState::Pending)
            .map(|record| record.fire_time)
            .min()
    }

    /// Front key of the backend, discarding cancelled keys on the way.
    fn front(&mut self) -> Option<EventKey> {
        loop {
            let key = self.backend.peek()?;
            let record = &self.slots[key.slot as usize];
            if record.seq == key.seq && record.state == EventState::Pending {
                return Some(key);
            }
            self.backend.pop();
            if record.seq == key.seq {
                self.free.push(key.slot);
            }
        }
    }

    fn record_mut(&mut self, slot: u32, seq: SequenceNumber) -> Option<&mut PendingEvent> {
        self.slots
            .get_mut(slot as usize)
            .filter(|record| record.seq == seq)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("backend", &self.backend.name())
            .field("pending", &self.pending)
            .field("slots", &self.slots.len())
            .finish()
    }
}
