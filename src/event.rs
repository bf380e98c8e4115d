//! Event definitions for the simulation kernel.
//!
//! An event is a deferred closure bound to a virtual instant. This module
//! holds the closure wrapper ([`EventPayload`]), the record the scheduler
//! stores ([`PendingEvent`]), its lifecycle ([`EventState`]) and the copyable
//! reference consumers keep to query or cancel it ([`EventHandle`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::SimulationEngine;
use crate::time::VirtualTime;
use crate::types::{ContextId, EngineId, SequenceNumber};

/// Error type a payload may return. It reaches the caller of
/// [`SimulationEngine::run`] unchanged.
pub type EventError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of invoking a payload.
pub type EventResult = Result<(), EventError>;

/// Return types accepted from payload closures: `()` or [`EventResult`].
pub trait IntoEventResult {
    fn into_event_result(self) -> EventResult;
}

impl IntoEventResult for () {
    fn into_event_result(self) -> EventResult {
        Ok(())
    }
}

impl IntoEventResult for EventResult {
    fn into_event_result(self) -> EventResult {
        self
    }
}

type Callback = Box<dyn FnOnce(&mut SimulationEngine) -> EventResult>;

/// A type-erased, run-once closure with its bound arguments.
///
/// `Empty` exists so consumers can hold an "unset" callback (e.g. a receive
/// handler nobody installed yet) and test for it with [`is_null`].
/// Invoking an empty payload does nothing.
///
/// [`is_null`]: EventPayload::is_null
#[derive(Default)]
pub enum EventPayload {
    #[default]
    Empty,
    Bound(Callback),
}

impl EventPayload {
    /// Wraps a closure. The closure receives the engine so it can schedule
    /// follow-up work.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce(&mut SimulationEngine) -> R + 'static,
        R: IntoEventResult,
    {
        EventPayload::Bound(Box::new(move |engine| f(engine).into_event_result()))
    }

    /// Binds `args` to `f` by value now; `f` runs with them when the event
    /// fires.
    ///
    /// ```
    /// use jikan::{EventPayload, SimulationEngine, VirtualTime};
    ///
    /// fn deliver(engine: &mut SimulationEngine, (node, bytes): (u32, usize)) {
    ///     assert_eq!(engine.context(), node);
    ///     assert_eq!(bytes, 1500);
    /// }
    ///
    /// let mut engine = SimulationEngine::new();
    /// engine
    ///     .schedule_with_context(3, VirtualTime::from_micros(2), EventPayload::bind(deliver, (3, 1500)))
    ///     .unwrap();
    /// engine.run().unwrap();
    /// ```
    pub fn bind<F, A, R>(f: F, args: A) -> Self
    where
        F: FnOnce(&mut SimulationEngine, A) -> R + 'static,
        A: 'static,
        R: IntoEventResult,
    {
        EventPayload::Bound(Box::new(move |engine| f(engine, args).into_event_result()))
    }

    /// The unbound payload.
    pub fn empty() -> Self {
        EventPayload::Empty
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EventPayload::Empty)
    }

    /// Runs the closure, consuming it.
    pub fn invoke(self, engine: &mut SimulationEngine) -> EventResult {
        match self {
            EventPayload::Empty => Ok(()),
            EventPayload::Bound(callback) => callback(engine),
        }
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPayload::Empty => write!(f, "EventPayload::Empty"),
            EventPayload::Bound(_) => write!(f, "EventPayload::Bound(..)"),
        }
    }
}

/// Lifecycle of a scheduled event.
///
/// `Pending → Running → Done` on the normal path, `Pending → Cancelled` when
/// cancelled in time. A running event cannot be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventState {
    Pending,
    Running,
    Done,
    Cancelled,
}

impl EventState {
    /// Done or Cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventState::Done | EventState::Cancelled)
    }
}

/// The scheduling record stored by the [`Scheduler`](crate::Scheduler).
#[derive(Debug)]
pub struct PendingEvent {
    pub(crate) fire_time: VirtualTime,
    pub(crate) seq: SequenceNumber,
    pub(crate) context: ContextId,
    pub(crate) payload: Option<EventPayload>,
    pub(crate) state: EventState,
}

impl PendingEvent {
    pub fn new(
        fire_time: VirtualTime,
        seq: SequenceNumber,
        context: ContextId,
        payload: EventPayload,
    ) -> Self {
        Self {
            fire_time,
            seq,
            context,
            payload: Some(payload),
            state: EventState::Pending,
        }
    }

    pub fn fire_time(&self) -> VirtualTime {
        self.fire_time
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.seq
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    /// Drops the payload, releasing whatever it captured.
    pub(crate) fn release(&mut self) {
        self.payload = None;
    }
}

/// Copyable reference to a scheduled event.
///
/// A handle does not own the event; every query goes through the engine
/// that issued it, so all copies agree. Handles from another engine, or
/// whose record storage was reclaimed, read as expired.
///
/// Note on naming: [`is_running`](EventHandle::is_running) means "still
/// scheduled" (Pending), not "currently executing". While its own callback
/// runs, an event is neither running nor expired in this sense.
///
/// `EventHandle::default()` refers to no event and is always expired, which
/// makes it a convenient "no timer armed" value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventHandle {
    pub(crate) engine: EngineId,
    pub(crate) slot: u32,
    pub(crate) seq: SequenceNumber,
    pub(crate) fire_time: VirtualTime,
    pub(crate) context: ContextId,
}

impl EventHandle {
    /// Absolute time the event is (or was) due. Valid in every state.
    pub fn fire_time(&self) -> VirtualTime {
        self.fire_time
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.seq
    }

    /// Context the event is attributed to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// `true` while the event is still Pending.
    pub fn is_running(&self, engine: &SimulationEngine) -> bool {
        engine.is_pending(self)
    }

    /// `true` once the event is Done or Cancelled.
    pub fn is_expired(&self, engine: &SimulationEngine) -> bool {
        engine.is_expired(self)
    }

    /// Cancels the event if it is still Pending; otherwise does nothing.
    pub fn cancel(&self, engine: &mut SimulationEngine) -> bool {
        engine.cancel(self)
    }

    /// Current state, or `None` once the record has been reclaimed (which
    /// only happens after it reached a terminal state).
    pub fn state(&self, engine: &SimulationEngine) -> Option<EventState> {
        engine.event_state(self)
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}@{}", self.seq, self.fire_time)
    }
}
