//! The simulation engine.
//!
//! `SimulationEngine` owns the virtual clock and the pending-event
//! [`Scheduler`], and runs the pop-invoke loop. It is an ordinary value:
//! several engines can coexist in one process, each with its own clock,
//! sequence counter and handles.
//!
//! Payloads receive `&mut SimulationEngine` while they run, so they can
//! schedule and cancel freely. Calling [`run`](SimulationEngine::run) from
//! inside a payload is rejected with [`SimError::ReentrantRun`], and a
//! [`destroy`](SimulationEngine::destroy) issued from a payload takes full
//! effect once the run has returned.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::{SimError, SimResult};
use crate::event::{EventHandle, EventPayload, EventState, PendingEvent};
use crate::scheduler::{CalendarConfig, ReadyEvent, Scheduler, SchedulerKind};
use crate::stats::{EngineStats, SimulationStats, StatsCollector};
use crate::time::VirtualTime;
use crate::types::{ContextId, EngineId, SequenceNumber, NO_CONTEXT};

/// Engine ids start at 1 so that `EventHandle::default()` matches no engine.
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Why a call to [`SimulationEngine::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No pending events remained.
    Exhausted,
    /// [`stop`](SimulationEngine::stop) was called.
    Stopped,
    /// The next event lay past the stop time.
    StopTime,
}

/// Outcome of a completed [`SimulationEngine::run`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Events invoked during this run
    pub events_executed: u64,
    /// Virtual clock when the run began
    pub start_time: VirtualTime,
    /// Virtual clock when the run ended
    pub final_time: VirtualTime,
    pub reason: StopReason,
}

/// A discrete-event simulation engine.
///
/// # Example
///
/// ```
/// use jikan::{EventPayload, SimulationEngine, VirtualTime};
///
/// let mut engine = SimulationEngine::new();
/// engine
///     .schedule(VirtualTime::from_nanos(10), EventPayload::new(|eng: &mut SimulationEngine| {
///         assert_eq!(eng.now(), VirtualTime::from_nanos(10));
///     }))
///     .unwrap();
///
/// let summary = engine.run().unwrap();
/// assert_eq!(summary.events_executed, 1);
/// assert_eq!(engine.now(), VirtualTime::from_nanos(10));
/// ```
pub struct SimulationEngine {
    id: EngineId,
    kind: SchedulerKind,
    scheduler: Scheduler,
    /// Current virtual time
    now: VirtualTime,
    /// Context of the event being invoked, `NO_CONTEXT` otherwise
    context: ContextId,
    /// Next insertion sequence; never reset
    next_seq: SequenceNumber,
    running: bool,
    /// `destroy` was called from inside a run; finished when the run returns
    teardown_pending: bool,
    stop_requested: bool,
    stop_time: Option<VirtualTime>,
    /// Events executed since construction or the last `destroy`
    event_count: u64,
    stats: EngineStats,
    collector: Option<StatsCollector>,
}

impl SimulationEngine {
    /// Creates an engine backed by the binary heap.
    pub fn new() -> Self {
        Self::with_scheduler(SchedulerKind::default())
    }

    /// Creates an engine backed by the given scheduler.
    pub fn with_scheduler(kind: SchedulerKind) -> Self {
        Self::build(kind, &CalendarConfig::default())
    }

    /// Creates an engine from a configuration: backend, calendar tuning,
    /// stop time and statistics collection.
    pub fn with_config(config: &EngineConfig) -> Self {
        let mut engine = Self::build(config.scheduler, &config.calendar);
        engine.stop_time = config.stop_time;
        if config.collect_stats {
            engine.collector = Some(StatsCollector::new());
        }
        engine
    }

    fn build(kind: SchedulerKind, calendar: &CalendarConfig) -> Self {
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(engine = id, scheduler = ?kind, "engine created");
        Self {
            id,
            kind,
            scheduler: Scheduler::new(kind.build(calendar)),
            now: VirtualTime::ZERO,
            context: NO_CONTEXT,
            next_seq: 0,
            running: false,
            teardown_pending: false,
            stop_requested: false,
            stop_time: None,
            event_count: 0,
            stats: EngineStats::default(),
            collector: None,
        }
    }

    /// Process-unique identifier of this engine.
    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.kind
    }

    // ---------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------

    /// Schedules `payload` to fire `delay` after [`now`](Self::now), in the
    /// context of the caller.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidDelay`] for a negative delay and
    /// [`SimError::Overflow`] if the fire time is not representable. Nothing
    /// is queued in either case.
    pub fn schedule(&mut self, delay: VirtualTime, payload: EventPayload) -> SimResult<EventHandle> {
        self.schedule_with_context(self.context, delay, payload)
    }

    /// Like [`schedule`](Self::schedule), but the event runs in `context`
    /// rather than the caller's.
    pub fn schedule_with_context(
        &mut self,
        context: ContextId,
        delay: VirtualTime,
        payload: EventPayload,
    ) -> SimResult<EventHandle> {
        if delay.is_strictly_negative() {
            return Err(SimError::InvalidDelay { delay });
        }
        let fire_time = self.now.checked_add(delay)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        let key = self
            .scheduler
            .insert(PendingEvent::new(fire_time, seq, context, payload));

        self.stats.scheduled += 1;
        self.stats.peak_pending = self.stats.peak_pending.max(self.scheduler.len());
        debug!(seq, context, fire_time = %fire_time, "event scheduled");

        Ok(EventHandle {
            engine: self.id,
            slot: key.slot,
            seq,
            fire_time,
            context,
        })
    }

    /// Schedules `payload` at the current instant. It still queues behind
    /// every event already due now.
    pub fn schedule_now(&mut self, payload: EventPayload) -> SimResult<EventHandle> {
        self.schedule(VirtualTime::ZERO, payload)
    }

    // ---------------------------------------------------------------
    // Handles
    // ---------------------------------------------------------------

    /// Cancels a Pending event and releases its payload. Returns whether the
    /// event was Pending; cancelling anything else is a no-op.
    pub fn cancel(&mut self, handle: &EventHandle) -> bool {
        if !self.owns(handle) || !self.scheduler.cancel(handle.slot, handle.seq) {
            return false;
        }
        self.stats.cancelled += 1;
        debug!(seq = handle.seq, "event cancelled");
        true
    }

    /// Cancels a Pending event and takes it out of the backend immediately,
    /// even on backends that otherwise skip cancelled events lazily.
    pub fn remove(&mut self, handle: &EventHandle) -> bool {
        if !self.owns(handle) || !self.scheduler.remove(handle.slot, handle.seq) {
            return false;
        }
        self.stats.cancelled += 1;
        self.stats.removed += 1;
        debug!(seq = handle.seq, "event removed");
        true
    }

    /// State of the event behind `handle`, or `None` if the handle belongs
    /// to another engine or its record has been reclaimed.
    pub fn event_state(&self, handle: &EventHandle) -> Option<EventState> {
        if !self.owns(handle) {
            return None;
        }
        self.scheduler.state(handle.slot, handle.seq)
    }

    /// Whether the event is still waiting to fire.
    pub fn is_pending(&self, handle: &EventHandle) -> bool {
        self.event_state(handle) == Some(EventState::Pending)
    }

    /// Whether the event is Done or Cancelled. A reclaimed record was
    /// necessarily one of the two.
    pub fn is_expired(&self, handle: &EventHandle) -> bool {
        !matches!(
            self.event_state(handle),
            Some(EventState::Pending | EventState::Running)
        )
    }

    /// Time left until a Pending event fires; zero otherwise.
    pub fn delay_left(&self, handle: &EventHandle) -> VirtualTime {
        if self.is_pending(handle) {
            handle.fire_time - self.now
        } else {
            VirtualTime::ZERO
        }
    }

    fn owns(&self, handle: &EventHandle) -> bool {
        handle.engine == self.id
    }

    // ---------------------------------------------------------------
    // Clock and queue
    // ---------------------------------------------------------------

    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Context of the event currently being invoked, [`NO_CONTEXT`] outside
    /// of any invocation.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Events executed since construction or the last `destroy`.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Number of Pending events.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Fire time of the earliest Pending event.
    ///
    /// Takes `&mut self` because lazily cancelled entries are discarded on
    /// the way to the front.
    pub fn next_event_time(&mut self) -> Option<VirtualTime> {
        self.scheduler.peek_earliest().map(PendingEvent::fire_time)
    }

    /// Same answer as [`next_event_time`](Self::next_event_time) through a
    /// shared borrow. Cancelled entries are left in place, so this may scan
    /// the pending set when the front entry was cancelled.
    pub fn peek_next_time(&self) -> Option<VirtualTime> {
        self.scheduler.earliest_time()
    }

    /// `true` when nothing is left to run or a stop has been requested.
    pub fn is_finished(&self) -> bool {
        self.stop_requested || self.scheduler.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // ---------------------------------------------------------------
    // Run loop
    // ---------------------------------------------------------------

    /// Runs events in `(fire time, sequence)` order until the queue is
    /// empty, [`stop`](Self::stop) is called, or the next event lies past
    /// the stop time.
    ///
    /// An error returned by a payload ends the run and is returned as
    /// [`SimError::Event`]. The failed event is already Done at that point
    /// and every other event is still queued in order, so the engine can be
    /// inspected, run again or destroyed.
    ///
    /// A payload that panics is treated the same way: the event is marked
    /// Done, the run is closed and the panic resumes out of `run`. The
    /// engine can be run again by a caller that catches it.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        if self.running {
            return Err(SimError::ReentrantRun);
        }
        self.running = true;
        self.stop_requested = false;

        let start_time = self.now;
        let start_count = self.event_count;
        info!(
            engine = self.id,
            scheduler = self.scheduler.backend_name(),
            pending = self.scheduler.len(),
            now = %self.now,
            "simulation run started"
        );
        if let Some(collector) = self.collector.as_mut() {
            collector.start();
        }

        let outcome = self.run_loop();

        let events_executed = self.event_count - start_count;
        let final_time = self.now;
        self.end_run();
        if self.collector.is_some() {
            let snapshot = self.export_stats();
            if let Some(collector) = self.collector.as_mut() {
                collector.update_from_json(&snapshot);
                collector.stop();
            }
        }

        let reason = outcome?;
        info!(
            engine = self.id,
            events = events_executed,
            now = %self.now,
            reason = ?reason,
            "simulation run finished"
        );
        Ok(RunSummary {
            events_executed,
            start_time,
            final_time,
            reason,
        })
    }

    fn run_loop(&mut self) -> SimResult<StopReason> {
        loop {
            if self.stop_requested {
                return Ok(StopReason::Stopped);
            }
            let Some(next) = self.next_event_time() else {
                return Ok(StopReason::Exhausted);
            };
            if let Some(stop_time) = self.stop_time {
                if stop_time < next {
                    self.stop_time = None;
                    return Ok(StopReason::StopTime);
                }
            }

            let Some(ReadyEvent { key, context, payload }) = self.scheduler.pop_earliest()? else {
                return Ok(StopReason::Exhausted);
            };
            debug_assert!(key.time >= self.now);
            self.now = key.time;
            self.context = context;
            trace!(seq = key.seq, context, now = %self.now, "invoking event");

            let result = panic::catch_unwind(AssertUnwindSafe(|| payload.invoke(self)));

            self.scheduler.finish(key);
            self.context = NO_CONTEXT;
            self.event_count += 1;
            self.stats.executed += 1;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(seq = key.seq, error = %err, "event returned an error");
                    return Err(SimError::Event(err));
                }
                Err(cause) => {
                    warn!(seq = key.seq, now = %self.now, "event panicked");
                    self.end_run();
                    panic::resume_unwind(cause);
                }
            }
        }
    }

    /// Leaves the running state and completes a teardown requested from
    /// inside the run.
    fn end_run(&mut self) {
        self.running = false;
        self.context = NO_CONTEXT;
        if std::mem::take(&mut self.teardown_pending) {
            self.destroy();
        }
    }

    /// Ends the current run once the executing event returns. Outside of a
    /// run it only marks the engine finished; the next `run` clears it.
    pub fn stop(&mut self) {
        debug!(now = %self.now, "stop requested");
        self.stop_requested = true;
    }

    /// Stops before the first event whose fire time is strictly after `at`.
    /// Events due at `at` itself still run. The clock is not advanced to
    /// `at`, and the stop time is cleared once it takes effect.
    pub fn stop_at(&mut self, at: VirtualTime) {
        debug!(at = %at, "stop time set");
        self.stop_time = Some(at);
    }

    /// [`stop_at`](Self::stop_at) relative to [`now`](Self::now).
    pub fn stop_after(&mut self, delay: VirtualTime) -> SimResult<()> {
        if delay.is_strictly_negative() {
            return Err(SimError::InvalidDelay { delay });
        }
        let at = self.now.checked_add(delay)?;
        self.stop_at(at);
        Ok(())
    }

    /// Currently armed stop time, if any.
    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.stop_time
    }

    /// Drops every pending event without invoking it, resets the clock to
    /// zero and clears any stop condition. Returns how many Pending events
    /// were released. Calling it again is harmless.
    ///
    /// Outstanding handles read as expired afterwards.
    ///
    /// Called from inside a payload, the pending events are released at
    /// once and the run stops when that payload returns. The clock keeps
    /// its value until then; events scheduled in the meantime are dropped
    /// and the reset completes as `run` returns. The engine stays marked
    /// as running throughout, so a nested `run` is still rejected.
    pub fn destroy(&mut self) -> usize {
        let released = self.scheduler.clear();
        self.stats.destroyed += released as u64;
        if self.running {
            self.teardown_pending = true;
            self.stop_requested = true;
            debug!(engine = self.id, released, "engine destroy deferred to the end of the run");
            return released;
        }
        self.now = VirtualTime::ZERO;
        self.context = NO_CONTEXT;
        self.stop_requested = false;
        self.stop_time = None;
        self.event_count = 0;
        debug!(engine = self.id, released, "engine destroyed");
        released
    }

    // ---------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Report of the last run, when the engine was configured with
    /// `collect_stats`.
    pub fn collected_stats(&self) -> Option<&SimulationStats> {
        self.collector.as_ref().map(StatsCollector::stats)
    }

    /// Snapshot of the engine state and counters.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "engine": {
                "id": self.id,
                "scheduler": self.scheduler.backend_name(),
                "now": self.now,
                "pending": self.scheduler.len(),
                "event_count": self.event_count,
                "stop_time": self.stop_time,
                "counters": self.stats,
            }
        })
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("id", &self.id)
            .field("now", &self.now)
            .field("context", &self.context)
            .field("scheduler", &self.scheduler)
            .field("running", &self.running)
            .field("stop_time", &self.stop_time)
            .finish()
    }
}
