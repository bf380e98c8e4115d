//! End-to-end tests for the SimulationEngine.
//!
//! Every scenario runs against each scheduler backend:
//! - Ordering and tie-break
//! - Cancellation and idempotent cancel
//! - Reentrant scheduling from inside events
//! - Stop conditions, errors and destroy

use std::cell::RefCell;
use std::rc::Rc;

use jikan::{
    ContextId, EventHandle, EventPayload, EventResult, SchedulerKind, SimError, SimulationEngine,
    StopReason, VirtualTime, NO_CONTEXT,
};

const BACKENDS: [SchedulerKind; 3] = [
    SchedulerKind::Heap,
    SchedulerKind::Map,
    SchedulerKind::Calendar,
];

/// One invocation: label, clock and context as seen by the event.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Hit {
    label: &'static str,
    now: VirtualTime,
    context: ContextId,
}

#[derive(Clone, Default)]
struct Trace(Rc<RefCell<Vec<Hit>>>);

impl Trace {
    fn payload(&self, label: &'static str) -> EventPayload {
        let trace = self.clone();
        EventPayload::new(move |engine: &mut SimulationEngine| trace.push(label, engine))
    }

    fn push(&self, label: &'static str, engine: &SimulationEngine) {
        self.0.borrow_mut().push(Hit {
            label,
            now: engine.now(),
            context: engine.context(),
        });
    }

    fn labels(&self) -> Vec<&'static str> {
        self.0.borrow().iter().map(|h| h.label).collect()
    }

    fn hits(&self) -> Vec<Hit> {
        self.0.borrow().clone()
    }
}

fn ns(n: i64) -> VirtualTime {
    VirtualTime::from_nanos(n)
}

// ============================================================================
// Concrete Scenarios
// ============================================================================

#[test]
fn test_earlier_event_runs_first() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        engine.schedule(ns(10), trace.payload("A")).unwrap();
        engine.schedule(ns(5), trace.payload("B")).unwrap();

        engine.run().unwrap();

        let hits = trace.hits();
        assert_eq!(trace.labels(), vec!["B", "A"], "{kind:?}");
        assert_eq!(hits[0].now, ns(5));
        assert_eq!(hits[1].now, ns(10));
    }
}

#[test]
fn test_same_time_runs_in_schedule_order() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        engine.schedule(ns(5), trace.payload("A")).unwrap();
        engine.schedule(ns(5), trace.payload("B")).unwrap();

        engine.run().unwrap();

        assert_eq!(trace.labels(), vec!["A", "B"], "{kind:?}");
        assert!(trace.hits().iter().all(|h| h.now == ns(5)));
    }
}

#[test]
fn test_cancelled_event_never_runs() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        let handle = engine.schedule(ns(10), trace.payload("A")).unwrap();

        handle.cancel(&mut engine);
        assert!(handle.is_expired(&engine));

        engine.run().unwrap();

        assert!(trace.labels().is_empty(), "{kind:?}");
        assert_eq!(engine.pending_count(), 0);
        assert!(handle.is_expired(&engine));
    }
}

#[test]
fn test_event_scheduled_from_event_runs_later() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);

        let t = trace.clone();
        engine
            .schedule(
                VirtualTime::ZERO,
                EventPayload::new(move |engine: &mut SimulationEngine| {
                    t.push("A:start", engine);
                    engine.schedule(ns(3), t.payload("B")).unwrap();
                    t.push("A:end", engine);
                }),
            )
            .unwrap();

        engine.run().unwrap();

        assert_eq!(trace.labels(), vec!["A:start", "A:end", "B"], "{kind:?}");
        assert_eq!(trace.hits()[2].now, ns(3));
    }
}

#[test]
fn test_negative_delay_leaves_queue_untouched() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);

        let err = engine.schedule(ns(-1), trace.payload("A")).unwrap_err();

        assert!(matches!(err, SimError::InvalidDelay { .. }), "{kind:?}");
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.next_event_time(), None);
        engine.run().unwrap();
        assert!(trace.labels().is_empty());
    }
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_clock_is_monotonic_under_mixed_delays() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        for delay in [40, 3, 17, 3, 0, 99, 17, 1, 64, 8] {
            engine.schedule(ns(delay), trace.payload("x")).unwrap();
        }

        engine.run().unwrap();

        let times: Vec<VirtualTime> = trace.hits().iter().map(|h| h.now).collect();
        assert_eq!(times.len(), 10);
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "{kind:?}: {times:?}");
    }
}

#[test]
fn test_cancel_twice_and_after_fire_are_noops() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        let fired = engine.schedule(ns(1), trace.payload("fired")).unwrap();
        let dropped = engine.schedule(ns(2), trace.payload("dropped")).unwrap();

        assert!(engine.cancel(&dropped));
        assert!(!engine.cancel(&dropped));

        engine.run().unwrap();

        assert!(!engine.cancel(&fired));
        assert!(!fired.cancel(&mut engine));
        assert_eq!(trace.labels(), vec!["fired"], "{kind:?}");
        assert_eq!(engine.stats().cancelled, 1);
        assert_eq!(engine.stats().executed, 1);
    }
}

#[test]
fn test_cancel_other_event_from_inside_event() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        let victim = engine.schedule(ns(5), trace.payload("victim")).unwrap();
        let same_instant = engine.schedule(ns(1), trace.payload("peer")).unwrap();

        let t = trace.clone();
        engine
            .schedule(
                ns(1),
                EventPayload::new(move |engine: &mut SimulationEngine| {
                    t.push("killer", engine);
                    assert!(engine.cancel(&victim));
                    // Already ran at this instant.
                    assert!(!engine.cancel(&same_instant));
                }),
            )
            .unwrap();

        engine.run().unwrap();
        assert_eq!(trace.labels(), vec!["peer", "killer"], "{kind:?}");
    }
}

#[test]
fn test_destroy_then_rerun_matches_first_run() {
    fn populate(engine: &mut SimulationEngine, trace: &Trace) {
        engine.schedule(ns(30), trace.payload("c")).unwrap();
        engine.schedule(ns(10), trace.payload("a")).unwrap();
        engine.schedule(ns(20), trace.payload("b")).unwrap();
        engine.schedule(ns(10), trace.payload("a2")).unwrap();
    }

    for kind in BACKENDS {
        let first = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        populate(&mut engine, &first);
        engine.run().unwrap();

        let leftover = Trace::default();
        engine.schedule(ns(5), leftover.payload("leftover")).unwrap();
        engine.stop_at(ns(1000));
        engine.destroy();
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.now(), VirtualTime::ZERO);
        assert_eq!(engine.stop_time(), None);

        let second = Trace::default();
        populate(&mut engine, &second);
        engine.run().unwrap();

        assert_eq!(first.hits(), second.hits(), "{kind:?}");
        assert!(leftover.labels().is_empty());
    }
}

#[test]
fn test_context_attribution() {
    const TRANSMITTER: ContextId = 1;
    const RECEIVER: ContextId = 2;

    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);

        let t = trace.clone();
        engine
            .schedule_with_context(
                TRANSMITTER,
                VirtualTime::ZERO,
                EventPayload::new(move |engine: &mut SimulationEngine| {
                    t.push("tx", engine);
                    engine
                        .schedule_with_context(RECEIVER, ns(7), t.payload("rx"))
                        .unwrap();
                    engine.schedule(ns(9), t.payload("tx-timer")).unwrap();
                }),
            )
            .unwrap();
        engine.schedule(ns(100), trace.payload("global")).unwrap();

        engine.run().unwrap();

        let contexts: Vec<(&str, ContextId)> =
            trace.hits().iter().map(|h| (h.label, h.context)).collect();
        assert_eq!(
            contexts,
            vec![
                ("tx", TRANSMITTER),
                ("rx", RECEIVER),
                ("tx-timer", TRANSMITTER),
                ("global", NO_CONTEXT),
            ],
            "{kind:?}"
        );
    }
}

#[test]
fn test_handle_copies_agree() {
    for kind in BACKENDS {
        let mut engine = SimulationEngine::with_scheduler(kind);
        let original = engine.schedule(ns(4), EventPayload::empty()).unwrap();
        let copies: Vec<EventHandle> = vec![original; 3];

        assert!(copies.iter().all(|h| h.is_running(&engine)));
        copies[1].cancel(&mut engine);
        assert!(copies.iter().all(|h| h.is_expired(&engine)));
        assert!(original.is_expired(&engine));
        assert_eq!(original.fire_time(), ns(4));
    }
}

// ============================================================================
// Stop Conditions and Failures
// ============================================================================

#[test]
fn test_stop_at_does_not_cancel_due_events() {
    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        for (delay, label) in [(5, "a"), (10, "b"), (10, "c"), (11, "d")] {
            engine.schedule(ns(delay), trace.payload(label)).unwrap();
        }
        engine.stop_at(ns(10));

        let summary = engine.run().unwrap();
        assert_eq!(summary.reason, StopReason::StopTime);
        assert_eq!(trace.labels(), vec!["a", "b", "c"], "{kind:?}");
        assert_eq!(engine.now(), ns(10));

        let summary = engine.run().unwrap();
        assert_eq!(summary.reason, StopReason::Exhausted);
        assert_eq!(trace.labels(), vec!["a", "b", "c", "d"]);
    }
}

#[test]
fn test_error_from_event_passes_through() {
    #[derive(Debug)]
    struct Corrupted(u32);

    impl std::fmt::Display for Corrupted {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "frame {} corrupted", self.0)
        }
    }

    impl std::error::Error for Corrupted {}

    for kind in BACKENDS {
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        engine.schedule(ns(1), trace.payload("before")).unwrap();
        engine
            .schedule(
                ns(2),
                EventPayload::new(|_: &mut SimulationEngine| -> EventResult {
                    Err(Box::new(Corrupted(17)))
                }),
            )
            .unwrap();
        engine.schedule(ns(3), trace.payload("after")).unwrap();

        let err = engine.run().unwrap_err();
        let inner = err.into_event_error().unwrap();
        let corrupted = inner.downcast_ref::<Corrupted>().unwrap();
        assert_eq!(corrupted.0, 17);

        assert_eq!(engine.now(), ns(2), "{kind:?}");
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.destroy(), 1);
        assert_eq!(trace.labels(), vec!["before"]);
    }
}

#[test]
fn test_long_self_rescheduling_chain_does_not_recurse() {
    fn step(engine: &mut SimulationEngine, left: u32) {
        if left > 0 {
            engine
                .schedule(ns(1), EventPayload::bind(step, left - 1))
                .unwrap();
        }
    }

    for kind in BACKENDS {
        let mut engine = SimulationEngine::with_scheduler(kind);
        engine.schedule_now(EventPayload::bind(step, 100_000)).unwrap();

        let summary = engine.run().unwrap();
        assert_eq!(summary.events_executed, 100_001, "{kind:?}");
        assert_eq!(engine.now(), ns(100_000));
    }
}

#[test]
fn test_independent_engines_in_one_process() {
    let trace_a = Trace::default();
    let trace_b = Trace::default();
    let mut a = SimulationEngine::new();
    let mut b = SimulationEngine::with_scheduler(SchedulerKind::Calendar);

    let handle_a = a.schedule(ns(1), trace_a.payload("a")).unwrap();
    b.schedule(ns(2), trace_b.payload("b")).unwrap();

    assert!(!b.cancel(&handle_a));
    a.run().unwrap();
    b.run().unwrap();

    assert_eq!(trace_a.labels(), vec!["a"]);
    assert_eq!(trace_b.labels(), vec!["b"]);
    assert_eq!(a.now(), ns(1));
    assert_eq!(b.now(), ns(2));
}

// ============================================================================
// Replicas
// ============================================================================

#[test]
fn test_replicas_are_deterministic_per_backend() {
    fn scenario(replica: usize) -> Vec<(&'static str, VirtualTime)> {
        let kind = BACKENDS[replica % BACKENDS.len()];
        let trace = Trace::default();
        let mut engine = SimulationEngine::with_scheduler(kind);
        engine.schedule(ns(30), trace.payload("late")).unwrap();
        engine.schedule(ns(10), trace.payload("early")).unwrap();
        let doomed = engine.schedule(ns(20), trace.payload("cancelled")).unwrap();
        engine.cancel(&doomed);
        engine.run().unwrap();
        trace.hits().into_iter().map(|h| (h.label, h.now)).collect()
    }

    let results = jikan::run_replicas(9, scenario);
    let expected = vec![("early", ns(10)), ("late", ns(30))];
    assert_eq!(results.len(), 9);
    assert!(results.iter().all(|r| *r == expected));
}
