//! Property-based tests.
//!
//! - Every scheduler backend against a `BTreeMap` reference model
//! - Realized invocation order of the engine against sorted
//!   `(fire time, sequence)` order

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use jikan::{
    CalendarConfig, EventKey, EventPayload, SchedulerBackend, SchedulerKind, SimulationEngine,
    VirtualTime,
};
use proptest::prelude::*;

// ============================================================================
// Reference Model
// ============================================================================

#[derive(Default)]
struct Model {
    keys: BTreeMap<(VirtualTime, u64), u32>,
}

impl Model {
    fn insert(&mut self, key: EventKey) {
        self.keys.insert((key.time, key.seq), key.slot);
    }

    fn peek(&self) -> Option<EventKey> {
        self.keys
            .first_key_value()
            .map(|(&(time, seq), &slot)| EventKey { time, seq, slot })
    }

    fn pop(&mut self) -> Option<EventKey> {
        self.keys
            .pop_first()
            .map(|((time, seq), slot)| EventKey { time, seq, slot })
    }

    fn remove(&mut self, key: &EventKey) -> bool {
        self.keys.remove(&(key.time, key.seq)).is_some()
    }

    /// The `n`-th live key, wrapping.
    fn nth(&self, n: usize) -> Option<EventKey> {
        if self.keys.is_empty() {
            return None;
        }
        self.keys
            .iter()
            .nth(n % self.keys.len())
            .map(|(&(time, seq), &slot)| EventKey { time, seq, slot })
    }
}

#[derive(Clone, Debug)]
enum Op {
    /// Insert at `floor + delta` nanoseconds.
    Insert(u32),
    /// Insert at exactly `floor`.
    InsertNow,
    Pop,
    Peek,
    /// Remove the n-th live key.
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u32..5_000).prop_map(Op::Insert),
        1 => Just(Op::InsertNow),
        3 => Just(Op::Pop),
        1 => Just(Op::Peek),
        1 => any::<usize>().prop_map(Op::Remove),
    ]
}

fn calendar_strategy() -> impl Strategy<Value = CalendarConfig> {
    (0u32..6, 1i64..2_000).prop_map(|(shift, width)| CalendarConfig {
        initial_buckets: 2usize << shift,
        initial_width: VirtualTime::from_nanos(width),
    })
}

fn check_backend(kind: SchedulerKind, calendar: &CalendarConfig, ops: &[Op]) {
    let mut backend = kind.build(calendar);
    let mut model = Model::default();
    // Keys never go below the last popped time, as in the engine.
    let mut floor = VirtualTime::ZERO;
    let mut seq = 0u64;

    for op in ops {
        match *op {
            Op::Insert(_) | Op::InsertNow => {
                let delta = match *op {
                    Op::Insert(d) => VirtualTime::from_nanos(d as i64),
                    _ => VirtualTime::ZERO,
                };
                let key = EventKey {
                    time: floor + delta,
                    seq,
                    slot: seq as u32,
                };
                seq += 1;
                backend.insert(key);
                model.insert(key);
            }
            Op::Pop => {
                let got = backend.pop();
                assert_eq!(got, model.pop(), "{} pop", backend.name());
                if let Some(key) = got {
                    floor = key.time;
                }
            }
            Op::Peek => {
                assert_eq!(backend.peek(), model.peek(), "{} peek", backend.name());
            }
            Op::Remove(n) => {
                if let Some(key) = model.nth(n) {
                    assert!(backend.remove(&key), "{} remove", backend.name());
                    assert!(model.remove(&key));
                    assert!(!backend.remove(&key));
                }
            }
        }
        assert_eq!(backend.len(), model.keys.len(), "{} len", backend.name());
    }

    // Drain what is left.
    loop {
        let got = backend.pop();
        assert_eq!(got, model.pop(), "{} drain", backend.name());
        if got.is_none() {
            break;
        }
    }
    assert!(backend.is_empty());
}

proptest! {
    #[test]
    fn heap_matches_model(ops in proptest::collection::vec(op_strategy(), 0..400)) {
        check_backend(SchedulerKind::Heap, &CalendarConfig::default(), &ops);
    }

    #[test]
    fn map_matches_model(ops in proptest::collection::vec(op_strategy(), 0..400)) {
        check_backend(SchedulerKind::Map, &CalendarConfig::default(), &ops);
    }

    #[test]
    fn calendar_matches_model(
        calendar in calendar_strategy(),
        ops in proptest::collection::vec(op_strategy(), 0..400)
    ) {
        check_backend(SchedulerKind::Calendar, &calendar, &ops);
    }
}

// ============================================================================
// Engine Ordering
// ============================================================================

fn backend_strategy() -> impl Strategy<Value = SchedulerKind> {
    prop_oneof![
        Just(SchedulerKind::Heap),
        Just(SchedulerKind::Map),
        Just(SchedulerKind::Calendar),
    ]
}

proptest! {
    #[test]
    fn engine_runs_in_sorted_order(
        kind in backend_strategy(),
        plan in proptest::collection::vec((0i64..50, any::<bool>()), 0..200)
    ) {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut engine = SimulationEngine::with_scheduler(kind);

        let mut handles = Vec::new();
        for (index, &(delay, _)) in plan.iter().enumerate() {
            let sink = order.clone();
            let handle = engine
                .schedule(
                    VirtualTime::from_nanos(delay),
                    EventPayload::new(move |engine: &mut SimulationEngine| {
                        sink.borrow_mut().push((engine.now(), index))
                    }),
                )
                .unwrap();
            handles.push(handle);
        }
        for (handle, &(_, cancel)) in handles.iter().zip(&plan) {
            if cancel {
                prop_assert!(engine.cancel(handle));
                prop_assert!(handle.is_expired(&engine));
            }
        }

        engine.run().unwrap();

        let mut expected: Vec<(VirtualTime, usize)> = plan
            .iter()
            .enumerate()
            .filter(|(_, step)| !step.1)
            .map(|(index, &(delay, _))| (VirtualTime::from_nanos(delay), index))
            .collect();
        expected.sort();

        prop_assert_eq!(&*order.borrow(), &expected);
        prop_assert!(handles.iter().all(|h| h.is_expired(&engine)));
        prop_assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn nested_scheduling_keeps_clock_monotonic(
        kind in backend_strategy(),
        delays in proptest::collection::vec(0i64..20, 1..60)
    ) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut engine = SimulationEngine::with_scheduler(kind);

        // Each event schedules the next delay from the list.
        fn hop(engine: &mut SimulationEngine, (delays, at, seen): (Rc<Vec<i64>>, usize, Rc<RefCell<Vec<VirtualTime>>>)) {
            seen.borrow_mut().push(engine.now());
            if let Some(&delay) = delays.get(at) {
                engine
                    .schedule(VirtualTime::from_nanos(delay), EventPayload::bind(hop, (delays.clone(), at + 1, seen)))
                    .unwrap();
            }
        }

        let delays = Rc::new(delays);
        engine
            .schedule_now(EventPayload::bind(hop, (delays.clone(), 0, seen.clone())))
            .unwrap();
        // Unrelated events interleaved with the chain.
        for &delay in delays.iter() {
            let sink = seen.clone();
            engine
                .schedule(
                    VirtualTime::from_nanos(delay * 3),
                    EventPayload::new(move |engine: &mut SimulationEngine| sink.borrow_mut().push(engine.now())),
                )
                .unwrap();
        }

        engine.run().unwrap();

        let times = seen.borrow();
        prop_assert_eq!(times.len(), 2 * delays.len() + 1);
        prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        let total: i64 = delays.iter().sum();
        let last = delays.iter().map(|d| d * 3).max().unwrap_or(0).max(total);
        prop_assert_eq!(engine.now(), VirtualTime::from_nanos(last));
    }
}
