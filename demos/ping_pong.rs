//! Ping-Pong over a Lossy Link
//!
//! Two nodes exchange frames over a point-to-point link with a fixed
//! propagation delay. The sender arms a retransmission timer per frame and
//! cancels it when the echo arrives.
//!
//! The example showcases:
//! - Delivering frames in the receiver's context (`schedule_with_context`)
//! - Timers as ordinary events, cancelled through their handle
//! - Per-node state shared between events
//! - Statistics export
//!
//! Run with: `cargo run --example ping_pong`

use std::cell::RefCell;
use std::rc::Rc;

use jikan::{
    ContextId, EngineConfigBuilder, EventHandle, EventPayload, SchedulerKind, SimulationEngine,
    VirtualTime,
};

// ============================================================================
// Configuration
// ============================================================================

const PINGER: ContextId = 0;
const PONGER: ContextId = 1;

const FRAMES: u32 = 10;
const LINK_DELAY: VirtualTime = VirtualTime::from_micros(5);
const RETRANSMIT_TIMEOUT: VirtualTime = VirtualTime::from_micros(25);
const SEND_INTERVAL: VirtualTime = VirtualTime::from_micros(40);
/// Every n-th frame is dropped on its first attempt.
const DROP_EVERY: u32 = 4;

// ============================================================================
// Node State
// ============================================================================

#[derive(Default)]
struct Pinger {
    next_frame: u32,
    timers: Vec<Option<EventHandle>>,
    attempts: Vec<u32>,
    rtts: Vec<VirtualTime>,
    sent_at: Vec<VirtualTime>,
    retransmissions: u32,
}

type Shared = Rc<RefCell<Pinger>>;

// ============================================================================
// Link
// ============================================================================

/// Puts `frame` on the wire towards `to`. Delivery runs in the receiver's
/// context even though the sender issues the call.
fn transmit(engine: &mut SimulationEngine, state: &Shared, to: ContextId, frame: u32) {
    let first_attempt = state.borrow().attempts[frame as usize] == 1;
    if to == PONGER && first_attempt && frame % DROP_EVERY == DROP_EVERY - 1 {
        tracing::info!(frame, now = %engine.now(), "frame lost on the link");
        return;
    }

    let state = state.clone();
    engine
        .schedule_with_context(
            to,
            LINK_DELAY,
            EventPayload::new(move |engine: &mut SimulationEngine| match engine.context() {
                PONGER => on_ping(engine, &state, frame),
                _ => on_pong(engine, &state, frame),
            }),
        )
        .expect("link delay is positive");
}

// ============================================================================
// Handlers
// ============================================================================

fn send_next(engine: &mut SimulationEngine, state: Shared) {
    let frame = {
        let mut pinger = state.borrow_mut();
        let frame = pinger.next_frame;
        pinger.next_frame += 1;
        pinger.attempts.push(0);
        pinger.timers.push(None);
        pinger.sent_at.push(VirtualTime::ZERO);
        frame
    };
    send_attempt(engine, &state, frame);

    if frame + 1 < FRAMES {
        engine
            .schedule(SEND_INTERVAL, EventPayload::bind(send_next, state))
            .expect("send interval is positive");
    }
}

fn send_attempt(engine: &mut SimulationEngine, state: &Shared, frame: u32) {
    {
        let mut pinger = state.borrow_mut();
        pinger.attempts[frame as usize] += 1;
        pinger.sent_at[frame as usize] = engine.now();
    }
    transmit(engine, state, PONGER, frame);

    let timer_state = state.clone();
    let timer = engine
        .schedule(
            RETRANSMIT_TIMEOUT,
            EventPayload::new(move |engine: &mut SimulationEngine| {
                tracing::warn!(frame, now = %engine.now(), "timeout, retransmitting");
                timer_state.borrow_mut().retransmissions += 1;
                send_attempt(engine, &timer_state, frame);
            }),
        )
        .expect("timeout is positive");
    state.borrow_mut().timers[frame as usize] = Some(timer);
}

fn on_ping(engine: &mut SimulationEngine, state: &Shared, frame: u32) {
    tracing::debug!(frame, now = %engine.now(), context = engine.context(), "ping received");
    transmit(engine, state, PINGER, frame);
}

fn on_pong(engine: &mut SimulationEngine, state: &Shared, frame: u32) {
    let timer = state.borrow_mut().timers[frame as usize].take();
    if let Some(timer) = timer {
        timer.cancel(engine);
    }
    let mut pinger = state.borrow_mut();
    let rtt = engine.now() - pinger.sent_at[frame as usize];
    pinger.rtts.push(rtt);
    tracing::debug!(frame, rtt = %rtt, "pong received");
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let config = EngineConfigBuilder::new()
        .scheduler(SchedulerKind::Calendar)
        .log_level("info")
        .collect_stats(true)
        .build()
        .expect("valid configuration");
    jikan::init_logging(&config.log_level);

    let mut engine = SimulationEngine::with_config(&config);
    let state = Shared::default();

    engine
        .schedule_with_context(PINGER, VirtualTime::ZERO, EventPayload::bind(send_next, state.clone()))
        .expect("zero delay is valid");

    let summary = engine.run().expect("simulation failed");

    let pinger = state.borrow();
    println!("=== Ping-Pong Results ===");
    println!("Frames sent:        {}", pinger.next_frame);
    println!("Echoes received:    {}", pinger.rtts.len());
    println!("Retransmissions:    {}", pinger.retransmissions);
    println!("Events executed:    {}", summary.events_executed);
    println!("Final time:         {}", summary.final_time);
    if let Some(max) = pinger.rtts.iter().max() {
        println!("Worst RTT:          {}", max);
    }

    if let Some(report) = engine.collected_stats() {
        println!();
        print!("{}", report.summary());
    }
}
