//! # Jikan Simulation Kernel
//!
//! A single-threaded discrete-event simulation kernel: a virtual clock, a
//! queue of pending events ordered by `(fire time, insertion sequence)`, and
//! a run loop that invokes them one at a time.
//!
//! ## Design Principles
//!
//! - **Deterministic**: events due at the same instant run in the order
//!   they were scheduled, so a fixed sequence of scheduling calls always
//!   yields the same trace.
//! - **Cooperative**: an event never blocks. Waiting is expressed by
//!   scheduling a new event for later and returning.
//! - **Explicit engine**: the engine is a plain value passed to every event,
//!   not a global, so independent simulations can share a process.
//! - **Pluggable ordering**: binary heap (default), ordered map and calendar
//!   queue backends satisfy the same contract.
//!
//! ## Features
//!
//! - `parallel` - run independent replicas on rayon (see [`batch`])
//!
//! ## Quick Start
//!
//! ```rust
//! use jikan::{EventPayload, SimulationEngine, VirtualTime};
//!
//! fn tick(engine: &mut SimulationEngine, remaining: u32) {
//!     if remaining > 0 {
//!         engine
//!             .schedule(VirtualTime::from_micros(1), EventPayload::bind(tick, remaining - 1))
//!             .unwrap();
//!     }
//! }
//!
//! let mut engine = SimulationEngine::new();
//! engine.schedule_now(EventPayload::bind(tick, 3)).unwrap();
//!
//! let summary = engine.run().unwrap();
//! assert_eq!(summary.events_executed, 4);
//! assert_eq!(engine.now(), VirtualTime::from_micros(3));
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use jikan::{EngineConfig, SimulationEngine};
//!
//! let config = EngineConfig::from_file("engine.yaml")?;
//! jikan::init_logging(&config.log_level);
//! let mut engine = SimulationEngine::with_config(&config);
//! ```

pub mod types;
pub mod time;
pub mod event;
pub mod scheduler;
pub mod engine;
pub mod error;
pub mod config;
pub mod stats;
pub mod batch;

// Re-export commonly used types
pub use types::{ContextId, EngineId, SequenceNumber, NO_CONTEXT};
pub use time::{TimeError, TimeUnit, VirtualTime};
pub use event::{EventError, EventHandle, EventPayload, EventResult, EventState, IntoEventResult, PendingEvent};
pub use scheduler::{
    CalendarConfig, CalendarScheduler, EventKey, HeapScheduler, MapScheduler, Scheduler,
    SchedulerBackend, SchedulerKind,
};
pub use engine::{RunSummary, SimulationEngine, StopReason};
pub use error::{SimError, SimResult};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use stats::{EngineStats, SimulationStats, StatsCollector, Timer};
pub use batch::{run_replicas, BatchRunner};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` overrides `level` when set. Call once at the start of a
/// program; later calls are ignored.
///
/// # Example
///
/// ```rust,ignore
/// jikan::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
