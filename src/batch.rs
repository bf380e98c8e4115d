//! Independent replica runs.
//!
//! A [`SimulationEngine`](crate::SimulationEngine) is single-threaded by
//! design, and its payloads need not be `Send`. Parallelism therefore lives
//! one level up: each replica builds, runs and summarizes its own engine,
//! and replicas run side by side on rayon's pool.
//!
//! # Feature Flag
//!
//! Parallel execution requires the `parallel` feature:
//! ```toml
//! [dependencies]
//! jikan = { version = "0.1", features = ["parallel"] }
//! ```
//! Without it replicas run one after another. Results come back in replica
//! order either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use tracing::debug;

/// Runs a scenario once per replica index.
#[derive(Clone, Debug, Default)]
pub struct BatchRunner {
    /// Worker threads (0 = rayon's default)
    num_threads: usize,
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads. Ignored without the `parallel`
    /// feature.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Whether replicas actually run in parallel.
    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "parallel")
    }

    /// Calls `scenario(i)` for every `i` in `0..count` and returns the
    /// results indexed by `i`.
    #[cfg(not(feature = "parallel"))]
    pub fn run<T, F>(&self, count: usize, scenario: F) -> Vec<T>
    where
        F: Fn(usize) -> T + Sync + Send,
        T: Send,
    {
        debug!(count, "running replicas sequentially");
        (0..count).map(scenario).collect()
    }

    /// Calls `scenario(i)` for every `i` in `0..count` and returns the
    /// results indexed by `i`.
    #[cfg(feature = "parallel")]
    pub fn run<T, F>(&self, count: usize, scenario: F) -> Vec<T>
    where
        F: Fn(usize) -> T + Sync + Send,
        T: Send,
    {
        debug!(count, threads = self.num_threads, "running replicas in parallel");
        if self.num_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build()
            {
                Ok(pool) => {
                    return pool.install(|| (0..count).into_par_iter().map(&scenario).collect())
                }
                Err(err) => {
                    tracing::warn!(error = %err, "thread pool unavailable, using the global pool")
                }
            }
        }
        (0..count).into_par_iter().map(&scenario).collect()
    }
}

/// Runs `count` replicas with the default [`BatchRunner`].
///
/// ```
/// use jikan::{batch, EventPayload, SimulationEngine, VirtualTime};
///
/// let final_times = batch::run_replicas(4, |replica| {
///     let mut engine = SimulationEngine::new();
///     let delay = VirtualTime::from_nanos(10 * (replica as i64 + 1));
///     engine.schedule(delay, EventPayload::empty()).unwrap();
///     engine.run().unwrap().final_time
/// });
/// assert_eq!(final_times[3], VirtualTime::from_nanos(40));
/// ```
pub fn run_replicas<T, F>(count: usize, scenario: F) -> Vec<T>
where
    F: Fn(usize) -> T + Sync + Send,
    T: Send,
{
    BatchRunner::new().run(count, scenario)
}
