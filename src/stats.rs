//! Statistics collection and export for the simulation kernel.
//!
//! [`EngineStats`] holds the counters the engine maintains itself.
//! [`SimulationStats`] is the report built around them, with JSON/CSV export
//! and a human-readable summary. [`StatsCollector`] times a run by wall
//! clock and fills a report from [`SimulationEngine::export_stats`].
//!
//! [`SimulationEngine::export_stats`]: crate::SimulationEngine::export_stats

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::time::VirtualTime;

/// Counters kept by a [`SimulationEngine`](crate::SimulationEngine).
///
/// They accumulate over the engine's lifetime; `destroy` does not reset them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Events accepted by a scheduling call
    pub scheduled: u64,

    /// Events whose payload was invoked
    pub executed: u64,

    /// Events cancelled while Pending (including `remove`)
    pub cancelled: u64,

    /// Cancellations that also removed the key from the backend at once
    pub removed: u64,

    /// Pending events released by `destroy` without running
    pub destroyed: u64,

    /// Largest number of Pending events seen at once
    pub peak_pending: usize,
}

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Run metadata
    pub metadata: SimulationMetadata,

    /// Engine counters
    pub engine: EngineStats,

    /// Virtual clock when the report was taken
    pub final_time: VirtualTime,

    /// Events still Pending when the report was taken
    pub pending: usize,

    /// Wall-clock performance
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Run name/description
    pub name: String,

    /// Scheduler backend in use
    pub scheduler: String,

    /// Start time (wall clock, seconds since the epoch)
    pub start_time: Option<String>,

    /// End time (wall clock, seconds since the epoch)
    pub end_time: Option<String>,

    /// Crate version
    pub version: String,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulated seconds per wall-clock second
    pub sim_seconds_per_second: f64,

    /// Events executed per wall-clock second
    pub events_per_second: f64,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..SimulationMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Sets the run name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(epoch_now());
    }

    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(epoch_now());
    }

    /// Updates timing statistics from the wall-clock duration of the run.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_seconds_per_second = self.final_time.as_secs_f64() / seconds;
            self.timing.events_per_second = self.engine.executed as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports the counters to `metric,value` CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("metric,value\n");

        csv.push_str(&format!("final_time,{}\n", self.final_time));
        csv.push_str(&format!("pending,{}\n", self.pending));
        csv.push_str(&format!("scheduled,{}\n", self.engine.scheduled));
        csv.push_str(&format!("executed,{}\n", self.engine.executed));
        csv.push_str(&format!("cancelled,{}\n", self.engine.cancelled));
        csv.push_str(&format!("removed,{}\n", self.engine.removed));
        csv.push_str(&format!("destroyed,{}\n", self.engine.destroyed));
        csv.push_str(&format!("peak_pending,{}\n", self.engine.peak_pending));

        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!(
            "sim_seconds_per_second,{:.2}\n",
            self.timing.sim_seconds_per_second
        ));
        csv.push_str(&format!("events_per_second,{:.2}\n", self.timing.events_per_second));

        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if !self.metadata.scheduler.is_empty() {
            writeln!(w, "Scheduler: {}", self.metadata.scheduler)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Engine ---")?;
        writeln!(w, "Final simulation time: {}", self.final_time)?;
        writeln!(w, "Events scheduled: {}", self.engine.scheduled)?;
        writeln!(w, "Events executed: {}", self.engine.executed)?;
        writeln!(
            w,
            "Events cancelled: {} ({} removed eagerly)",
            self.engine.cancelled, self.engine.removed
        )?;
        writeln!(w, "Events destroyed: {}", self.engine.destroyed)?;
        writeln!(w, "Pending: {} (peak {})", self.pending, self.engine.peak_pending)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Sim seconds/sec: {:.6}", self.timing.sim_seconds_per_second)?;
        writeln!(w, "Events/sec: {:.2}", self.timing.events_per_second)?;

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

fn epoch_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Times runs and turns engine snapshots into a [`SimulationStats`] report.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            stats: SimulationStats::new(),
            timer: None,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    /// Starts timing.
    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.record_start();
    }

    /// Stops timing and computes rates from the last ingested snapshot.
    pub fn stop(&mut self) {
        self.stats.record_end();
        if let Some(timer) = self.timer.take() {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    /// Ingests the JSON produced by `SimulationEngine::export_stats`.
    /// Missing or malformed fields leave the current values in place.
    pub fn update_from_json(&mut self, json: &serde_json::Value) {
        let Some(engine) = json.get("engine") else {
            return;
        };

        if let Some(scheduler) = engine["scheduler"].as_str() {
            self.stats.metadata.scheduler = scheduler.to_string();
        }
        if let Some(now) = engine["now"].as_str().and_then(|s| s.parse().ok()) {
            self.stats.final_time = now;
        }
        if let Some(pending) = engine["pending"].as_u64() {
            self.stats.pending = pending as usize;
        }
        if let Ok(counters) = serde_json::from_value::<EngineStats>(engine["counters"].clone()) {
            self.stats.engine = counters;
        }
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Consumes the collector and returns the statistics.
    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}
