//! Engine configuration.
//!
//! An [`EngineConfig`] selects the scheduler backend and its tuning, an
//! optional stop time, the log level handed to [`init_logging`] and whether
//! runs are timed. It loads from YAML or JSON and is validated on load.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! scheduler: calendar
//! stop_time: 10ms
//! log_level: debug
//! collect_stats: true
//! calendar:
//!   initial_buckets: 16
//!   initial_width: 500ns
//! ```
//!
//! [`init_logging`]: crate::init_logging

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::scheduler::{CalendarConfig, SchedulerKind};
use crate::time::VirtualTime;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for one [`SimulationEngine`](crate::SimulationEngine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ordering backend
    pub scheduler: SchedulerKind,

    /// Absolute virtual time past which `run` stops
    pub stop_time: Option<VirtualTime>,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether runs are timed into a [`SimulationStats`](crate::SimulationStats) report
    pub collect_stats: bool,

    /// Calendar-queue tuning, used when `scheduler` is `calendar`
    pub calendar: CalendarConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            stop_time: None,
            log_level: "info".to_string(),
            collect_stats: false,
            calendar: CalendarConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let result = self.check();
        if let Err(ConfigError::Validation(ref reason)) = result {
            tracing::warn!(%reason, "rejected engine configuration");
        }
        result
    }

    fn check(&self) -> ConfigResult<()> {
        let buckets = self.calendar.initial_buckets;
        if buckets < 2 || !buckets.is_power_of_two() {
            return Err(ConfigError::Validation(format!(
                "calendar.initial_buckets must be a power of two >= 2, got {}",
                buckets
            )));
        }

        if !self.calendar.initial_width.is_strictly_positive() {
            return Err(ConfigError::Validation(format!(
                "calendar.initial_width must be positive, got {}",
                self.calendar.initial_width
            )));
        }

        if let Some(stop) = self.stop_time {
            if stop.is_strictly_negative() {
                return Err(ConfigError::Validation(format!(
                    "stop_time must not be negative, got {}",
                    stop
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level: {}",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating an [`EngineConfig`] programmatically.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the scheduler backend.
    pub fn scheduler(mut self, kind: SchedulerKind) -> Self {
        self.config.scheduler = kind;
        self
    }

    /// Sets the absolute stop time.
    pub fn stop_time(mut self, time: VirtualTime) -> Self {
        self.config.stop_time = Some(time);
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Enables wall-clock statistics for each run.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.collect_stats = enable;
        self
    }

    /// Starting bucket count of the calendar queue.
    pub fn calendar_buckets(mut self, buckets: usize) -> Self {
        self.config.calendar.initial_buckets = buckets;
        self
    }

    /// Starting bucket width of the calendar queue.
    pub fn calendar_width(mut self, width: VirtualTime) -> Self {
        self.config.calendar.initial_width = width;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
