//! Configuration types for the task model.
//!
//! This module contains the configuration of the task scheduler, its task
//! store and the logging setup. All settings are fixed once a
//! [`TaskScheduler`](crate::core::TaskScheduler) is constructed.

use crate::core::registry::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder replaced by the task id in the monitor URL template.
pub const TASK_ID_PLACEHOLDER: &str = "{taskId}";

/// Default monitor URL template.
pub const DEFAULT_MONITOR_URL: &str = "/tasks/{taskId}";

/// Default number of tasks a store may hold.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default number of sweep generations a task survives.
pub const DEFAULT_TASK_LIFETIME: u32 = 2;

/// Remaining-time ceiling used when none is configured (5 minutes).
pub const DEFAULT_MAX_REMAINING_TIME_MS: u64 = 300_000;

/// Main configuration for the task scheduler.
///
/// # Examples
///
/// ```rust
/// use taskmodel::config::{SchedulerConfig, StoreConfig};
///
/// // Use default configuration
/// let config = SchedulerConfig::default();
///
/// // Custom configuration
/// let config = SchedulerConfig {
///     max_remaining_time_ms: Some(60_000),
///     sweep_interval_ms: Some(30_000),
///     store: StoreConfig::with_capacity(100),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Relative URL of the monitor endpoint, must contain `{taskId}`
    pub monitor_url: String,

    /// Method the monitor endpoint answers on
    pub monitor_method: Method,

    /// Number of sweep generations a task survives
    pub task_lifetime: u32,

    /// Interval of the periodic sweep (in milliseconds), no sweep when `None`
    pub sweep_interval_ms: Option<u64>,

    /// Maximum accepted remaining-time estimate (in milliseconds)
    pub max_remaining_time_ms: Option<u64>,

    /// Header carrying the retry hint of executing tasks
    pub remaining_time_header: String,

    /// Task store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            monitor_url: DEFAULT_MONITOR_URL.to_string(),
            monitor_method: Method::Delete,
            task_lifetime: DEFAULT_TASK_LIFETIME,
            sweep_interval_ms: None,
            max_remaining_time_ms: None,
            remaining_time_header: "Retry-After".to_string(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Set the monitor URL template.
    pub fn with_monitor_url(mut self, monitor_url: impl Into<String>) -> Self {
        self.monitor_url = monitor_url.into();
        self
    }

    /// Set the method of the monitor endpoint.
    pub fn with_monitor_method(mut self, method: Method) -> Self {
        self.monitor_method = method;
        self
    }

    /// Set the task lifetime in sweep generations.
    pub fn with_task_lifetime(mut self, generations: u32) -> Self {
        self.task_lifetime = generations;
        self
    }

    /// Enable the periodic sweep.
    pub fn with_sweep_interval(mut self, interval_ms: u64) -> Self {
        self.sweep_interval_ms = Some(interval_ms);
        self
    }

    /// Set the maximum accepted remaining-time estimate.
    pub fn with_max_remaining_time(mut self, max_ms: u64) -> Self {
        self.max_remaining_time_ms = Some(max_ms);
        self
    }

    /// Set the store capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.store.capacity = Some(capacity);
        self
    }

    /// Set the sweep policy.
    pub fn with_sweep_policy(mut self, policy: SweepPolicy) -> Self {
        self.store.sweep_policy = policy;
        self
    }

    /// Effective remaining-time ceiling.
    pub fn effective_max_remaining_time(&self) -> u64 {
        self.max_remaining_time_ms
            .unwrap_or(DEFAULT_MAX_REMAINING_TIME_MS)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(DurationExt::millis)
    }

    /// Monitor URL of a specific task.
    pub fn monitor_url_for(&self, task_id: &str) -> String {
        self.monitor_url.replace(TASK_ID_PLACEHOLDER, task_id)
    }
}

/// Task store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of admitted tasks, `DEFAULT_CAPACITY` when `None`
    pub capacity: Option<usize>,

    /// Which tasks a sweep may purge
    pub sweep_policy: SweepPolicy,
}

impl StoreConfig {
    /// Create a store configuration with a fixed capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Default::default()
        }
    }

    /// Effective capacity.
    pub fn effective_capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_CAPACITY)
    }
}

/// Predicate deciding which spent tasks a sweep removes.
///
/// Every sweep decrements the lifetime of every task; the policy only
/// decides what happens to tasks whose lifetime is used up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepPolicy {
    /// Purge any spent task, even one whose handler is still running
    #[default]
    Unconditional,
    /// Purge only completed tasks nobody collected
    CompletedOnly,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Enable colored output (ignored if json_format is true)
    pub colored: bool,

    /// Include timestamps in logs
    pub include_timestamps: bool,

    /// Include target module in logs
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            colored: true,
            include_timestamps: true,
            include_targets: false,
        }
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Helper trait for converting durations in configuration.
pub trait DurationExt {
    /// Convert milliseconds to Duration
    fn millis(self) -> Duration;
}

impl DurationExt for u64 {
    fn millis(self) -> Duration {
        Duration::from_millis(self)
    }
}

impl SchedulerConfig {
    /// Create a new configuration optimized for development.
    pub fn development() -> Self {
        Self {
            sweep_interval_ms: Some(10_000),
            max_remaining_time_ms: Some(60_000),
            store: StoreConfig::with_capacity(100),
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: true,
                include_targets: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a new configuration optimized for production.
    pub fn production() -> Self {
        Self {
            task_lifetime: 3,
            sweep_interval_ms: Some(60_000),
            max_remaining_time_ms: Some(DEFAULT_MAX_REMAINING_TIME_MS),
            store: StoreConfig::with_capacity(10_000),
            logging: LoggingConfig {
                level: LogLevel::Info,
                json_format: true,
                colored: false,
                include_timestamps: true,
                include_targets: false,
            },
            ..Default::default()
        }
    }

    /// Create a configuration for testing.
    pub fn testing() -> Self {
        Self {
            task_lifetime: 1,
            sweep_interval_ms: None,
            max_remaining_time_ms: Some(10_000),
            store: StoreConfig::with_capacity(10),
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: false,
                include_timestamps: false,
                include_targets: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.monitor_url.contains(TASK_ID_PLACEHOLDER) {
            errors.push(format!(
                "Monitor URL must contain the {} placeholder",
                TASK_ID_PLACEHOLDER
            ));
        }

        if self.task_lifetime == 0 {
            errors.push("Task lifetime must be greater than 0".to_string());
        }

        if self.sweep_interval_ms == Some(0) {
            errors.push("Sweep interval must be greater than 0".to_string());
        }

        if self.store.capacity == Some(0) {
            errors.push("Store capacity must be greater than 0".to_string());
        }

        if self.remaining_time_header.trim().is_empty() {
            errors.push("Remaining time header must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
