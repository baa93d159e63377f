//! Framework configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (runtime)
//! 3. Board config file named by `SCP_CONFIG_RS` (compile-time)
//! 4. Library defaults
//!
//! `SIGNAL_COUNT` and `THREAD_COUNT` size fixed tables and are compile-time
//! only.
//!
//! # Example
//!
//! ```rust,ignore
//! use scp_runtime::config::FrameworkConfig;
//!
//! let config = FrameworkConfig::from_env().event_count(32);
//! config.validate()?;
//! ```

pub mod defaults;

use scp_core::env::{env_get, env_get_bool};
use thiserror::Error;

/// Upper bound on per-context event records
pub const MAX_EVENT_COUNT: usize = 1 << 16;

/// Runtime framework configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    /// Event records in each execution context's pool
    pub event_count: usize,
    /// Entries in each context's ISR queue
    pub isr_queue_capacity: usize,
    /// Log every dispatched event at trace level
    pub trace_events: bool,
    /// Queue log lines until the dispatch loop goes idle
    pub log_buffered: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl FrameworkConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SCP_EVENT_COUNT` - Event records per context
    /// - `SCP_ISR_QUEUE_CAPACITY` - ISR queue entries per context
    /// - `SCP_TRACE_EVENTS` - Trace each dispatched event (0/1)
    /// - `SCP_LOG_BUFFERED` - Buffer log output (0/1)
    pub fn from_env() -> Self {
        let event_count = env_get("SCP_EVENT_COUNT", defaults::EVENT_COUNT);
        Self {
            event_count,
            isr_queue_capacity: env_get("SCP_ISR_QUEUE_CAPACITY", event_count),
            trace_events: env_get_bool("SCP_TRACE_EVENTS", defaults::TRACE_EVENTS),
            log_buffered: env_get_bool("SCP_LOG_BUFFERED", defaults::LOG_BUFFERED),
        }
    }

    /// Compile-time defaults only (no env override).
    pub fn new() -> Self {
        Self {
            event_count: defaults::EVENT_COUNT,
            isr_queue_capacity: defaults::EVENT_COUNT,
            trace_events: defaults::TRACE_EVENTS,
            log_buffered: defaults::LOG_BUFFERED,
        }
    }

    // Builder methods

    pub fn event_count(mut self, n: usize) -> Self {
        self.event_count = n;
        self
    }

    pub fn isr_queue_capacity(mut self, n: usize) -> Self {
        self.isr_queue_capacity = n;
        self
    }

    pub fn trace_events(mut self, enable: bool) -> Self {
        self.trace_events = enable;
        self
    }

    pub fn log_buffered(mut self, enable: bool) -> Self {
        self.log_buffered = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_count == 0 {
            return Err(ConfigError::InvalidValue("event_count must be > 0"));
        }
        if self.event_count > MAX_EVENT_COUNT {
            return Err(ConfigError::InvalidValue("event_count must be <= 65536"));
        }
        if self.isr_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("isr_queue_capacity must be > 0"));
        }
        if defaults::SIGNAL_COUNT == 0 {
            return Err(ConfigError::InvalidValue("SIGNAL_COUNT must be > 0"));
        }
        if defaults::THREAD_COUNT == 0 {
            return Err(ConfigError::InvalidValue("THREAD_COUNT must be > 0"));
        }
        Ok(())
    }

    pub fn print(&self) {
        eprintln!("SCP Framework Configuration:");
        eprintln!("  event_count:         {}", self.event_count);
        eprintln!("  isr_queue_capacity:  {}", self.isr_queue_capacity);
        eprintln!("  signal_count:        {}", defaults::SIGNAL_COUNT);
        eprintln!("  thread_count:        {}", defaults::THREAD_COUNT);
        eprintln!("  trace_events:        {}", self.trace_events);
        eprintln!("  log_buffered:        {}", self.log_buffered);
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = FrameworkConfig::new();
        assert_eq!(config.event_count, defaults::EVENT_COUNT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = FrameworkConfig::new()
            .event_count(8)
            .isr_queue_capacity(4)
            .trace_events(true);
        assert_eq!(config.event_count, 8);
        assert_eq!(config.isr_queue_capacity, 4);
        assert!(config.trace_events);
    }

    #[test]
    fn test_validation() {
        let err = FrameworkConfig::new().event_count(0).validate().unwrap_err();
        assert_eq!(format!("{}", err), "Invalid config: event_count must be > 0");
        assert!(FrameworkConfig::new()
            .event_count(MAX_EVENT_COUNT + 1)
            .validate()
            .is_err());
        assert!(FrameworkConfig::new().isr_queue_capacity(0).validate().is_err());
    }
}
