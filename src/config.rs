//! Supervisor configuration with sensible defaults.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::util::duration_serde;

/// Default period between monitor sweeps.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Default age past `end_time` before a terminal child is force-cleaned.
pub const DEFAULT_ZOMBIE_MAX_AGE: Duration = Duration::from_secs(300);

/// Default per-cleanup timeout for child-cancellation fan-out.
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default seconds a BLOCKED task may sit before being flagged starving.
pub const DEFAULT_STARVATION_THRESHOLD: Duration = Duration::from_secs(60);

/// Supervisor-wide configuration.
///
/// # Examples
/// ```rust
/// use asyn_rt::config::{SupervisorConfig, DEFAULT_MONITOR_INTERVAL};
/// use std::time::Duration;
///
/// let config = SupervisorConfig::default();
/// assert_eq!(config.monitor_interval, DEFAULT_MONITOR_INTERVAL);
///
/// let config = SupervisorConfig::builder()
///     .with_monitor_interval(Duration::from_secs(5))
///     .with_debug_mode(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.monitor_interval, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Period between monitor sweeps.
    #[serde(with = "duration_serde")]
    pub monitor_interval: Duration,

    /// Age past `end_time` before a child is force-cleaned.
    #[serde(with = "duration_serde")]
    pub zombie_max_age: Duration,

    /// Per-cleanup default for child-cancellation fan-out.
    #[serde(with = "duration_serde")]
    pub cancel_timeout: Duration,

    /// Seconds a BLOCKED task may sit before being flagged starving.
    #[serde(with = "duration_serde")]
    pub starvation_threshold: Duration,

    /// Enables debug-level traces on the runtime.
    pub debug_mode: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            zombie_max_age: DEFAULT_ZOMBIE_MAX_AGE,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
            starvation_threshold: DEFAULT_STARVATION_THRESHOLD,
            debug_mode: false,
        }
    }
}

impl SupervisorConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Validates configuration values, rejecting zero-length durations that
    /// would spin the monitor loop or starve the cancellation fan-out.
    pub fn validate(&self) -> Result<(), String> {
        if self.monitor_interval.is_zero() {
            return Err("monitor_interval must be > 0".to_string());
        }
        if self.cancel_timeout.is_zero() {
            return Err("cancel_timeout must be > 0".to_string());
        }
        if self.starvation_threshold.is_zero() {
            return Err("starvation_threshold must be > 0".to_string());
        }
        Ok(())
    }
}

/// Builder for [`SupervisorConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.config.monitor_interval = interval;
        self
    }

    pub fn with_zombie_max_age(mut self, age: Duration) -> Self {
        self.config.zombie_max_age = age;
        self
    }

    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.config.cancel_timeout = timeout;
        self
    }

    pub fn with_starvation_threshold(mut self, threshold: Duration) -> Self {
        self.config.starvation_threshold = threshold;
        self
    }

    pub fn with_debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<SupervisorConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.monitor_interval, Duration::from_secs(60));
        assert_eq!(config.zombie_max_age, Duration::from_secs(300));
        assert_eq!(config.cancel_timeout, Duration::from_secs(1));
        assert_eq!(config.starvation_threshold, Duration::from_secs(60));
        assert!(!config.debug_mode);
    }

    #[test]
    fn test_validation_rejects_zero_monitor_interval() {
        let invalid = SupervisorConfig {
            monitor_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = invalid.validate().unwrap_err();
        assert!(err.contains("monitor_interval"));
    }

    #[test]
    fn test_builder_multiple_options() {
        let config = SupervisorConfig::builder()
            .with_monitor_interval(Duration::from_secs(5))
            .with_zombie_max_age(Duration::from_secs(30))
            .with_cancel_timeout(Duration::from_millis(500))
            .with_starvation_threshold(Duration::from_secs(10))
            .with_debug_mode(true)
            .build()
            .unwrap();

        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.zombie_max_age, Duration::from_secs(30));
        assert_eq!(config.cancel_timeout, Duration::from_millis(500));
        assert_eq!(config.starvation_threshold, Duration::from_secs(10));
        assert!(config.debug_mode);
    }

    #[test]
    fn test_builder_validation_failure() {
        let result = SupervisorConfig::builder()
            .with_cancel_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SupervisorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SupervisorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.monitor_interval, deserialized.monitor_interval);
        assert_eq!(config.debug_mode, deserialized.debug_mode);
    }
}
