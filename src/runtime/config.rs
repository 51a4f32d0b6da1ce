//! Runtime tuning knobs.
//!
//! ```
//! use rampart::RuntimeConfig;
//!
//! // Tighter prediction window for fast-paced games
//! let config = RuntimeConfig {
//!     max_pending_actions: 16,
//!     ..RuntimeConfig::competitive()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::error::RampartError;

/// Default cap on predicted actions waiting for the host.
pub const DEFAULT_MAX_PENDING_ACTIONS: usize = 64;
/// Default capacity of the runtime event queue.
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 128;
/// Default tolerance when comparing predicted numbers with authoritative ones.
pub const DEFAULT_DESYNC_TOLERANCE: f64 = 1e-9;

/// Runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "RuntimeConfig has no effect unless passed to RuntimeBuilder::with_config()"]
pub struct RuntimeConfig {
    /// Predicted actions a client may have unacknowledged at once. Further submissions fail with
    /// [`PredictionThreshold`](RampartError::PredictionThreshold) until the host catches up.
    ///
    /// Default: 64
    pub max_pending_actions: usize,

    /// Capacity of the event queue drained by [`GameRuntime::events`](crate::GameRuntime::events).
    /// When full, the oldest event is dropped.
    ///
    /// Default: 128
    pub event_queue_size: usize,

    /// Largest absolute difference between a predicted and an authoritative number that still
    /// counts as equal. Non-numeric values must match exactly.
    ///
    /// Default: 1e-9
    pub desync_tolerance: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_pending_actions: DEFAULT_MAX_PENDING_ACTIONS,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            desync_tolerance: DEFAULT_DESYNC_TOLERANCE,
        }
    }
}

impl RuntimeConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Short prediction window and exact comparison. Suited to games where a stale prediction
    /// is worse than a brief input stall.
    pub fn competitive() -> Self {
        Self {
            max_pending_actions: 32,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            desync_tolerance: 0.0,
        }
    }

    /// Long prediction window and a loose tolerance, for slow links and casual games whose apply
    /// functions do floating-point work that may round differently between peers.
    pub fn relaxed() -> Self {
        Self {
            max_pending_actions: 256,
            event_queue_size: 512,
            desync_tolerance: 1e-3,
        }
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if a queue size is zero or the tolerance is negative or NaN.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn validate(&self) -> Result<(), RampartError> {
        if self.max_pending_actions == 0 {
            return Err(RampartError::InvalidRequest {
                info: "max_pending_actions must be at least 1".to_owned(),
            });
        }
        if self.event_queue_size == 0 {
            return Err(RampartError::InvalidRequest {
                info: "event_queue_size must be at least 1".to_owned(),
            });
        }
        if self.desync_tolerance.is_nan() || self.desync_tolerance < 0.0 {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "desync_tolerance must be a non-negative number, got {}",
                    self.desync_tolerance
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for config in [
            RuntimeConfig::default(),
            RuntimeConfig::competitive(),
            RuntimeConfig::relaxed(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
    }

    #[test]
    fn presets_differ_where_documented() {
        let default = RuntimeConfig::new().max_pending_actions;
        assert!(RuntimeConfig::competitive().max_pending_actions < default);
        assert!(RuntimeConfig::relaxed().max_pending_actions > default);
        assert_eq!(RuntimeConfig::competitive().desync_tolerance, 0.0);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = RuntimeConfig {
            max_pending_actions: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(config.validate(), Err(RampartError::InvalidRequest { .. })));
        let config = RuntimeConfig {
            event_queue_size: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_tolerances_are_rejected() {
        for tolerance in [-1.0, f64::NAN] {
            let config = RuntimeConfig {
                desync_tolerance: tolerance,
                ..RuntimeConfig::default()
            };
            assert!(config.validate().is_err());
        }
        let infinite = RuntimeConfig {
            desync_tolerance: f64::INFINITY,
            ..RuntimeConfig::default()
        };
        assert!(infinite.validate().is_ok());
    }
}
