//! Per-run controller configuration

use crate::curve::FanSpeed;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POLL_RATE_SECS: f64 = 10.0;
pub const MAX_POLL_RATE_SECS: f64 = 60.0;
pub const DEFAULT_MIN_SPEED: f64 = 0.18;

/// A requested value was out of range and has been corrected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    #[error("Provided poll rate {requested}s is longer than 60s, setting poll rate to 60s")]
    PollRateTooLong { requested: f64 },

    #[error("Poll rate must be positive (got {requested}). Defaulting to 10s")]
    PollRateNotPositive { requested: f64 },

    #[error("Minimum speed {requested} is outside 0.0..=1.0, using {applied}")]
    MinSpeedOutOfRange { requested: f64, applied: f64 },
}

/// Immutable settings consumed by the control loop
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    poll_interval: Duration,
    min_speed: FanSpeed,
}

impl ControllerConfig {
    /// Build a config from raw user input, correcting anything out of range
    pub fn new(poll_rate_secs: f64, min_speed: f64) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();

        let poll_rate = if poll_rate_secs.is_nan() || poll_rate_secs <= 0.0 {
            warnings.push(ConfigWarning::PollRateNotPositive {
                requested: poll_rate_secs,
            });
            DEFAULT_POLL_RATE_SECS
        } else if poll_rate_secs > MAX_POLL_RATE_SECS {
            warnings.push(ConfigWarning::PollRateTooLong {
                requested: poll_rate_secs,
            });
            MAX_POLL_RATE_SECS
        } else {
            poll_rate_secs
        };

        let applied = if min_speed.is_nan() {
            DEFAULT_MIN_SPEED
        } else {
            min_speed.clamp(0.0, 1.0)
        };
        if applied != min_speed {
            warnings.push(ConfigWarning::MinSpeedOutOfRange {
                requested: min_speed,
                applied,
            });
        }

        let config = Self {
            poll_interval: Duration::from_secs_f64(poll_rate),
            min_speed: FanSpeed::new(applied),
        };
        (config, warnings)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn min_speed(&self) -> FanSpeed {
        self.min_speed
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_RATE_SECS),
            min_speed: FanSpeed::new(DEFAULT_MIN_SPEED),
        }
    }
}
