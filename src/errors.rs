//! Error types for the fan controller

use thiserror::Error;

/// Result type alias for the fan controller
pub type Result<T> = std::result::Result<T, DellFanError>;

/// Main error type for the fan controller
///
/// Sensor and actuator failures are fatal to the control loop. Supervisor
/// notification failures are only ever logged.
#[derive(Error, Debug)]
pub enum DellFanError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error("Supervisor notification failed: {0}")]
    SupervisorNotify(#[from] std::io::Error),

    #[error("{cause}; automatic fan control was not restored: {release}")]
    ReleaseFailed {
        cause: Box<DellFanError>,
        release: Box<DellFanError>,
    },
}

impl DellFanError {
    /// True for failures that must stop the control loop
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DellFanError::SupervisorNotify(_))
    }
}
