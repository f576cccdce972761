//! Dell PowerEdge fan controller
//!
//! Reads the CPU temperature, maps it through a fixed fan curve and drives the
//! chassis fans over IPMI, reporting liveness to systemd.

pub mod actuator;
pub mod args;
pub mod config;
pub mod curve;
pub mod daemon;
pub mod errors;
pub mod logging;
pub mod sensor;
pub mod supervisor;

// Re-export commonly used types
pub use config::{ConfigWarning, ControllerConfig};
pub use curve::{fan_curve, target_speed, FanSpeed};
pub use daemon::{cleanup, Cadence, CycleReport, FanDaemon, ManualFanControl};
pub use errors::{DellFanError, Result};
