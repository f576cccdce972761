//! Temperature to fan speed mapping

use std::fmt;
use std::io::{self, Write};
use std::ops::RangeInclusive;

/// Integer sweep printed by `--dump-curve`
pub const DUMP_RANGE: RangeInclusive<i32> = 10..=99;

/// Fraction of maximum fan speed, always within `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FanSpeed(f64);

impl FanSpeed {
    pub const MIN: FanSpeed = FanSpeed(0.0);
    pub const MAX: FanSpeed = FanSpeed(1.0);

    /// Clamp a raw fraction into range. NaN collapses to zero.
    pub fn new(fraction: f64) -> Self {
        if fraction.is_nan() {
            return Self::MIN;
        }
        Self(fraction.clamp(0.0, 1.0))
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    /// Whole percent for the actuator, rounded to nearest and capped at 100
    pub fn percent(self) -> u8 {
        let raw = (self.0 * 100.0).round();
        raw.clamp(0.0, 100.0) as u8
    }

    /// The larger of two speeds; used to apply the minimum floor
    pub fn max(self, other: FanSpeed) -> FanSpeed {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Piecewise fan curve
///
/// Below 40°C the fans may stop, between 40°C and 70°C the speed ramps
/// linearly from 0 to 0.5, and from 70°C up the fans run flat out.
pub fn fan_curve(temperature: f64) -> f64 {
    if temperature < 40.0 {
        0.0
    } else if temperature < 70.0 {
        (temperature - 40.0) / 30.0 * 0.5
    } else {
        1.0
    }
}

/// Speed actually sent to the fans: the curve value, never below `min_speed`
pub fn target_speed(temperature: f64, min_speed: FanSpeed) -> FanSpeed {
    min_speed.max(FanSpeed::new(fan_curve(temperature)))
}

/// Write one `temperature speed` line per degree of `range`
pub fn dump<W: Write>(out: &mut W, range: RangeInclusive<i32>) -> io::Result<()> {
    for t in range {
        writeln!(out, "{} {:?}", t, fan_curve(f64::from(t)))?;
    }
    Ok(())
}
