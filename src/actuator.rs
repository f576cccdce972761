//! Fan actuation through the baseboard management controller

use crate::errors::{DellFanError, Result};
use log::debug;
use std::ffi::OsString;
use std::process::Command;

pub const DEFAULT_IPMITOOL: &str = "ipmitool";

/// Commands understood by the management controller
pub trait Actuator {
    /// Take fan control away from the BMC
    fn disable_automatic_control(&self) -> Result<()>;

    /// Hand fan control back to the BMC
    fn enable_automatic_control(&self) -> Result<()>;

    /// Drive all fans at `percent` (0-100) of full speed
    fn set_fan_speed_percent(&self, percent: u8) -> Result<()>;
}

impl<A: Actuator + ?Sized> Actuator for &A {
    fn disable_automatic_control(&self) -> Result<()> {
        (**self).disable_automatic_control()
    }

    fn enable_automatic_control(&self) -> Result<()> {
        (**self).enable_automatic_control()
    }

    fn set_fan_speed_percent(&self, percent: u8) -> Result<()> {
        (**self).set_fan_speed_percent(percent)
    }
}

// Dell PowerEdge OEM fan commands (netfn 0x30, cmd 0x30)
const DELL_FAN_PREFIX: [u8; 2] = [0x30, 0x30];
const MANUAL_MODE: u8 = 0x01;
const MANUAL_OFF: u8 = 0x00;
const MANUAL_ON: u8 = 0x01;
const SET_SPEED: u8 = 0x02;
const ALL_FANS: u8 = 0xff;

/// Sends raw Dell OEM commands with `ipmitool raw`
pub struct IpmiActuator {
    program: OsString,
    /// Arguments placed before `raw`, e.g. `-I lanplus -H <bmc>` for a remote BMC
    base_args: Vec<OsString>,
}

impl IpmiActuator {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Raw request bytes for each command
    fn disable_bytes() -> Vec<u8> {
        [&DELL_FAN_PREFIX[..], &[MANUAL_MODE, MANUAL_OFF]].concat()
    }

    fn enable_bytes() -> Vec<u8> {
        [&DELL_FAN_PREFIX[..], &[MANUAL_MODE, MANUAL_ON]].concat()
    }

    fn speed_bytes(percent: u8) -> Vec<u8> {
        [&DELL_FAN_PREFIX[..], &[SET_SPEED, ALL_FANS, percent]].concat()
    }

    fn raw(&self, bytes: &[u8]) -> Result<()> {
        let args: Vec<String> = std::iter::once("raw".to_string())
            .chain(bytes.iter().map(|b| format!("0x{:02x}", b)))
            .collect();
        let command_line = std::iter::once(&self.program)
            .chain(&self.base_args)
            .map(|a| a.to_string_lossy().into_owned())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Running {}", command_line);

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(&args)
            .output()
            .map_err(|e| DellFanError::Actuator(format!("{}: {}", command_line, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DellFanError::Actuator(format!(
                "{} exited with {}: {}",
                command_line,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl Default for IpmiActuator {
    fn default() -> Self {
        Self::new(DEFAULT_IPMITOOL)
    }
}

impl Actuator for IpmiActuator {
    fn disable_automatic_control(&self) -> Result<()> {
        self.raw(&Self::disable_bytes())
    }

    fn enable_automatic_control(&self) -> Result<()> {
        self.raw(&Self::enable_bytes())
    }

    fn set_fan_speed_percent(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(DellFanError::Actuator(format!(
                "fan speed {}% is out of range",
                percent
            )));
        }
        self.raw(&Self::speed_bytes(percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(IpmiActuator::disable_bytes(), vec![0x30, 0x30, 0x01, 0x00]);
        assert_eq!(IpmiActuator::enable_bytes(), vec![0x30, 0x30, 0x01, 0x01]);
        assert_eq!(IpmiActuator::speed_bytes(25), vec![0x30, 0x30, 0x02, 0xff, 0x19]);
    }

    #[test]
    fn test_out_of_range_speed_is_rejected_before_spawning() {
        let actuator = IpmiActuator::new("/nonexistent/ipmitool");
        let err = actuator.set_fan_speed_percent(101).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_missing_program_is_an_actuator_error() {
        let actuator = IpmiActuator::new("/nonexistent/ipmitool");
        assert!(matches!(
            actuator.enable_automatic_control(),
            Err(DellFanError::Actuator(_))
        ));
    }

    #[cfg(unix)]
    mod with_fake_ipmitool {
        use super::*;
        use std::fs;
        use std::path::Path;
        use tempfile::TempDir;

        /// Shell script that appends its arguments to `calls.log`. It is run
        /// through `sh` so the freshly written file is never exec'd directly.
        fn fake_ipmitool(dir: &Path, exit_code: i32) -> IpmiActuator {
            let log = dir.join("calls.log");
            let script = dir.join("ipmitool");
            fs::write(
                &script,
                format!(
                    "#!/bin/sh\necho \"$@\" >> '{}'\necho 'BMC busy' >&2\nexit {}\n",
                    log.display(),
                    exit_code
                ),
            )
            .unwrap();
            IpmiActuator::new("sh").with_args([script])
        }

        #[test]
        fn test_formats_raw_arguments() {
            let dir = TempDir::new().unwrap();
            let actuator = fake_ipmitool(dir.path(), 0);

            actuator.disable_automatic_control().unwrap();
            actuator.set_fan_speed_percent(100).unwrap();
            actuator.enable_automatic_control().unwrap();

            let calls = fs::read_to_string(dir.path().join("calls.log")).unwrap();
            assert_eq!(
                calls,
                "raw 0x30 0x30 0x01 0x00\nraw 0x30 0x30 0x02 0xff 0x64\nraw 0x30 0x30 0x01 0x01\n"
            );
        }

        #[test]
        fn test_nonzero_exit_reports_stderr() {
            let dir = TempDir::new().unwrap();
            let actuator = fake_ipmitool(dir.path(), 1);

            let err = actuator.set_fan_speed_percent(18).unwrap_err();
            assert!(matches!(err, DellFanError::Actuator(_)));
            assert!(err.to_string().contains("BMC busy"));
        }

        #[test]
        fn test_base_args_precede_raw() {
            let dir = TempDir::new().unwrap();
            let actuator = fake_ipmitool(dir.path(), 0).with_args(["-I", "lanplus", "-H", "idrac"]);

            actuator.enable_automatic_control().unwrap();

            let calls = fs::read_to_string(dir.path().join("calls.log")).unwrap();
            assert_eq!(calls, "-I lanplus -H idrac raw 0x30 0x30 0x01 0x01\n");
        }
    }
}
