//! Command line argument parsing for the fan controller

use crate::{
    actuator::DEFAULT_IPMITOOL,
    config::{DEFAULT_MIN_SPEED, DEFAULT_POLL_RATE_SECS},
    sensor::{DEFAULT_CHIP, HWMON_ROOT},
};
use clap::Parser;
use std::path::PathBuf;

/// Dell PowerEdge fan controller
///
/// Overrides the iDRAC automatic fan control with a speed derived from the
/// hottest CPU temperature, until stopped.
#[derive(Parser, Debug)]
#[command(name = "dellfan")]
#[command(about = "Closed-loop IPMI fan controller")]
#[command(version)]
pub struct Args {
    /// Seconds between control cycles (clamped to 0 < rate <= 60)
    #[arg(short = 'r', long, default_value_t = DEFAULT_POLL_RATE_SECS, allow_negative_numbers = true)]
    pub poll_rate: f64,

    /// Lowest fan speed ever commanded, as a fraction of full speed
    #[arg(short, long, default_value_t = DEFAULT_MIN_SPEED, allow_negative_numbers = true)]
    pub min_speed: f64,

    /// Print the fan curve for 10..99°C and exit
    #[arg(long)]
    pub dump_curve: bool,

    /// Re-enable automatic fan control and exit
    #[arg(long, conflicts_with = "dump_curve")]
    pub cleanup: bool,

    /// Print temperature and fan speed every cycle
    #[arg(long)]
    pub print: bool,

    /// hwmon chip whose temperature channels are read
    #[arg(long, default_value = DEFAULT_CHIP)]
    pub sensor_chip: String,

    /// Root of the hwmon class directory
    #[arg(long, default_value = HWMON_ROOT)]
    pub hwmon_root: PathBuf,

    /// Program used to send raw IPMI commands
    #[arg(long, default_value = DEFAULT_IPMITOOL)]
    pub ipmitool: PathBuf,

    /// Extra argument passed to ipmitool before `raw` (repeatable)
    #[arg(long = "ipmi-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub ipmi_args: Vec<String>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
