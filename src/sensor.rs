//! CPU temperature sensing

use crate::errors::{DellFanError, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Default hwmon chip read for CPU package and core temperatures
pub const DEFAULT_CHIP: &str = "coretemp";
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// One channel's temperature in degrees Celsius
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub channel: String,
    pub celsius: f64,
}

impl TemperatureReading {
    pub fn new(channel: impl Into<String>, celsius: f64) -> Self {
        Self {
            channel: channel.into(),
            celsius,
        }
    }
}

/// Source of temperature readings for the control loop
pub trait Sensor {
    /// Read every channel the sensor exposes
    fn read_temperatures(&self) -> Result<Vec<TemperatureReading>>;
}

impl<S: Sensor + ?Sized> Sensor for &S {
    fn read_temperatures(&self) -> Result<Vec<TemperatureReading>> {
        (**self).read_temperatures()
    }
}

/// Worst-case reading across channels
pub fn hottest(readings: &[TemperatureReading]) -> Result<&TemperatureReading> {
    readings
        .iter()
        .filter(|r| !r.celsius.is_nan())
        .max_by(|a, b| a.celsius.total_cmp(&b.celsius))
        .ok_or_else(|| DellFanError::SensorUnavailable("no temperature channels reported".into()))
}

/// A single `tempN_input` file and its label
#[derive(Debug, Clone)]
struct Channel {
    id: String,
    input_path: PathBuf,
}

/// Reads every `temp*_input` of every hwmon chip with a given name
///
/// Multi-socket machines register one `coretemp` chip per package, so all
/// matching chips are read.
pub struct HwmonSensor {
    chip: String,
    channels: Vec<Channel>,
}

impl HwmonSensor {
    /// Scan `root` for chips named `chip` and collect their channels
    pub fn discover(root: &Path, chip: &str) -> Result<Self> {
        info!("Scanning {} for '{}' temperature sensors", root.display(), chip);

        let entries = fs::read_dir(root).map_err(|e| {
            DellFanError::SensorUnavailable(format!("cannot read {}: {}", root.display(), e))
        })?;

        let mut hwmon_dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                fs::read_to_string(path.join("name"))
                    .map(|name| name.trim() == chip)
                    .unwrap_or(false)
            })
            .collect();
        hwmon_dirs.sort();

        let mut channels = Vec::new();
        for dir in &hwmon_dirs {
            channels.extend(Self::find_channels(dir)?);
        }

        if channels.is_empty() {
            return Err(DellFanError::SensorUnavailable(format!(
                "no '{}' temperature channels under {}",
                chip,
                root.display()
            )));
        }

        info!(
            "Found {} '{}' channels across {} chip(s)",
            channels.len(),
            chip,
            hwmon_dirs.len()
        );
        Ok(Self {
            chip: chip.to_string(),
            channels,
        })
    }

    /// Find the `tempN_input` files of one hwmon directory
    fn find_channels(hwmon_path: &Path) -> Result<Vec<Channel>> {
        let entries = fs::read_dir(hwmon_path).map_err(|e| {
            DellFanError::SensorUnavailable(format!("cannot read {}: {}", hwmon_path.display(), e))
        })?;
        let device = hwmon_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut channels: Vec<Channel> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let base = file_name.strip_prefix("temp")?.strip_suffix("_input")?.to_string();
                let label = fs::read_to_string(hwmon_path.join(format!("temp{}_label", base)))
                    .map(|l| l.trim().to_string())
                    .unwrap_or_else(|_| format!("temp{}", base));
                Some(Channel {
                    id: format!("{}/{}", device, label),
                    input_path: entry.path(),
                })
            })
            .collect();
        channels.sort_by(|a, b| a.input_path.cmp(&b.input_path));

        debug!("{}: {:?}", hwmon_path.display(), channels);
        Ok(channels)
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.id.as_str())
    }

    fn read_channel(channel: &Channel) -> Result<TemperatureReading> {
        let content = fs::read_to_string(&channel.input_path).map_err(|e| {
            DellFanError::SensorUnavailable(format!("{}: {}", channel.input_path.display(), e))
        })?;

        // Temperature is reported in millidegrees Celsius
        let millidegrees: i64 = content.trim().parse().map_err(|_| {
            DellFanError::SensorUnavailable(format!(
                "{}: cannot parse '{}'",
                channel.input_path.display(),
                content.trim()
            ))
        })?;

        Ok(TemperatureReading::new(channel.id.clone(), millidegrees as f64 / 1000.0))
    }
}

impl Sensor for HwmonSensor {
    fn read_temperatures(&self) -> Result<Vec<TemperatureReading>> {
        self.channels.iter().map(Self::read_channel).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_chip(root: &Path, hwmon: &str, name: &str, channels: &[(u32, Option<&str>, &str)]) {
        let dir = root.join(hwmon);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
        for (index, label, value) in channels {
            fs::write(dir.join(format!("temp{}_input", index)), format!("{}\n", value)).unwrap();
            if let Some(label) = label {
                fs::write(dir.join(format!("temp{}_label", index)), format!("{}\n", label)).unwrap();
            }
        }
    }

    #[test]
    fn test_hottest_picks_maximum() {
        let readings = vec![
            TemperatureReading::new("core0", 41.0),
            TemperatureReading::new("core1", 63.5),
            TemperatureReading::new("package", 60.0),
        ];
        assert_eq!(hottest(&readings).unwrap().channel, "core1");
    }

    #[test]
    fn test_hottest_of_nothing_is_unavailable() {
        assert!(matches!(hottest(&[]), Err(DellFanError::SensorUnavailable(_))));
    }

    #[test]
    fn test_discover_reads_all_matching_chips() {
        let root = TempDir::new().unwrap();
        fake_chip(
            root.path(),
            "hwmon0",
            "coretemp",
            &[(1, Some("Package id 0"), "52000"), (2, Some("Core 0"), "49000")],
        );
        fake_chip(root.path(), "hwmon1", "acpitz", &[(1, None, "90000")]);
        fake_chip(root.path(), "hwmon2", "coretemp", &[(1, None, "57500")]);

        let sensor = HwmonSensor::discover(root.path(), DEFAULT_CHIP).unwrap();
        let ids: Vec<&str> = sensor.channel_ids().collect();
        assert_eq!(ids, vec!["hwmon0/Package id 0", "hwmon0/Core 0", "hwmon2/temp1"]);

        let readings = sensor.read_temperatures().unwrap();
        let hot = hottest(&readings).unwrap();
        assert_eq!(hot.channel, "hwmon2/temp1");
        assert_eq!(hot.celsius, 57.5);
    }

    #[test]
    fn test_missing_chip_is_unavailable() {
        let root = TempDir::new().unwrap();
        fake_chip(root.path(), "hwmon0", "k10temp", &[(1, Some("Tctl"), "45000")]);

        let err = HwmonSensor::discover(root.path(), DEFAULT_CHIP).err().unwrap();
        assert!(matches!(err, DellFanError::SensorUnavailable(_)));
    }

    #[test]
    fn test_vanished_channel_fails_read() {
        let root = TempDir::new().unwrap();
        fake_chip(root.path(), "hwmon0", "coretemp", &[(1, None, "50000")]);
        let sensor = HwmonSensor::discover(root.path(), DEFAULT_CHIP).unwrap();

        fs::remove_file(root.path().join("hwmon0/temp1_input")).unwrap();
        assert!(matches!(
            sensor.read_temperatures(),
            Err(DellFanError::SensorUnavailable(_))
        ));
    }

    #[test]
    fn test_garbage_value_fails_read() {
        let root = TempDir::new().unwrap();
        fake_chip(root.path(), "hwmon0", "coretemp", &[(1, None, "hot")]);
        let sensor = HwmonSensor::discover(root.path(), DEFAULT_CHIP).unwrap();
        assert!(sensor.read_temperatures().is_err());
    }
}
