//! Sensor drivers over the Linux IIO and hwmon sysfs interfaces.
//!
//! Both expose fixed-point integers in milli-units (micro for power), one
//! value per file.

use std::fs;
use std::path::{Path, PathBuf};

use super::{EnvironmentReading, EnvironmentalSensor, PowerMonitor, PowerReading};
use crate::error::{FlightError, Result};

fn read_scaled(path: &Path, scale: f64) -> Result<f64> {
    let raw = fs::read_to_string(path).map_err(|e| FlightError::Sensor(format!("{}: {}", path.display(), e)))?;
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| FlightError::Sensor(format!("{}: not a number: {:?}", path.display(), raw.trim())))?;
    Ok(value as f64 * scale)
}

/// Temperature/humidity sensor bound to an IIO device (`/sys/bus/iio/devices/iio:deviceN`)
#[derive(Debug, Clone)]
pub struct IioEnvironmentalSensor {
    device_dir: PathBuf,
}

impl IioEnvironmentalSensor {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }
}

impl EnvironmentalSensor for IioEnvironmentalSensor {
    fn read(&mut self) -> Result<EnvironmentReading> {
        Ok(EnvironmentReading {
            temperature_c: read_scaled(&self.device_dir.join("in_temp_input"), 1e-3)?,
            humidity_pct: read_scaled(&self.device_dir.join("in_humidityrelative_input"), 1e-3)?,
        })
    }
}

/// Bus voltage/current/power monitor bound to a hwmon device (`/sys/class/hwmon/hwmonN`)
#[derive(Debug, Clone)]
pub struct HwmonPowerMonitor {
    device_dir: PathBuf,
}

impl HwmonPowerMonitor {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }
}

impl PowerMonitor for HwmonPowerMonitor {
    fn read(&mut self) -> Result<PowerReading> {
        Ok(PowerReading {
            voltage_v: read_scaled(&self.device_dir.join("in1_input"), 1e-3)?,
            current_ma: read_scaled(&self.device_dir.join("curr1_input"), 1.0)?,
            power_mw: read_scaled(&self.device_dir.join("power1_input"), 1e-3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_iio_reading() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in_temp_input"), "-12500\n").unwrap();
        fs::write(dir.path().join("in_humidityrelative_input"), "41200\n").unwrap();

        let reading = IioEnvironmentalSensor::new(dir.path()).read().unwrap();
        assert!((reading.temperature_c - -12.5).abs() < 1e-9);
        assert!((reading.humidity_pct - 41.2).abs() < 1e-9);
    }

    #[test]
    fn test_hwmon_reading() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in1_input"), "11840\n").unwrap();
        fs::write(dir.path().join("curr1_input"), "215\n").unwrap();
        fs::write(dir.path().join("power1_input"), "2545000\n").unwrap();

        let reading = HwmonPowerMonitor::new(dir.path()).read().unwrap();
        assert!((reading.voltage_v - 11.84).abs() < 1e-9);
        assert_eq!(reading.current_ma, 215.0);
        assert!((reading.power_mw - 2545.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_or_garbled_attribute() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            HwmonPowerMonitor::new(dir.path()).read(),
            Err(FlightError::Sensor(_))
        ));

        fs::write(dir.path().join("in_temp_input"), "n/a").unwrap();
        fs::write(dir.path().join("in_humidityrelative_input"), "1000").unwrap();
        assert!(matches!(
            IioEnvironmentalSensor::new(dir.path()).read(),
            Err(FlightError::Sensor(_))
        ));
    }
}
