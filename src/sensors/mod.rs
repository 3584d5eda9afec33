//! # Auxiliary Sensor Monitors
//!
//! Two independent polling loops feed the store:
//! - [`EnvironmentMonitor`]: internal temperature and humidity
//! - [`ElectricalMonitor`]: bus voltage, current, power and the derived
//!   battery charge fraction
//!
//! A failed read is logged and the last good value stays in the store.

pub mod linux;

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::state::{Environment, PowerStatus, Writer};
pub use linux::{HwmonPowerMonitor, IioEnvironmentalSensor};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub voltage_v: f64,
    pub current_ma: f64,
    pub power_mw: f64,
}

#[cfg_attr(test, mockall::automock)]
pub trait EnvironmentalSensor: Send {
    fn read(&mut self) -> Result<EnvironmentReading>;
}

#[cfg_attr(test, mockall::automock)]
pub trait PowerMonitor: Send {
    fn read(&mut self) -> Result<PowerReading>;
}

impl<T: EnvironmentalSensor + ?Sized> EnvironmentalSensor for Box<T> {
    fn read(&mut self) -> Result<EnvironmentReading> {
        (**self).read()
    }
}

impl<T: PowerMonitor + ?Sized> PowerMonitor for Box<T> {
    fn read(&mut self) -> Result<PowerReading> {
        (**self).read()
    }
}

/// Linear charge estimate between the empty and full voltages, clamped to 0..=1
///
/// # Examples
///
/// ```
/// use saber_flight::sensors::charge_fraction;
///
/// assert_eq!(charge_fraction(12.22, 9.5, 12.22), 1.0);
/// assert_eq!(charge_fraction(8.6, 9.5, 12.22), 0.0);
/// ```
pub fn charge_fraction(voltage: f64, empty: f64, full: f64) -> f64 {
    ((voltage - empty) / (full - empty)).clamp(0.0, 1.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Sole producer of the store's environment field
pub struct EnvironmentMonitor<S: EnvironmentalSensor> {
    sensor: S,
    environment: Writer<Environment>,
    period: Duration,
}

impl<S: EnvironmentalSensor> EnvironmentMonitor<S> {
    pub fn new(sensor: S, environment: Writer<Environment>, period: Duration) -> Self {
        Self {
            sensor,
            environment,
            period,
        }
    }

    /// Take one reading. On error the stored value is left alone.
    pub fn poll(&mut self) -> Result<()> {
        let reading = self.sensor.read()?;
        debug!("Environment: {:.1} °C, {:.1} %", reading.temperature_c, reading.humidity_pct);
        self.environment.publish(Environment {
            temperature_c: Some(round1(reading.temperature_c)),
            humidity_pct: Some(round1(reading.humidity_pct)),
        });
        Ok(())
    }

    pub async fn run(mut self) {
        loop {
            if let Err(e) = self.poll() {
                warn!("Environmental sensor error: {}", e);
            }
            tokio::time::sleep(self.period).await;
        }
    }
}

/// Sole producer of the store's power field
pub struct ElectricalMonitor<P: PowerMonitor> {
    monitor: P,
    power: Writer<PowerStatus>,
    period: Duration,
    voltage_empty: f64,
    voltage_full: f64,
}

impl<P: PowerMonitor> ElectricalMonitor<P> {
    /// # Arguments
    ///
    /// * `monitor` - Bus monitor to poll
    /// * `power` - Writer for the store's power field
    /// * `period` - Poll cadence
    /// * `voltage_empty`, `voltage_full` - Calibrated charge endpoints
    pub fn new(monitor: P, power: Writer<PowerStatus>, period: Duration, voltage_empty: f64, voltage_full: f64) -> Self {
        Self {
            monitor,
            power,
            period,
            voltage_empty,
            voltage_full,
        }
    }

    /// Take one reading. On error the stored value is left alone.
    pub fn poll(&mut self) -> Result<()> {
        let reading = self.monitor.read()?;
        let voltage = round1(reading.voltage_v);
        self.power.publish(PowerStatus {
            voltage_v: Some(voltage),
            current_ma: Some(round1(reading.current_ma)),
            power_mw: Some(round1(reading.power_mw)),
            charge_fraction: Some(charge_fraction(voltage, self.voltage_empty, self.voltage_full)),
        });
        Ok(())
    }

    pub async fn run(mut self) {
        loop {
            if let Err(e) = self.poll() {
                warn!("Power monitor error: {}", e);
            }
            tokio::time::sleep(self.period).await;
        }
    }
}
