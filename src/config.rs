//! # Configuration Module
//!
//! Handles loading and validating the mission configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{FlightError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mission: MissionConfig,
    pub intervals: IntervalConfig,
    pub gps: GpsConfig,
    pub telemetry: TelemetryConfig,
    pub termination: TerminationConfig,
    pub geofence: GeofenceConfig,
    pub hardware: HardwareConfig,
    pub power: PowerConfig,
    pub logging: LoggingConfig,
}

/// Mission parameters
#[derive(Debug, Deserialize, Clone)]
pub struct MissionConfig {
    #[serde(default = "default_balloon_id")]
    pub balloon_id: String,

    #[serde(default = "default_test_area")]
    pub test_area: String,

    #[serde(default = "default_flight_time_limit_hours")]
    pub flight_time_limit_hours: f64,

    #[serde(default = "default_airborne_delta_m")]
    pub airborne_delta_m: f64,

    /// Forces the launch altitude sentinel and enables the status display.
    /// Must be false for real flights.
    #[serde(default)]
    pub test_mode: bool,

    #[serde(default = "default_airborne_failsafe_s")]
    pub airborne_failsafe_s: u64,
}

/// Task cadences
#[derive(Debug, Deserialize, Clone)]
pub struct IntervalConfig {
    #[serde(default = "default_record_s")]
    pub record_s: u64,

    #[serde(default = "default_display_s")]
    pub display_s: u64,

    #[serde(default = "default_sensor_s")]
    pub sensor_s: u64,
}

/// GPS receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default = "default_gps_ports")]
    pub ports: Vec<String>,

    #[serde(default = "default_gps_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_stale_after_s")]
    pub stale_after_s: u64,
}

/// Position report schedule and modem link
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_update_interval_min")]
    pub update_interval_min: u64,

    #[serde(default = "default_burst_count")]
    pub burst_count: u32,

    #[serde(default = "default_burst_spacing_s")]
    pub burst_spacing_s: u64,

    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,

    #[serde(default = "default_modem_port")]
    pub modem_port: String,

    #[serde(default = "default_modem_baud_rate")]
    pub modem_baud_rate: u32,
}

/// Actuation sequence timing
#[derive(Debug, Deserialize, Clone)]
pub struct TerminationConfig {
    #[serde(default = "default_servo_settle_s")]
    pub servo_settle_s: u64,

    #[serde(default = "default_heat_time_s")]
    pub heat_time_s: u64,
}

/// Operational boundary
///
/// Vertices are `[lat, lon]` pairs. When `file` is set the polygon is read
/// from that JSON file instead and `vertices` is ignored.
#[derive(Debug, Deserialize, Clone)]
pub struct GeofenceConfig {
    #[serde(default = "default_geofence_vertices")]
    pub vertices: Vec<[f64; 2]>,

    #[serde(default)]
    pub file: Option<String>,
}

/// Peripheral capabilities and device paths
#[derive(Debug, Deserialize, Clone)]
pub struct HardwareConfig {
    /// Legacy balloon computer letter (A, B or C). When set it overrides the
    /// individual capability flags below.
    #[serde(default)]
    pub computer: Option<String>,

    #[serde(default = "default_true")]
    pub has_transmitter: bool,

    #[serde(default)]
    pub has_environmental_sensor: bool,

    #[serde(default)]
    pub has_power_monitor: bool,

    #[serde(default = "default_true")]
    pub has_release_servo: bool,

    #[serde(default = "default_servo_pwm_dir")]
    pub servo_pwm_dir: String,

    #[serde(default = "default_cutter_gpio")]
    pub cutter_gpio: String,

    /// Relay boards differ: some switch on a high level, some on a low one
    #[serde(default = "default_true")]
    pub cutter_active_high: bool,

    #[serde(default = "default_hwmon_dir")]
    pub hwmon_dir: String,

    #[serde(default = "default_iio_dir")]
    pub iio_dir: String,
}

/// Battery calibration endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PowerConfig {
    #[serde(default = "default_voltage_empty")]
    pub voltage_empty: f64,

    #[serde(default = "default_voltage_full")]
    pub voltage_full: f64,
}

/// Output locations
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_record_dir")]
    pub record_dir: String,
}

/// Which peripherals this payload actually carries.
///
/// Resolved once at startup and handed to every component that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareProfile {
    pub has_transmitter: bool,
    pub has_environmental_sensor: bool,
    pub has_power_monitor: bool,
    pub has_release_servo: bool,
}

impl HardwareProfile {
    /// Profile of a legacy balloon computer letter.
    ///
    /// `A` carries everything, `B` is a bare tracker with only the thermal
    /// cutter, `C` carries the transmitter and servo without sensors.
    #[must_use]
    pub fn for_computer(letter: &str) -> Option<Self> {
        match letter.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self {
                has_transmitter: true,
                has_environmental_sensor: true,
                has_power_monitor: true,
                has_release_servo: true,
            }),
            "B" => Some(Self {
                has_transmitter: false,
                has_environmental_sensor: false,
                has_power_monitor: false,
                has_release_servo: false,
            }),
            "C" => Some(Self {
                has_transmitter: true,
                has_environmental_sensor: false,
                has_power_monitor: false,
                has_release_servo: true,
            }),
            _ => None,
        }
    }
}

// Default value functions
fn default_true() -> bool { true }

fn default_balloon_id() -> String { "none".to_string() }
fn default_test_area() -> String { "Colorado OpArea 2".to_string() }
fn default_flight_time_limit_hours() -> f64 { 2.0 }
fn default_airborne_delta_m() -> f64 { 20.0 }
fn default_airborne_failsafe_s() -> u64 { 300 }

fn default_record_s() -> u64 { 10 }
fn default_display_s() -> u64 { 10 }
fn default_sensor_s() -> u64 { 20 }

fn default_gps_ports() -> Vec<String> { vec!["/dev/ttyS0".to_string(), "/dev/ttyAMA0".to_string()] }
fn default_gps_baud_rate() -> u32 { 9600 }
fn default_probe_timeout_ms() -> u64 { 1000 }
fn default_stale_after_s() -> u64 { 10 }

fn default_update_interval_min() -> u64 { 10 }
fn default_burst_count() -> u32 { 3 }
fn default_burst_spacing_s() -> u64 { 5 }
fn default_object_prefix() -> String { "SABER_".to_string() }
fn default_modem_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_modem_baud_rate() -> u32 { 115_200 }

fn default_servo_settle_s() -> u64 { 3 }
fn default_heat_time_s() -> u64 { 20 }

fn default_geofence_vertices() -> Vec<[f64; 2]> {
    vec![
        [41.01, -102.9],
        [37.01, -102.9],
        [37.01, -109.05],
        [41.01, -109.05],
    ]
}

fn default_servo_pwm_dir() -> String { "/sys/class/pwm/pwmchip0/pwm0".to_string() }
fn default_cutter_gpio() -> String { "/sys/class/gpio/gpio26/value".to_string() }
fn default_hwmon_dir() -> String { "/sys/class/hwmon/hwmon0".to_string() }
fn default_iio_dir() -> String { "/sys/bus/iio/devices/iio:device0".to_string() }

fn default_voltage_empty() -> f64 { 9.5 }
fn default_voltage_full() -> f64 { 12.22 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_record_dir() -> String { ".".to_string() }

fn config_error(msg: impl std::fmt::Display) -> FlightError {
    FlightError::Config(toml::de::Error::custom(msg))
}

impl MissionConfig {
    /// Flight duration after which the time trigger terminates the flight.
    #[must_use]
    pub fn flight_time_limit(&self) -> Duration {
        Duration::from_secs_f64(self.flight_time_limit_hours * 3600.0)
    }
}

impl TelemetryConfig {
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_min * 60)
    }

    #[must_use]
    pub fn burst_spacing(&self) -> Duration {
        Duration::from_secs(self.burst_spacing_s)
    }
}

impl HardwareConfig {
    /// Resolve the capability flags, letting a legacy computer letter win.
    #[must_use]
    pub fn profile(&self) -> HardwareProfile {
        self.computer
            .as_deref()
            .and_then(HardwareProfile::for_computer)
            .unwrap_or(HardwareProfile {
                has_transmitter: self.has_transmitter,
                has_environmental_sensor: self.has_environmental_sensor,
                has_power_monitor: self.has_power_monitor,
                has_release_servo: self.has_release_servo,
            })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use saber_flight::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.mission.balloon_id.is_empty() {
            return Err(config_error("balloon_id cannot be empty"));
        }

        if !(self.mission.flight_time_limit_hours > 0.0 && self.mission.flight_time_limit_hours <= 48.0) {
            return Err(config_error("flight_time_limit_hours must be between 0 and 48"));
        }

        if self.mission.airborne_delta_m < 0.0 || self.mission.airborne_delta_m > 1000.0 {
            return Err(config_error("airborne_delta_m must be between 0 and 1000"));
        }

        if self.mission.airborne_failsafe_s == 0 {
            return Err(config_error("airborne_failsafe_s must be greater than 0"));
        }

        // Validate task cadences
        for (name, value) in [
            ("record_s", self.intervals.record_s),
            ("display_s", self.intervals.display_s),
            ("sensor_s", self.intervals.sensor_s),
        ] {
            if value == 0 || value > 3600 {
                return Err(config_error(format!("{} must be between 1 and 3600", name)));
            }
        }

        if self.gps.ports.is_empty() || self.gps.ports.iter().any(String::is_empty) {
            return Err(config_error("gps ports must list at least one non-empty path"));
        }

        if self.gps.probe_timeout_ms == 0 || self.gps.probe_timeout_ms > 10000 {
            return Err(config_error("probe_timeout_ms must be between 1 and 10000"));
        }

        if self.gps.stale_after_s == 0 {
            return Err(config_error("stale_after_s must be greater than 0"));
        }

        // Validate telemetry schedule
        if self.telemetry.update_interval_min == 0 || self.telemetry.update_interval_min > 1440 {
            return Err(config_error("update_interval_min must be between 1 and 1440"));
        }

        if self.telemetry.burst_count == 0 || self.telemetry.burst_count > 20 {
            return Err(config_error("burst_count must be between 1 and 20"));
        }

        if self.telemetry.burst_spacing_s < 5 || self.telemetry.burst_spacing_s > 600 {
            return Err(config_error("burst_spacing_s must be between 5 and 600"));
        }

        if self.telemetry.object_prefix.is_empty() || !self.telemetry.object_prefix.is_ascii() {
            return Err(config_error("object_prefix must be non-empty ASCII"));
        }

        if self.hardware.profile().has_transmitter && self.telemetry.modem_port.is_empty() {
            return Err(config_error("modem_port cannot be empty when a transmitter is fitted"));
        }

        if self.termination.heat_time_s == 0 || self.termination.heat_time_s > 120 {
            return Err(config_error("heat_time_s must be between 1 and 120"));
        }

        if self.termination.servo_settle_s > 60 {
            return Err(config_error("servo_settle_s must be at most 60"));
        }

        // Inline polygons are checked here; file polygons when they are loaded
        if self.geofence.file.is_none() {
            if self.geofence.vertices.len() < 3 {
                return Err(config_error("geofence needs at least 3 vertices"));
            }
            for [lat, lon] in &self.geofence.vertices {
                if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
                    return Err(config_error(format!("geofence vertex ({}, {}) is out of range", lat, lon)));
                }
            }
        }

        if let Some(letter) = &self.hardware.computer {
            if HardwareProfile::for_computer(letter).is_none() {
                return Err(config_error(format!("unknown computer type '{}' (expected A, B or C)", letter)));
            }
        }

        if self.power.voltage_full <= self.power.voltage_empty {
            return Err(config_error("voltage_full must be greater than voltage_empty"));
        }

        if self.logging.log_dir.is_empty() || self.logging.record_dir.is_empty() {
            return Err(config_error("log_dir and record_dir cannot be empty"));
        }

        Ok(())
    }
}
