//! Release hardware seams and their Linux sysfs drivers.
//!
//! The primary release is a hobby servo on a PWM channel, the backup is a
//! nichrome wire switched through a relay on a GPIO line.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FlightError, Result};

/// Servo frame period (50 Hz)
pub const SERVO_PERIOD_NS: u32 = 20_000_000;
/// Pulse width holding the retention line
pub const SERVO_CLOSED_NS: u32 = 1_000_000;
/// Pulse width releasing the retention line
pub const SERVO_OPEN_NS: u32 = 2_000_000;

/// Primary mechanical release
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseMechanism: Send + Sync {
    /// Drive the mechanism to its release position
    fn open(&self) -> Result<()>;

    /// Drive the mechanism to its holding position
    fn close(&self) -> Result<()>;
}

/// Backup thermal cutter
#[cfg_attr(test, mockall::automock)]
pub trait Cutter: Send + Sync {
    fn energize(&self) -> Result<()>;
    fn deenergize(&self) -> Result<()>;
}

fn write_attribute(path: &Path, value: &str) -> Result<()> {
    debug!("{} <- {}", path.display(), value);
    fs::write(path, value).map_err(|e| FlightError::Hardware(format!("writing {}: {}", path.display(), e)))
}

/// Servo on an exported sysfs PWM channel (`/sys/class/pwm/pwmchipN/pwmM`)
#[derive(Debug, Clone)]
pub struct PwmServo {
    channel_dir: PathBuf,
}

impl PwmServo {
    pub fn new(channel_dir: impl Into<PathBuf>) -> Self {
        Self {
            channel_dir: channel_dir.into(),
        }
    }

    /// Program the frame period, park the servo closed and enable the output.
    ///
    /// # Errors
    ///
    /// Returns `FlightError::Hardware` if any attribute cannot be written,
    /// typically because the channel has not been exported.
    pub fn init(&self) -> Result<()> {
        write_attribute(&self.channel_dir.join("period"), &SERVO_PERIOD_NS.to_string())?;
        self.close()?;
        write_attribute(&self.channel_dir.join("enable"), "1")
    }

    fn set_duty(&self, duty_ns: u32) -> Result<()> {
        write_attribute(&self.channel_dir.join("duty_cycle"), &duty_ns.to_string())
    }
}

impl ReleaseMechanism for PwmServo {
    fn open(&self) -> Result<()> {
        self.set_duty(SERVO_OPEN_NS)
    }

    fn close(&self) -> Result<()> {
        self.set_duty(SERVO_CLOSED_NS)
    }
}

/// Relay on a sysfs GPIO `value` file
///
/// Some relay boards switch on a low level, hence `active_high`.
#[derive(Debug, Clone)]
pub struct GpioRelay {
    value_path: PathBuf,
    active_high: bool,
}

impl GpioRelay {
    pub fn new(value_path: impl Into<PathBuf>, active_high: bool) -> Self {
        Self {
            value_path: value_path.into(),
            active_high,
        }
    }

    fn set(&self, on: bool) -> Result<()> {
        let level = if on == self.active_high { "1" } else { "0" };
        write_attribute(&self.value_path, level)
    }
}

impl Cutter for GpioRelay {
    fn energize(&self) -> Result<()> {
        self.set(true)
    }

    fn deenergize(&self) -> Result<()> {
        self.set(false)
    }
}
