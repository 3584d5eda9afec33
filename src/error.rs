//! # Error Types
//!
//! Custom error types for the flight computer using `thiserror`.

use thiserror::Error;

/// Main error type for the flight computer
#[derive(Debug, Error)]
pub enum FlightError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial ports answered
    #[error("No serial port available (tried: {0})")]
    SerialPortNotFound(String),

    /// Malformed or unsupported NMEA sentence
    #[error("NMEA error: {0}")]
    Nmea(String),

    /// Invalid geofence definition
    #[error("Geofence error: {0}")]
    Geofence(String),

    /// Release servo or cutter fault
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Radio link errors
    #[error("Radio error: {0}")]
    Radio(String),

    /// Environmental or power sensor read failure
    #[error("Sensor error: {0}")]
    Sensor(String),
}

/// Result type alias for the flight computer
pub type Result<T> = std::result::Result<T, FlightError>;
