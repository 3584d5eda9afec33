//! # Flight Module
//!
//! Ground reference calibration and flight-phase classification.

pub mod calibration;
pub mod phase;

pub use calibration::{Calibration, LaunchCalibrator};
pub use phase::{PhaseDetector, PhaseMonitor};
