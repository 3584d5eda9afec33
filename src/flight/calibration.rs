//! # Launch Calibrator
//!
//! Establishes the ground reference altitude once at startup.
//!
//! GPS altitude wanders by several meters while the payload sits still, so a
//! single reading would risk an early airborne call. The calibrator waits for
//! a lock, averages one sample per second for a fixed window and publishes
//! the mean rounded to one decimal.
//!
//! It never stalls the mission: every failure path publishes a sentinel
//! altitude and marks calibration complete.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::state::{FlightStore, LaunchReference, Writer};

/// Longest wait for the first valid fix
pub const GPS_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// Length of the sampling window once locked
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(20);
/// One altitude sample per period
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);
/// Lock polling period
const LOCK_POLL: Duration = Duration::from_millis(500);

/// Published when no lock arrived within [`GPS_LOCK_TIMEOUT`]
pub const LOCK_TIMEOUT_ALTITUDE_M: f64 = -5.0;
/// Published when locked but no sample was collected
pub const NO_SAMPLES_ALTITUDE_M: f64 = -33.0;
/// Forced in test mode so bench runs never look airborne by accident
pub const TEST_MODE_ALTITUDE_M: f64 = -99.0;

/// How the launch reference was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calibration {
    Averaged { altitude_m: f64, samples: usize },
    TestMode { samples: usize },
    LockTimeout,
    NoSamples,
}

impl Calibration {
    /// Altitude to publish as the launch reference
    #[must_use]
    pub fn altitude_m(&self) -> f64 {
        match self {
            Self::Averaged { altitude_m, .. } => *altitude_m,
            Self::TestMode { .. } => TEST_MODE_ALTITUDE_M,
            Self::LockTimeout => LOCK_TIMEOUT_ALTITUDE_M,
            Self::NoSamples => NO_SAMPLES_ALTITUDE_M,
        }
    }

    /// Decide the outcome of a locked sampling window
    #[must_use]
    pub fn from_samples(samples: &[f64], test_mode: bool) -> Self {
        match mean_altitude(samples) {
            None => Self::NoSamples,
            Some(_) if test_mode => Self::TestMode { samples: samples.len() },
            Some(altitude_m) => Self::Averaged {
                altitude_m,
                samples: samples.len(),
            },
        }
    }
}

/// Arithmetic mean rounded to one decimal, `None` for an empty window
///
/// # Examples
///
/// ```
/// use saber_flight::flight::calibration::mean_altitude;
///
/// assert_eq!(mean_altitude(&[100.0, 102.0, 98.0, 100.0]), Some(100.0));
/// assert_eq!(mean_altitude(&[]), None);
/// ```
#[must_use]
pub fn mean_altitude(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

/// One-shot task producing the store's launch reference
#[derive(Debug)]
pub struct LaunchCalibrator {
    store: Arc<FlightStore>,
    launch: Writer<LaunchReference>,
    test_mode: bool,
}

impl LaunchCalibrator {
    pub fn new(store: Arc<FlightStore>, launch: Writer<LaunchReference>, test_mode: bool) -> Self {
        Self {
            store,
            launch,
            test_mode,
        }
    }

    /// Wait for lock, sample, publish. Terminal once it returns.
    pub async fn run(self) -> Calibration {
        let outcome = self.calibrate().await;
        let altitude_m = outcome.altitude_m();
        self.launch.publish(LaunchReference {
            altitude_m,
            set: true,
        });

        match outcome {
            Calibration::Averaged { samples, .. } => {
                info!("Launch altitude set to {:.1} m from {} samples", altitude_m, samples)
            }
            Calibration::TestMode { samples } => warn!(
                "Testing mode is ACTIVE; launch altitude forced to {} m ({} samples ignored)",
                altitude_m, samples
            ),
            Calibration::LockTimeout => error!(
                "GPS timeout - no lock acquired after {} seconds, launch altitude set to {} m",
                GPS_LOCK_TIMEOUT.as_secs(),
                altitude_m
            ),
            Calibration::NoSamples => error!("No valid altitude readings collected, launch altitude set to {} m", altitude_m),
        }
        outcome
    }

    async fn calibrate(&self) -> Calibration {
        let wait_start = Instant::now();
        while !self.store.fix().valid {
            if wait_start.elapsed() > GPS_LOCK_TIMEOUT {
                return Calibration::LockTimeout;
            }
            tokio::time::sleep(LOCK_POLL).await;
        }

        let mut samples = Vec::with_capacity((SAMPLE_WINDOW.as_secs() + 1) as usize);
        let window_start = Instant::now();
        while window_start.elapsed() < SAMPLE_WINDOW {
            let fix = self.store.fix();
            if fix.valid {
                samples.push(fix.altitude_m);
            }
            tokio::time::sleep(SAMPLE_PERIOD).await;
        }

        Calibration::from_samples(&samples, self.test_mode)
    }
}
