//! # Termination Module
//!
//! Two independent monitors may end the flight:
//!
//! | Trigger | Cadence | Condition |
//! |---------|---------|-----------|
//! | [`TimeTrigger`] | 5 s | airborne for longer than the flight-time limit |
//! | [`GeofenceTrigger`] | 10 s | outside the polygon on two checks 10 s apart |
//!
//! Whichever claims the store's [`TerminationLatch`](crate::state::TerminationLatch)
//! first runs the [`TerminationSequence`]; the other never fires. The sequence
//! itself is serialized and safe to repeat.

pub mod geofence;
pub mod hardware;
pub mod timer;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::TerminationConfig;
use crate::state::TriggerCause;
use crate::telemetry::TelemetryHandle;
pub use geofence::{Geofence, GeofenceTrigger};
pub use hardware::{Cutter, ReleaseMechanism};
pub use timer::TimeTrigger;

/// Waits inside the actuation sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationTiming {
    /// After opening the release, before heating the cutter
    pub servo_settle: Duration,
    /// How long the cutter stays energized
    pub heat_time: Duration,
}

impl ActuationTiming {
    pub fn from_config(config: &TerminationConfig) -> Self {
        Self {
            servo_settle: Duration::from_secs(config.servo_settle_s),
            heat_time: Duration::from_secs(config.heat_time_s),
        }
    }
}

/// Physical release procedure
///
/// 1. Command the release mechanism open, if one is fitted
/// 2. Wait for the servo to settle
/// 3. Energize the backup cutter for the heat time, then de-energize it
/// 4. Send an out-of-cycle position report, if a transmitter is fitted
///
/// A failing step is logged and the next step still runs. Invocations are
/// serialized; a repeated run drives the hardware to the same end state.
pub struct TerminationSequence {
    release: Option<Box<dyn ReleaseMechanism>>,
    cutter: Box<dyn Cutter>,
    telemetry: Option<TelemetryHandle>,
    timing: ActuationTiming,
    /// Completed runs, held for the whole sequence
    runs: Mutex<u32>,
}

impl TerminationSequence {
    pub fn new(
        release: Option<Box<dyn ReleaseMechanism>>,
        cutter: Box<dyn Cutter>,
        telemetry: Option<TelemetryHandle>,
        timing: ActuationTiming,
    ) -> Self {
        Self {
            release,
            cutter,
            telemetry,
            timing,
            runs: Mutex::new(0),
        }
    }

    /// Run the full sequence
    pub async fn actuate(&self, cause: TriggerCause) {
        let mut runs = self.runs.lock().await;
        warn!("Termination has been commanded ({})", cause);

        if let Some(release) = &self.release {
            match release.open() {
                Ok(()) => info!("Servo opened"),
                Err(e) => error!("Servo release failed: {}", e),
            }
            tokio::time::sleep(self.timing.servo_settle).await;
        }

        match self.cutter.energize() {
            Ok(()) => info!("Nichrome ON"),
            Err(e) => error!("Nichrome energize failed: {}", e),
        }
        tokio::time::sleep(self.timing.heat_time).await;
        match self.cutter.deenergize() {
            Ok(()) => info!("Nichrome OFF"),
            // Keep trying: a stuck-on cutter drains the battery
            Err(e) => {
                error!("Nichrome de-energize failed: {}, retrying", e);
                if let Err(e) = self.cutter.deenergize() {
                    error!("Nichrome de-energize retry failed: {}", e);
                }
            }
        }

        *runs += 1;
        info!("Termination complete (run {})", *runs);

        if let Some(telemetry) = &self.telemetry {
            if let Err(e) = telemetry.send_report().await {
                error!("Termination report failed: {}", e);
            }
        }
    }

    /// Number of completed sequences
    pub async fn runs(&self) -> u32 {
        *self.runs.lock().await
    }

    /// Return once no sequence is in progress
    pub async fn wait_idle(&self) {
        drop(self.runs.lock().await);
    }
}

/// Shared by both triggers and the shutdown path
pub type SharedSequence = Arc<TerminationSequence>;
