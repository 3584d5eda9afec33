//! # Flight-Phase Detector
//!
//! Classifies the flight from the altitude history, evaluated every
//! [`EVALUATION_PERIOD`]:
//!
//! ```text
//! Ground ──(alt > launch + delta, or failsafe)──> Airborne ──> Landed
//!                                                  │  climbing: true/false
//! ```
//!
//! While airborne the detector tracks the running maximum and the running
//! minimum since that maximum. A spread under [`HYSTERESIS_BAND_M`] keeps
//! `climbing` set, a wider spread clears it, so GPS noise near apogee does
//! not flicker the flag. Landing needs low altitude, no further descent,
//! not climbing, and more than [`LANDING_CONFIRMATIONS`] consecutive slow
//! cycles.
//!
//! `airborne` and `landed` never revert.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::state::{FlightStore, PhaseStatus, Writer};

/// Cadence of the detector loop
pub const EVALUATION_PERIOD: Duration = Duration::from_secs(3);
/// Max/min spread that separates climbing from descending (~1,000 ft)
pub const HYSTERESIS_BAND_M: f64 = 333.0;
/// Landing is only considered below this running minimum (~10,000 ft)
pub const LANDING_CEILING_M: f64 = 3333.0;
/// Ground speed under which a cycle counts toward landing
pub const LANDING_SPEED_KT: f64 = 5.0;
/// Slow cycles that must be exceeded before declaring landed
pub const LANDING_CONFIRMATIONS: u32 = 3;

/// Everything one evaluation looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseInput {
    pub altitude_m: f64,
    pub speed_kt: f64,
    /// Valid and fresh; stale or invalid fixes only feed the failsafe
    pub fix_usable: bool,
    /// `None` until the launch calibrator has published
    pub launch_altitude_m: Option<f64>,
    pub since_start: Duration,
}

/// Pure state machine behind the phase monitor
#[derive(Debug, Clone)]
pub struct PhaseDetector {
    status: PhaseStatus,
    airborne_delta_m: f64,
    failsafe_after: Duration,
    envelope_started: bool,
    slow_cycles: u32,
}

impl PhaseDetector {
    #[must_use]
    pub fn new(airborne_delta_m: f64, failsafe_after: Duration) -> Self {
        Self {
            status: PhaseStatus::default(),
            airborne_delta_m,
            failsafe_after,
            envelope_started: false,
            slow_cycles: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> PhaseStatus {
        self.status
    }

    /// Run one evaluation cycle
    pub fn step(&mut self, input: &PhaseInput) -> PhaseStatus {
        if !self.status.airborne && input.since_start > self.failsafe_after {
            warn!(
                "Airborne failsafe: {} s since start without an airborne call",
                self.failsafe_after.as_secs()
            );
            self.status.airborne = true;
        }

        if !input.fix_usable {
            return self.status;
        }

        if !self.status.airborne {
            let Some(launch) = input.launch_altitude_m else {
                return self.status;
            };
            if input.altitude_m < launch + self.airborne_delta_m {
                return self.status;
            }
            info!(
                "Airborne at {:.1} m (launch {:.1} m + {:.0} m)",
                input.altitude_m, launch, self.airborne_delta_m
            );
            self.status.airborne = true;
        }

        self.track_envelope(input.altitude_m);
        self.check_landed(input);
        self.status
    }

    fn track_envelope(&mut self, altitude: f64) {
        let was_climbing = self.status.climbing;
        let s = &mut self.status;

        if !self.envelope_started || altitude > s.max_altitude_m {
            self.envelope_started = true;
            s.max_altitude_m = altitude;
            s.min_altitude_m = altitude;
            if s.min_altitude_m + HYSTERESIS_BAND_M > s.max_altitude_m {
                s.climbing = true;
            }
        }
        if altitude < s.min_altitude_m {
            s.min_altitude_m = altitude;
            if s.min_altitude_m + HYSTERESIS_BAND_M < s.max_altitude_m {
                s.climbing = false;
            }
        }

        if was_climbing != s.climbing {
            if s.climbing {
                info!("Climbing at {:.1} m", altitude);
            } else {
                info!(
                    "Descending: {:.1} m, {:.0} m below peak of {:.1} m",
                    altitude,
                    s.max_altitude_m - altitude,
                    s.max_altitude_m
                );
            }
        }
    }

    fn check_landed(&mut self, input: &PhaseInput) {
        let s = &mut self.status;
        if s.landed {
            return;
        }
        if s.min_altitude_m < LANDING_CEILING_M && input.altitude_m > s.min_altitude_m && !s.climbing {
            if input.speed_kt < LANDING_SPEED_KT {
                self.slow_cycles += 1;
            } else {
                self.slow_cycles = 0;
            }
            if self.slow_cycles > LANDING_CONFIRMATIONS {
                info!("Landed at {:.1} m", input.altitude_m);
                s.landed = true;
            }
        }
    }
}

/// Loop that feeds the detector from the store and publishes its status
#[derive(Debug)]
pub struct PhaseMonitor {
    detector: PhaseDetector,
    store: Arc<FlightStore>,
    phase: Writer<PhaseStatus>,
    stale_after: Duration,
}

impl PhaseMonitor {
    pub fn new(detector: PhaseDetector, store: Arc<FlightStore>, phase: Writer<PhaseStatus>, stale_after: Duration) -> Self {
        Self {
            detector,
            store,
            phase,
            stale_after,
        }
    }

    /// Build the detector input from the current store contents
    fn input(&self) -> PhaseInput {
        let now = Instant::now();
        let fix = self.store.fix();
        let launch = self.store.launch();
        PhaseInput {
            altitude_m: fix.altitude_m,
            speed_kt: fix.speed_kt,
            fix_usable: fix.is_usable(now, self.stale_after),
            launch_altitude_m: launch.set.then_some(launch.altitude_m),
            since_start: now.saturating_duration_since(self.store.started()),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::time::sleep(EVALUATION_PERIOD).await;
            let input = self.input();
            let status = self.detector.step(&input);
            self.phase.publish(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Fix;

    const FAILSAFE: Duration = Duration::from_secs(300);

    fn sample(altitude_m: f64, speed_kt: f64) -> PhaseInput {
        PhaseInput {
            altitude_m,
            speed_kt,
            fix_usable: true,
            launch_altitude_m: Some(100.0),
            since_start: Duration::from_secs(10),
        }
    }

    fn airborne_detector() -> PhaseDetector {
        let mut detector = PhaseDetector::new(20.0, FAILSAFE);
        detector.step(&sample(200.0, 10.0));
        assert!(detector.status().airborne);
        detector
    }

    #[test]
    fn test_ground_below_delta() {
        let mut detector = PhaseDetector::new(20.0, FAILSAFE);
        let status = detector.step(&sample(119.0, 0.0));
        assert!(!status.airborne);
        assert!(!status.climbing);
    }

    #[test]
    fn test_airborne_above_delta() {
        let mut detector = PhaseDetector::new(20.0, FAILSAFE);
        let status = detector.step(&sample(120.5, 3.0));
        assert!(status.airborne);
        assert!(status.climbing);
        assert_eq!(status.max_altitude_m, 120.5);
    }

    #[test]
    fn test_no_altitude_call_before_calibration() {
        let mut detector = PhaseDetector::new(20.0, FAILSAFE);
        let status = detector.step(&PhaseInput {
            launch_altitude_m: None,
            ..sample(5000.0, 0.0)
        });
        assert!(!status.airborne);
    }

    #[test]
    fn test_failsafe_declares_airborne_without_fix() {
        let mut detector = PhaseDetector::new(20.0, FAILSAFE);
        let mut input = PhaseInput {
            fix_usable: false,
            launch_altitude_m: None,
            since_start: Duration::from_secs(300),
            ..sample(0.0, 0.0)
        };
        assert!(!detector.step(&input).airborne);

        input.since_start = Duration::from_secs(301);
        let status = detector.step(&input);
        assert!(status.airborne);
        assert!(!status.climbing);
    }

    #[test]
    fn test_hysteresis_band() {
        let mut detector = airborne_detector();
        detector.step(&sample(1000.0, 10.0));
        assert!(detector.status().climbing);

        // Spread 300 m < 333 m: still climbing
        let status = detector.step(&sample(700.0, 10.0));
        assert!(status.climbing);
        assert_eq!(status.max_altitude_m, 1000.0);
        assert_eq!(status.min_altitude_m, 700.0);

        // Spread 400 m: descending
        let status = detector.step(&sample(600.0, 10.0));
        assert!(!status.climbing);
        assert_eq!(status.min_altitude_m, 600.0);
    }

    #[test]
    fn test_new_peak_resets_minimum() {
        let mut detector = airborne_detector();
        detector.step(&sample(1000.0, 10.0));
        detector.step(&sample(500.0, 10.0));
        assert!(!detector.status().climbing);

        let status = detector.step(&sample(1100.0, 10.0));
        assert!(status.climbing);
        assert_eq!(status.min_altitude_m, 1100.0);
    }

    fn descended_detector() -> PhaseDetector {
        let mut detector = airborne_detector();
        detector.step(&sample(20_000.0, 20.0));
        detector.step(&sample(1_500.0, 20.0));
        assert!(!detector.status().climbing);
        detector
    }

    #[test]
    fn test_landed_after_more_than_three_slow_cycles() {
        let mut detector = descended_detector();
        // Bouncing just above the minimum, stationary
        for _ in 0..3 {
            assert!(!detector.step(&sample(1_501.0, 1.0)).landed);
        }
        assert!(detector.step(&sample(1_502.0, 0.5)).landed);
    }

    #[test]
    fn test_speed_spike_restarts_landing_count() {
        let mut detector = descended_detector();
        for _ in 0..3 {
            detector.step(&sample(1_501.0, 1.0));
        }
        assert!(!detector.step(&sample(1_501.0, 12.0)).landed);
        for _ in 0..3 {
            assert!(!detector.step(&sample(1_501.0, 1.0)).landed);
        }
        assert!(detector.step(&sample(1_501.0, 1.0)).landed);
    }

    #[test]
    fn test_no_landing_while_still_descending() {
        let mut detector = descended_detector();
        let mut altitude = 1_500.0;
        for _ in 0..10 {
            altitude -= 5.0;
            assert!(!detector.step(&sample(altitude, 0.0)).landed);
        }
    }

    #[test]
    fn test_no_landing_above_ceiling() {
        let mut detector = airborne_detector();
        detector.step(&sample(30_000.0, 20.0));
        detector.step(&sample(25_000.0, 20.0));
        for _ in 0..10 {
            assert!(!detector.step(&sample(25_001.0, 0.0)).landed);
        }
    }

    /// Small deterministic generator so the sequence test needs no extra crate
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    #[test]
    fn test_airborne_and_landed_are_monotonic() {
        for seed in 0..50 {
            let mut rng = Lcg(seed);
            let mut detector = PhaseDetector::new(20.0, FAILSAFE);
            let mut was_airborne = false;
            let mut was_landed = false;
            for i in 0..400u64 {
                let input = PhaseInput {
                    altitude_m: rng.next() * 4_000.0,
                    speed_kt: rng.next() * 10.0,
                    fix_usable: rng.next() > 0.2,
                    launch_altitude_m: Some(100.0),
                    since_start: Duration::from_secs(i * 3),
                };
                let status = detector.step(&input);
                assert!(!was_airborne || status.airborne, "airborne reverted (seed {})", seed);
                assert!(!was_landed || status.landed, "landed reverted (seed {})", seed);
                assert!(!status.landed || status.airborne);
                was_airborne = status.airborne;
                was_landed = status.landed;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_from_store() {
        let (store, writers) = FlightStore::new(Duration::from_secs(60));
        writers.launch.publish(crate::state::LaunchReference {
            altitude_m: 100.0,
            set: true,
        });
        writers.fix.publish(Fix {
            valid: true,
            altitude_m: 500.0,
            received_at: Some(Instant::now()),
            ..Fix::default()
        });

        let monitor = PhaseMonitor::new(
            PhaseDetector::new(20.0, FAILSAFE),
            store.clone(),
            writers.phase,
            Duration::from_secs(10),
        );
        let task = tokio::spawn(monitor.run());

        tokio::time::sleep(EVALUATION_PERIOD + Duration::from_millis(10)).await;
        let phase = store.phase();
        assert!(phase.airborne);
        assert!(phase.climbing);
        assert_eq!(phase.max_altitude_m, 500.0);
        task.abort();
    }
}
