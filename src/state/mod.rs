//! # Flight State Store
//!
//! The single shared record of position, phase, safety, timing, sensor and
//! radio fields. Every field lives in its own [`DataCell`] and has exactly one
//! [`Writer`], handed out once by [`FlightStore::new`] and moved into the task
//! that produces the field. Everyone else reads through the store.
//!
//! Reads of two different fields are not mutually consistent; every consumer
//! tolerates values that are stale by up to the producer's cadence.

mod cell;

pub use cell::{DataCell, Writer};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Latest positioning fix.
///
/// Altitude, speed and course are only meaningful while `valid` is set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub speed_kt: f64,
    pub course_deg: f64,
    pub valid: bool,
    pub satellites: u8,
    pub utc_time: Option<NaiveTime>,
    pub utc_date: Option<NaiveDate>,
    /// When the last validity sentence arrived.
    pub received_at: Option<Instant>,
}

impl Fix {
    /// Valid and no older than `max_age` at `now`.
    #[must_use]
    pub fn is_usable(&self, now: Instant, max_age: Duration) -> bool {
        self.valid
            && self
                .received_at
                .is_some_and(|at| now.saturating_duration_since(at) <= max_age)
    }

    /// `lat,lon` pair suitable for a map query.
    #[must_use]
    pub fn map_link(&self) -> String {
        if self.received_at.is_none() {
            return "*** No GPS data ***".to_string();
        }
        format!("http://maps.google.com/?q={},{}", self.latitude, self.longitude)
    }
}

/// Ground reference altitude produced by the launch calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LaunchReference {
    pub altitude_m: f64,
    pub set: bool,
}

/// Flight-phase flags and the altitude envelope tracked since launch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseStatus {
    pub airborne: bool,
    pub climbing: bool,
    pub landed: bool,
    pub max_altitude_m: f64,
    pub min_altitude_m: f64,
}

/// Flight clock owned by the time trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlightClock {
    /// First instant the vehicle was seen airborne.
    pub origin: Option<Instant>,
    pub elapsed_s: u64,
}

/// Last known good environmental reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Environment {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

/// Last known good electrical reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerStatus {
    pub voltage_v: Option<f64>,
    pub current_ma: Option<f64>,
    pub power_mw: Option<f64>,
    /// 0.0 (empty) to 1.0 (full).
    pub charge_fraction: Option<f64>,
}

/// Radio bookkeeping owned by the transmitter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RadioStats {
    /// Sequence byte appended to the next message.
    pub sequence: u8,
    pub messages_sent: u64,
    pub last_sent: Option<DateTime<Utc>>,
    pub tx_duration_s: Option<f64>,
    pub byte_rate: Option<f64>,
    pub last_report: Option<String>,
}

/// Why the flight was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerCause {
    #[default]
    None,
    Timing,
    Geofencing,
}

impl TriggerCause {
    fn from_u8(value: u8) -> Self {
        match value {
            LATCH_TIMING => Self::Timing,
            LATCH_GEOFENCING => Self::Geofencing,
            _ => Self::None,
        }
    }
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Timing => f.write_str("Timing"),
            Self::Geofencing => f.write_str("Geofencing"),
        }
    }
}

const LATCH_INTACT: u8 = 0;
const LATCH_TIMING: u8 = 1;
const LATCH_GEOFENCING: u8 = 2;

/// Single-fire intact flag and trigger cause, packed into one atomic.
///
/// The first trigger to [`claim`](Self::claim) it flips intact to false and
/// records its cause in the same operation. Every later claim fails.
#[derive(Debug)]
pub struct TerminationLatch {
    state: AtomicU8,
}

impl TerminationLatch {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(LATCH_INTACT),
        }
    }

    /// Clear intact with the given cause. Returns `false` if already terminated.
    pub fn claim(&self, cause: TriggerCause) -> bool {
        let code = match cause {
            TriggerCause::None => return false,
            TriggerCause::Timing => LATCH_TIMING,
            TriggerCause::Geofencing => LATCH_GEOFENCING,
        };
        self.state
            .compare_exchange(LATCH_INTACT, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn intact(&self) -> bool {
        self.state.load(Ordering::Acquire) == LATCH_INTACT
    }

    #[must_use]
    pub fn cause(&self) -> TriggerCause {
        TriggerCause::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Read-only view of the airborne flag, consulted by the termination triggers.
pub trait AirborneSignal: Send + Sync {
    fn is_airborne(&self) -> bool;
}

/// Write handles for every store field, one per producing task.
#[derive(Debug)]
pub struct StoreWriters {
    pub fix: Writer<Fix>,
    pub launch: Writer<LaunchReference>,
    pub phase: Writer<PhaseStatus>,
    pub contained: Writer<bool>,
    pub flight_clock: Writer<FlightClock>,
    pub environment: Writer<Environment>,
    pub power: Writer<PowerStatus>,
    pub radio: Writer<RadioStats>,
}

/// Shared flight state, created once at startup and alive until exit.
#[derive(Debug)]
pub struct FlightStore {
    started: Instant,
    flight_time_limit: Duration,
    fix: Arc<DataCell<Fix>>,
    launch: Arc<DataCell<LaunchReference>>,
    phase: Arc<DataCell<PhaseStatus>>,
    contained: Arc<DataCell<bool>>,
    flight_clock: Arc<DataCell<FlightClock>>,
    environment: Arc<DataCell<Environment>>,
    power: Arc<DataCell<PowerStatus>>,
    radio: Arc<DataCell<RadioStats>>,
    termination: TerminationLatch,
}

/// Copy of every field taken one cell at a time, for the recorder, the
/// report encoder and the status display.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub fix: Fix,
    pub launch: LaunchReference,
    pub phase: PhaseStatus,
    pub contained: bool,
    pub flight_clock: FlightClock,
    pub environment: Environment,
    pub power: PowerStatus,
    pub radio: RadioStats,
    pub intact: bool,
    pub trigger: TriggerCause,
    pub flight_time_limit: Duration,
}

impl FlightStore {
    /// Create the store with zeroed fields and hand out its writers.
    pub fn new(flight_time_limit: Duration) -> (Arc<Self>, StoreWriters) {
        let fix = Arc::new(DataCell::new(Fix::default()));
        let launch = Arc::new(DataCell::new(LaunchReference::default()));
        let phase = Arc::new(DataCell::new(PhaseStatus::default()));
        let contained = Arc::new(DataCell::new(false));
        let flight_clock = Arc::new(DataCell::new(FlightClock::default()));
        let environment = Arc::new(DataCell::new(Environment::default()));
        let power = Arc::new(DataCell::new(PowerStatus::default()));
        let radio = Arc::new(DataCell::new(RadioStats::default()));

        let writers = StoreWriters {
            fix: Writer::new(fix.clone()),
            launch: Writer::new(launch.clone()),
            phase: Writer::new(phase.clone()),
            contained: Writer::new(contained.clone()),
            flight_clock: Writer::new(flight_clock.clone()),
            environment: Writer::new(environment.clone()),
            power: Writer::new(power.clone()),
            radio: Writer::new(radio.clone()),
        };

        let store = Arc::new(Self {
            started: Instant::now(),
            flight_time_limit,
            fix,
            launch,
            phase,
            contained,
            flight_clock,
            environment,
            power,
            radio,
            termination: TerminationLatch::new(),
        });

        (store, writers)
    }

    /// Process start, the origin of the airborne failsafe.
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn flight_time_limit(&self) -> Duration {
        self.flight_time_limit
    }

    pub fn fix(&self) -> Fix {
        self.fix.read()
    }

    pub fn launch(&self) -> LaunchReference {
        self.launch.read()
    }

    pub fn phase(&self) -> PhaseStatus {
        self.phase.read()
    }

    pub fn contained(&self) -> bool {
        self.contained.read()
    }

    pub fn flight_clock(&self) -> FlightClock {
        self.flight_clock.read()
    }

    pub fn environment(&self) -> Environment {
        self.environment.read()
    }

    pub fn power(&self) -> PowerStatus {
        self.power.read()
    }

    pub fn radio(&self) -> RadioStats {
        self.radio.read()
    }

    pub fn termination(&self) -> &TerminationLatch {
        &self.termination
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            fix: self.fix(),
            launch: self.launch(),
            phase: self.phase(),
            contained: self.contained(),
            flight_clock: self.flight_clock(),
            environment: self.environment(),
            power: self.power(),
            radio: self.radio(),
            intact: self.termination.intact(),
            trigger: self.termination.cause(),
            flight_time_limit: self.flight_time_limit,
        }
    }
}

impl AirborneSignal for FlightStore {
    fn is_airborne(&self) -> bool {
        self.phase.read().airborne
    }
}
