//! # Mission
//!
//! Creates the flight store, hands each writer to its producing task and
//! spawns every loop the hardware profile calls for:
//!
//! | Task | Cadence | Produces |
//! |------|---------|----------|
//! | Position ingest | per sentence | fix |
//! | Launch calibrator | one-shot | launch reference |
//! | Phase monitor | 3 s | phase |
//! | Time trigger | 5 s | flight clock |
//! | Geofence trigger | 10 s | contained |
//! | Burst scheduler | update interval | radio stats (transmitter only) |
//! | Environment / electrical monitors | sensor interval | environment, power (when fitted) |
//! | Recorder | record interval | CSV rows |
//! | Status display | display interval | log output (test mode only) |
//!
//! Tasks run until the process is interrupted. Shutdown lets an actuation
//! sequence in progress finish first.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{Config, HardwareConfig, TelemetryConfig};
use crate::display;
use crate::error::Result;
use crate::flight::{LaunchCalibrator, PhaseDetector, PhaseMonitor};
use crate::gps::{NmeaSource, PositionIngest};
use crate::recorder::FlightRecorder;
use crate::sensors::{
    ElectricalMonitor, EnvironmentMonitor, EnvironmentalSensor, HwmonPowerMonitor, IioEnvironmentalSensor,
    PowerMonitor,
};
use crate::state::{AirborneSignal, FlightStore, StoreWriters};
use crate::telemetry::report::object_name;
use crate::telemetry::{BurstSchedule, BurstScheduler, RadioLink, SerialModem, TelemetryHandle};
use crate::termination::hardware::{GpioRelay, PwmServo};
use crate::termination::{
    ActuationTiming, Cutter, Geofence, GeofenceTrigger, ReleaseMechanism, SharedSequence, TerminationSequence,
    TimeTrigger,
};

/// Hardware handed to the mission. Absent entries are not fitted.
pub struct Peripherals {
    pub release: Option<Box<dyn ReleaseMechanism>>,
    pub cutter: Box<dyn Cutter>,
    pub radio: Option<Box<dyn RadioLink>>,
    pub environmental: Option<Box<dyn EnvironmentalSensor>>,
    pub power: Option<Box<dyn PowerMonitor>>,
}

impl Peripherals {
    /// Linux drivers for everything the hardware profile says is fitted
    ///
    /// Peripheral faults here are logged, never fatal: the release servo is
    /// parked closed, the cutter switched off, and a modem that will not open
    /// leaves the flight without position reports.
    pub fn from_config(hardware: &HardwareConfig, telemetry: &TelemetryConfig) -> Self {
        let profile = hardware.profile();
        info!(
            "Hardware profile: transmitter={} servo={} environment={} power={}",
            profile.has_transmitter,
            profile.has_release_servo,
            profile.has_environmental_sensor,
            profile.has_power_monitor
        );

        let release = profile.has_release_servo.then(|| {
            let servo = PwmServo::new(&hardware.servo_pwm_dir);
            if let Err(e) = servo.init() {
                error!("Servo init failed: {}", e);
            }
            Box::new(servo) as Box<dyn ReleaseMechanism>
        });

        let cutter = GpioRelay::new(&hardware.cutter_gpio, hardware.cutter_active_high);
        if let Err(e) = cutter.deenergize() {
            error!("Cutter init failed: {}", e);
        }

        let radio = if profile.has_transmitter {
            match SerialModem::open(&telemetry.modem_port, telemetry.modem_baud_rate) {
                Ok(modem) => {
                    info!("Radio modem opened at {}", modem.device_path());
                    Some(Box::new(modem) as Box<dyn RadioLink>)
                }
                Err(e) => {
                    error!("Radio modem unavailable, flying without position reports: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let environmental = profile
            .has_environmental_sensor
            .then(|| Box::new(IioEnvironmentalSensor::new(&hardware.iio_dir)) as Box<dyn EnvironmentalSensor>);
        let power = profile
            .has_power_monitor
            .then(|| Box::new(HwmonPowerMonitor::new(&hardware.hwmon_dir)) as Box<dyn PowerMonitor>);

        Self {
            release,
            cutter: Box::new(cutter),
            radio,
            environmental,
            power,
        }
    }
}

/// Running flight: the store, the shared actuation and every task
pub struct Mission {
    store: Arc<FlightStore>,
    sequence: SharedSequence,
    tasks: JoinSet<()>,
}

impl Mission {
    /// Spawn all tasks. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the geofence cannot be loaded or the record
    /// directory cannot be created.
    pub fn start<S: NmeaSource + 'static>(config: &Config, gps: S, peripherals: Peripherals) -> Result<Self> {
        let fence = Geofence::from_config(&config.geofence)?;
        info!(
            "Geofence: {} with {} stay-in and {} keep-out polygons",
            config.mission.test_area,
            fence.stay_in_count(),
            fence.keep_out_count()
        );

        let (store, writers) = FlightStore::new(config.mission.flight_time_limit());
        let StoreWriters {
            fix,
            launch,
            phase,
            contained,
            flight_clock,
            environment,
            power,
            radio,
        } = writers;

        let recorder = FlightRecorder::create(
            &config.logging.record_dir,
            &config.mission.balloon_id,
            store.clone(),
            Duration::from_secs(config.intervals.record_s),
        )?;

        let telemetry = peripherals.radio.map(|link| {
            let name = object_name(&config.telemetry.object_prefix, &config.mission.balloon_id);
            info!("Reporting as APRS object '{}'", name);
            TelemetryHandle::new(store.clone(), radio, link, name)
        });

        let sequence: SharedSequence = Arc::new(TerminationSequence::new(
            peripherals.release,
            peripherals.cutter,
            telemetry.clone(),
            ActuationTiming::from_config(&config.termination),
        ));

        let stale_after = Duration::from_secs(config.gps.stale_after_s);
        let sensor_period = Duration::from_secs(config.intervals.sensor_s);
        let airborne: Arc<dyn AirborneSignal> = store.clone();
        let mut tasks = JoinSet::new();

        tasks.spawn(PositionIngest::new(fix).run(gps));

        let calibrator = LaunchCalibrator::new(store.clone(), launch, config.mission.test_mode);
        tasks.spawn(async move {
            calibrator.run().await;
        });

        let detector = PhaseDetector::new(
            config.mission.airborne_delta_m,
            Duration::from_secs(config.mission.airborne_failsafe_s),
        );
        tasks.spawn(PhaseMonitor::new(detector, store.clone(), phase, stale_after).run());

        tasks.spawn(TimeTrigger::new(airborne.clone(), store.clone(), flight_clock, sequence.clone()).run());
        tasks.spawn(
            GeofenceTrigger::new(fence, airborne, store.clone(), contained, stale_after, sequence.clone()).run(),
        );

        if let Some(handle) = telemetry {
            tasks.spawn(BurstScheduler::new(handle, BurstSchedule::from_config(&config.telemetry)).run());
        }
        if let Some(sensor) = peripherals.environmental {
            tasks.spawn(EnvironmentMonitor::new(sensor, environment, sensor_period).run());
        }
        if let Some(meter) = peripherals.power {
            tasks.spawn(
                ElectricalMonitor::new(
                    meter,
                    power,
                    sensor_period,
                    config.power.voltage_empty,
                    config.power.voltage_full,
                )
                .run(),
            );
        }

        tasks.spawn(recorder.run());

        if config.mission.test_mode {
            warn!("Test mode is ACTIVE: disable it before flight");
            tasks.spawn(display::run(store.clone(), Duration::from_secs(config.intervals.display_s)));
        }

        info!("Mission started with {} tasks", tasks.len());
        Ok(Self { store, sequence, tasks })
    }

    pub fn store(&self) -> &Arc<FlightStore> {
        &self.store
    }

    /// Run until Ctrl+C, then shut down
    pub async fn run_until_interrupted(mut self) {
        let mut listening = true;
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c(), if listening => match signal {
                    Ok(()) => break,
                    Err(e) => {
                        error!("Cannot listen for Ctrl+C, running until killed: {}", e);
                        listening = false;
                    }
                },
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(()) => debug!("Task finished"),
                    Err(e) => error!("Task failed: {}", e),
                },
                else => std::future::pending::<()>().await,
            }
        }
        info!("Shutdown requested");
        self.shutdown().await;
    }

    /// Stop every task, completing a claimed termination first
    pub async fn shutdown(mut self) {
        self.sequence.wait_idle().await;
        self.tasks.shutdown().await;

        // A claim whose sequence was cut short still gets a full run
        let latch = self.store.termination();
        if !latch.intact() && self.sequence.runs().await == 0 {
            warn!("Termination ({}) claimed but not completed, running it now", latch.cause());
            self.sequence.actuate(latch.cause()).await;
        }
        info!("Flight computer stopped");
    }
}
