//! Elapsed flight-time trigger.
//!
//! The flight clock starts the first time the vehicle is seen airborne and
//! never stops or resets. Once it passes the limit the trigger claims the
//! latch and runs the termination sequence.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::SharedSequence;
use crate::state::{AirborneSignal, FlightClock, FlightStore, TriggerCause, Writer};

/// Cadence of the time trigger
pub const CHECK_PERIOD: Duration = Duration::from_secs(5);

/// Sole producer of the store's flight clock
pub struct TimeTrigger {
    airborne: Arc<dyn AirborneSignal>,
    store: Arc<FlightStore>,
    clock: Writer<FlightClock>,
    limit: Duration,
    sequence: SharedSequence,
}

impl TimeTrigger {
    /// # Arguments
    ///
    /// * `airborne` - Airborne flag consulted before the clock starts
    /// * `store` - Holds the termination latch
    /// * `clock` - Writer for the store's flight clock
    /// * `sequence` - Actuation run by the winning trigger
    pub fn new(
        airborne: Arc<dyn AirborneSignal>,
        store: Arc<FlightStore>,
        clock: Writer<FlightClock>,
        sequence: SharedSequence,
    ) -> Self {
        let limit = store.flight_time_limit();
        Self {
            airborne,
            store,
            clock,
            limit,
            sequence,
        }
    }

    /// One check. Returns `true` if this call claimed the latch.
    pub async fn evaluate(&self, now: Instant) -> bool {
        let mut clock = self.clock.read();
        if clock.origin.is_none() && self.airborne.is_airborne() {
            info!("Flight clock started, limit {} min", self.limit.as_secs() / 60);
            clock.origin = Some(now);
        }
        let Some(origin) = clock.origin else {
            return false;
        };

        let elapsed = now.saturating_duration_since(origin);
        clock.elapsed_s = elapsed.as_secs();
        self.clock.publish(clock);

        if elapsed > self.limit && self.store.termination().claim(TriggerCause::Timing) {
            warn!(
                "Flight time {} s exceeds limit of {} s",
                elapsed.as_secs(),
                self.limit.as_secs()
            );
            self.sequence.actuate(TriggerCause::Timing).await;
            return true;
        }
        false
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(CHECK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let now = ticker.tick().await;
            self.evaluate(now).await;
        }
    }
}
