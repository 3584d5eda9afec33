//! # Telemetry Module
//!
//! Position reports over the radio link.
//!
//! This module handles:
//! - Building the APRS object report from a store snapshot ([`report`])
//! - Framing and sending packets through a [`RadioLink`] ([`radio`])
//! - Maintaining the sequence counter and transmit statistics
//! - Sending bursts of reports on a fixed schedule ([`BurstScheduler`])
//!
//! The transmitter is shared between the scheduler and the termination
//! sequence through a cloneable [`TelemetryHandle`]; sends are serialized so
//! the sequence byte is never reused.

pub mod radio;
pub mod report;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::state::{FlightStore, RadioStats, Writer};
pub use radio::{RadioLink, SerialModem, TxReceipt};

/// Owner of the radio and of the store's radio statistics
struct Transmitter {
    store: Arc<FlightStore>,
    stats: Writer<RadioStats>,
    link: Box<dyn RadioLink>,
    object_name: String,
}

impl Transmitter {
    async fn send_report(&mut self) -> Result<()> {
        let snapshot = self.store.snapshot();
        let report = report::build_report(&self.object_name, &snapshot, Utc::now());
        let packet = report::encode_packet(&report, snapshot.radio.sequence);

        let receipt = self.link.transmit(&packet).await?;

        self.stats.modify(|stats| {
            stats.sequence = stats.sequence.wrapping_add(1);
            stats.messages_sent += 1;
            stats.last_sent = Some(Utc::now());
            stats.tx_duration_s = Some(receipt.duration.as_secs_f64());
            stats.byte_rate = receipt.byte_rate;
            stats.last_report = Some(report);
        });
        Ok(())
    }
}

/// Cloneable access to the transmitter
#[derive(Clone)]
pub struct TelemetryHandle {
    inner: Arc<Mutex<Transmitter>>,
}

impl TelemetryHandle {
    /// # Arguments
    ///
    /// * `store` - Snapshot source for every report
    /// * `stats` - Writer for the store's radio statistics
    /// * `link` - Radio the packets go out on
    /// * `object_name` - Nine-character APRS object name
    pub fn new(store: Arc<FlightStore>, stats: Writer<RadioStats>, link: Box<dyn RadioLink>, object_name: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Transmitter {
                store,
                stats,
                link,
                object_name,
            })),
        }
    }

    /// Build a report from the current state and transmit it
    ///
    /// The sequence counter advances only when the link accepted the packet.
    ///
    /// # Errors
    ///
    /// Returns the link's error; statistics are left untouched in that case.
    pub async fn send_report(&self) -> Result<()> {
        self.inner.lock().await.send_report().await
    }
}

/// Burst transmission timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstSchedule {
    /// Identical-content messages per burst
    pub count: u32,
    /// Pause after each message
    pub spacing: Duration,
    /// Pause after each burst
    pub interval: Duration,
}

impl BurstSchedule {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            count: config.burst_count,
            spacing: config.burst_spacing(),
            interval: config.update_interval(),
        }
    }
}

/// Periodic burst sender
pub struct BurstScheduler {
    handle: TelemetryHandle,
    schedule: BurstSchedule,
}

impl BurstScheduler {
    pub fn new(handle: TelemetryHandle, schedule: BurstSchedule) -> Self {
        Self { handle, schedule }
    }

    /// Send one burst. Returns how many messages went out.
    pub async fn send_burst(&self) -> u32 {
        let mut sent = 0;
        for _ in 0..self.schedule.count {
            match self.handle.send_report().await {
                Ok(()) => sent += 1,
                Err(e) => error!("Transmit error: {}", e),
            }
            tokio::time::sleep(self.schedule.spacing).await;
        }
        sent
    }

    /// Burst, wait, repeat. Transmit failures never stop the schedule.
    pub async fn run(self) {
        info!(
            "Position reports: {} messages {} s apart every {} min",
            self.schedule.count,
            self.schedule.spacing.as_secs(),
            self.schedule.interval.as_secs() / 60
        );
        loop {
            let sent = self.send_burst().await;
            info!("Burst complete: {}/{} messages sent", sent, self.schedule.count);
            tokio::time::sleep(self.schedule.interval).await;
        }
    }
}
