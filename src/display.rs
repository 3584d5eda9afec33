//! # Status Display
//!
//! Bench-test printout of the whole store, logged every display interval
//! while test mode is on. Never started for a real flight.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::state::{FlightStore, Snapshot};

fn or_dash(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", decimals, v))
}

/// Multi-line summary of a snapshot
pub fn render(snapshot: &Snapshot) -> String {
    let s = snapshot;
    let rule = "-".repeat(72);
    let gps_time = s.fix.utc_time.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
    let last_sent = s
        .radio
        .last_sent
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    [
        rule.clone(),
        format!(
            "GPS time: {:<12} Lat: {:<12.6} Lng: {:<12.6} Alt: {:.1} m",
            gps_time, s.fix.latitude, s.fix.longitude, s.fix.altitude_m
        ),
        format!(
            "GPS: {:<8} Sats: {:<3} Track: {:<6.1} Speed: {:.1} kt  {}",
            if s.fix.valid { "Valid" } else { "NO GPS" },
            s.fix.satellites,
            s.fix.course_deg,
            s.fix.speed_kt,
            s.fix.map_link()
        ),
        format!(
            "Flight: {:<9} Climbing: {:<6} Landed: {:<6} Geofence: {}",
            if s.phase.airborne { "Airborne" } else { "Ground" },
            s.phase.climbing,
            s.phase.landed,
            if s.contained { "Contained" } else { "OUTSIDE" }
        ),
        format!(
            "Flight time: {} s / {} s  Intact: {}  Trigger: {}",
            s.flight_clock.elapsed_s,
            s.flight_time_limit.as_secs(),
            s.intact,
            s.trigger
        ),
        format!(
            "Temp: {} °C  Humidity: {} %  Bus: {} V {} mA {} mW  Charge: {}",
            or_dash(s.environment.temperature_c, 1),
            or_dash(s.environment.humidity_pct, 1),
            or_dash(s.power.voltage_v, 1),
            or_dash(s.power.current_ma, 1),
            or_dash(s.power.power_mw, 0),
            or_dash(s.power.charge_fraction.map(|c| c * 100.0), 0)
        ),
        format!("Message: {}", s.radio.last_report.as_deref().unwrap_or("-")),
        format!(
            "Sent: {} (seq {})  Transmit time: {} s  Data rate: {} byte/s  Last: {}",
            s.radio.messages_sent,
            s.radio.sequence,
            or_dash(s.radio.tx_duration_s, 2),
            or_dash(s.radio.byte_rate, 2),
            last_sent
        ),
        format!(
            "Launch alt: {:.1} m (set: {})  Max alt: {:.1} m  Min alt: {:.1} m",
            s.launch.altitude_m, s.launch.set, s.phase.max_altitude_m, s.phase.min_altitude_m
        ),
        rule,
    ]
    .join("\n")
}

/// Log [`render`] output every `period`
pub async fn run(store: Arc<FlightStore>, period: Duration) {
    loop {
        info!("\n{}", render(&store.snapshot()));
        tokio::time::sleep(period).await;
    }
}
