//! # SABER Flight
//!
//! Onboard flight computer for a high-altitude balloon payload.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load and validate the TOML configuration
//!    - Set up console and rolling file logging
//!    - Find the GPS receiver (fatal if none answers)
//!    - Bring up the release servo, cutter relay, radio modem and sensors
//!      the hardware profile lists
//!
//! 2. **Flight**
//!    - All monitoring loops run concurrently until interrupted
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C waits for any termination sequence in progress, then stops
//!
//! # Examples
//!
//! ```bash
//! saber-flight config/default.toml
//! RUST_LOG=debug saber-flight /boot/saber.toml
//! ```

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use saber_flight::config::Config;
use saber_flight::mission::{Mission, Peripherals};
use saber_flight::serial::GpsSerial;

/// Configuration used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log to the console and to a daily file under `log_dir`
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(log_dir: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir).with_context(|| format!("creating log directory {}", log_dir))?;
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "saber-flight.log"));

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).with_context(|| format!("loading configuration from {}", config_path))?;
    let _log_guard = init_logging(&config.logging.log_dir)?;

    info!("SABER Flight v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Balloon {} in {}, flight time limit {:.2} h",
        config.mission.balloon_id, config.mission.test_area, config.mission.flight_time_limit_hours
    );

    let gps = GpsSerial::open_with_paths(
        &config.gps.ports,
        config.gps.baud_rate,
        Duration::from_millis(config.gps.probe_timeout_ms),
    )
    .await
    .context("no GPS receiver; cannot fly without a position source")?;
    info!("GPS receiver on {}", gps.device_path());

    let peripherals = Peripherals::from_config(&config.hardware, &config.telemetry);
    let mission = Mission::start(&config, gps, peripherals)?;
    info!("Press Ctrl+C to exit");

    mission.run_until_interrupted().await;
    Ok(())
}
