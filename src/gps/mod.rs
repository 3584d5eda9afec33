//! # Position Ingest
//!
//! Consumes NMEA sentences from the GPS receiver and folds them into the
//! store's [`Fix`] field.
//!
//! Writes are field-granular: an RMC sentence updates position, speed,
//! course, validity and time; a GGA sentence updates altitude and satellite
//! count. Empty fields leave their store field untouched and a sentence that
//! fails to decode changes nothing, so the previous fix survives.
//!
//! Decode failures are logged at most once per [`ERROR_REPORT_PERIOD`].

pub mod nmea;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::serial::GpsSerial;
use crate::state::{Fix, Writer};
use nmea::Sentence;

/// Minimum spacing between two logged decode errors
pub const ERROR_REPORT_PERIOD: Duration = Duration::from_secs(5);

/// Back-off after the GPS stream reports end-of-file or a read error
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Source of raw NMEA lines
#[async_trait]
pub trait NmeaSource: Send {
    /// Next line, `Ok(None)` at end of stream
    async fn next_line(&mut self) -> Result<Option<String>>;
}

#[async_trait]
impl NmeaSource for GpsSerial {
    async fn next_line(&mut self) -> Result<Option<String>> {
        GpsSerial::next_line(self).await
    }
}

/// Admits at most one report per period and counts what it swallowed.
#[derive(Debug, Clone)]
pub struct ErrorThrottle {
    period: Duration,
    last_report: Option<Instant>,
    suppressed: u64,
}

impl ErrorThrottle {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_report: None,
            suppressed: 0,
        }
    }

    /// `Some(n)` if a report is due now, `n` being how many were suppressed since the last one.
    pub fn admit(&mut self, now: Instant) -> Option<u64> {
        let due = self
            .last_report
            .map_or(true, |last| now.saturating_duration_since(last) >= self.period);
        if due {
            self.last_report = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }
}

/// Sole producer of the store's fix field
#[derive(Debug)]
pub struct PositionIngest {
    fix: Writer<Fix>,
    throttle: ErrorThrottle,
    had_lock: bool,
}

impl PositionIngest {
    pub fn new(fix: Writer<Fix>) -> Self {
        Self {
            fix,
            throttle: ErrorThrottle::new(ERROR_REPORT_PERIOD),
            had_lock: false,
        }
    }

    /// Decode one line and apply whatever fields it supplies.
    ///
    /// # Errors
    ///
    /// Returns the decode error; the store is left untouched in that case.
    pub fn ingest_line(&mut self, line: &str) -> Result<()> {
        match nmea::parse_sentence(line)? {
            Sentence::Rmc(rmc) => {
                let now = Instant::now();
                self.fix.modify(|fix| {
                    fix.valid = rmc.valid;
                    fix.received_at = Some(now);
                    if let (Some(lat), Some(lon)) = (rmc.latitude, rmc.longitude) {
                        fix.latitude = lat;
                        fix.longitude = lon;
                    }
                    if let Some(speed) = rmc.speed_kt {
                        fix.speed_kt = speed;
                    }
                    if let Some(course) = rmc.course_deg {
                        fix.course_deg = course;
                    }
                    // Time and date travel together; a time without a date
                    // clears the stale date
                    if rmc.time.is_some() {
                        fix.utc_time = rmc.time;
                        fix.utc_date = rmc.date;
                    }
                });
                self.note_lock(rmc.valid);
            }
            Sentence::Gga(gga) => {
                self.fix.modify(|fix| {
                    if let Some(altitude) = gga.altitude_m {
                        fix.altitude_m = altitude;
                    }
                    if let Some(satellites) = gga.satellites {
                        fix.satellites = satellites;
                    }
                });
            }
            Sentence::Other(address) => debug!("Ignoring {} sentence", address),
        }
        Ok(())
    }

    /// Like [`ingest_line`](Self::ingest_line) but logs failures through the throttle.
    pub fn handle_line(&mut self, line: &str) {
        if let Err(e) = self.ingest_line(line) {
            if let Some(suppressed) = self.throttle.admit(Instant::now()) {
                if suppressed > 0 {
                    warn!("GPS data error: {} ({} similar errors suppressed)", e, suppressed);
                } else {
                    warn!("GPS data error: {}", e);
                }
            }
        }
    }

    fn note_lock(&mut self, valid: bool) {
        if valid != self.had_lock {
            if valid {
                info!("GPS lock acquired");
            } else {
                warn!("GPS lock lost");
            }
            self.had_lock = valid;
        }
    }

    /// Read and ingest lines forever
    ///
    /// Read failures never end the task: they are logged through the
    /// throttle and the read is retried after a short delay.
    pub async fn run<S: NmeaSource>(mut self, mut source: S) {
        loop {
            match source.next_line().await {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => {
                    if self.throttle.admit(Instant::now()).is_some() {
                        error!("GPS stream ended, retrying");
                    }
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
                Err(e) => {
                    if self.throttle.admit(Instant::now()).is_some() {
                        error!("GPS read error: {}", e);
                    }
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            }
        }
    }
}
