//! # Data Recorder
//!
//! Appends one CSV row per record interval to a per-flight file, for
//! analysis after recovery. The header goes in only while the file is empty,
//! so a restart mid-flight keeps appending to the same minute's file.

use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::Result;
use crate::state::{FlightStore, Snapshot};

/// Column names, in row order
pub const HEADER: &str = "wall_time,gps_time,latitude,longitude,altitude_m,course_deg,speed_kt,\
                          airborne,elapsed_s,contained,intact,trigger,\
                          temperature_c,humidity_pct,voltage_v,current_ma,power_mw,\
                          launch_alt_m,max_alt_m,min_alt_m,climbing,landed";

/// `<balloon_id>_flight_data_<DDMon_HHMM>.csv`
pub fn file_name(balloon_id: &str, started: DateTime<Local>) -> String {
    format!("{}_flight_data_{}.csv", balloon_id, started.format("%d%b_%H%M"))
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_default()
}

/// Write one data row for `snapshot`
pub fn write_row<W: Write>(writer: &mut W, wall_time: DateTime<Local>, snapshot: &Snapshot) -> io::Result<()> {
    let s = snapshot;
    writeln!(
        writer,
        "{},{},{:.5},{:.5},{:.1},{:.1},{:.1},\
         {},{},{},{},{},\
         {},{},{},{},{},\
         {:.1},{:.1},{:.1},{},{}",
        wall_time.format("%H:%M:%S"),
        s.fix.utc_time.map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_default(),
        s.fix.latitude,
        s.fix.longitude,
        s.fix.altitude_m,
        s.fix.course_deg,
        s.fix.speed_kt,
        s.phase.airborne,
        s.flight_clock.elapsed_s,
        s.contained,
        s.intact,
        s.trigger,
        optional(s.environment.temperature_c),
        optional(s.environment.humidity_pct),
        optional(s.power.voltage_v),
        optional(s.power.current_ma),
        optional(s.power.power_mw),
        s.launch.altitude_m,
        s.phase.max_altitude_m,
        s.phase.min_altitude_m,
        s.phase.climbing,
        s.phase.landed,
    )
}

/// Periodic CSV writer over the store
#[derive(Debug)]
pub struct FlightRecorder {
    path: PathBuf,
    store: Arc<FlightStore>,
    period: Duration,
}

impl FlightRecorder {
    /// Choose the file for this run inside `dir`, creating `dir` if needed
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn create<P: AsRef<Path>>(dir: P, balloon_id: &str, store: Arc<FlightStore>, period: Duration) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name(balloon_id, Local::now()));
        info!("Data record created: {}", path.display());
        Ok(Self { path, store, period })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is empty
    pub fn record(&self) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if empty {
            writeln!(writer, "{}", HEADER)?;
        }
        write_row(&mut writer, Local::now(), &self.store.snapshot())?;
        writer.flush()?;
        Ok(())
    }

    /// Record forever; a failed write is logged and retried next interval
    pub async fn run(self) {
        loop {
            if let Err(e) = self.record() {
                error!("CSV write error: {}", e);
            }
            tokio::time::sleep(self.period).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Fix, TriggerCause};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_file_name() {
        let started = Local.with_ymd_and_hms(2025, 6, 3, 9, 7, 0).unwrap();
        assert_eq!(file_name("11a", started), "11a_flight_data_03Jun_0907.csv");
    }

    #[test]
    fn test_header_has_every_column() {
        assert_eq!(HEADER.split(',').count(), 22);
        assert!(HEADER.starts_with("wall_time,gps_time,"));
        assert!(HEADER.ends_with(",climbing,landed"));
    }

    #[tokio::test]
    async fn test_row_matches_header() {
        let (store, writers) = FlightStore::new(Duration::from_secs(7200));
        writers.fix.publish(Fix {
            latitude: 38.99017,
            longitude: -104.56765,
            altitude_m: 1834.2,
            valid: true,
            utc_time: chrono::NaiveTime::from_hms_opt(18, 2, 9),
            ..Fix::default()
        });
        writers.power.modify(|p| p.voltage_v = Some(11.8));
        store.termination().claim(TriggerCause::Timing);

        let mut buf = Vec::new();
        let wall = Local.with_ymd_and_hms(2025, 6, 3, 12, 2, 9).unwrap();
        write_row(&mut buf, wall, &store.snapshot()).unwrap();
        let row = String::from_utf8(buf).unwrap();
        let fields: Vec<&str> = row.trim_end().split(',').collect();

        assert_eq!(fields.len(), 22);
        assert_eq!(fields[0], "12:02:09");
        assert_eq!(fields[1], "18:02:09");
        assert_eq!(fields[2], "38.99017");
        assert_eq!(fields[10], "false");
        assert_eq!(fields[11], "Timing");
        assert_eq!(fields[12], "");
        assert_eq!(fields[14], "11.8");
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let (store, _writers) = FlightStore::new(Duration::from_secs(7200));
        let recorder = FlightRecorder::create(dir.path().join("records"), "11a", store, Duration::from_secs(10)).unwrap();

        tokio_test::assert_ok!(recorder.record());
        tokio_test::assert_ok!(recorder.record());
        tokio_test::assert_ok!(recorder.record());

        let contents = fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER);
        assert_eq!(contents.matches("wall_time").count(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let (store, _writers) = FlightStore::new(Duration::from_secs(7200));
        let recorder = FlightRecorder::create(dir.path(), "11a", store, Duration::from_secs(10)).unwrap();
        // A directory where the file should be
        fs::create_dir(recorder.path()).unwrap();
        assert!(recorder.record().is_err());
    }
}
