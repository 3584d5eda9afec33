//! # APRS Object Report Encoder
//!
//! Builds the position report carried in every radio packet:
//!
//! ```text
//! ;SABER_11a*231235z3859.41N/10434.06WO084/022++Alt:20345.6m_95.3min^Intact><
//! │└─ name ─┘│└ time ┘└─ lat ─┘│└─ lon ──┘│└crs/spd┘└─────── comment ────────┘
//! │          └ * live, _ killed  └ table    └ symbol (balloon)
//! └ object report identifier
//! ```
//!
//! The packet on the air is the report followed by one sequence byte.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::state::Snapshot;

/// APRS data type identifier of an object report
pub const OBJECT_REPORT_ID: char = ';';
/// Fixed object name width
pub const OBJECT_NAME_LEN: usize = 9;
/// Primary symbol table
pub const SYMBOL_TABLE: char = '/';
/// Balloon symbol in the primary table
pub const SYMBOL_CODE: char = 'O';

/// Object name: prefix and balloon id, space-padded or cut to nine characters
///
/// # Examples
///
/// ```
/// use saber_flight::telemetry::report::object_name;
///
/// assert_eq!(object_name("SABER_", "11a"), "SABER_11a");
/// assert_eq!(object_name("SABER_", "7"), "SABER_7  ");
/// assert_eq!(object_name("SABER_", "1234"), "SABER_123");
/// ```
pub fn object_name(prefix: &str, balloon_id: &str) -> String {
    let name: String = prefix.chars().chain(balloon_id.chars()).take(OBJECT_NAME_LEN).collect();
    format!("{:<width$}", name, width = OBJECT_NAME_LEN)
}

/// Degrees and decimal minutes, e.g. `38.990173` -> `3859.41N`
pub fn encode_latitude(latitude: f64) -> String {
    encode_coordinate(latitude, 2, 'N', 'S')
}

/// Degrees and decimal minutes, e.g. `-104.5677` -> `10434.06W`
pub fn encode_longitude(longitude: f64) -> String {
    encode_coordinate(longitude, 3, 'E', 'W')
}

fn encode_coordinate(value: f64, degree_digits: usize, positive: char, negative: char) -> String {
    let hemisphere = if value >= 0.0 { positive } else { negative };
    let magnitude = value.abs();
    let mut degrees = magnitude.trunc() as u32;
    let mut hundredths = ((magnitude - f64::from(degrees)) * 6000.0).round() as u32;
    // 59.996' rounds up to a whole degree
    if hundredths >= 6000 {
        degrees += 1;
        hundredths -= 6000;
    }
    format!(
        "{:0width$}{:02}.{:02}{}",
        degrees,
        hundredths / 100,
        hundredths % 100,
        hemisphere,
        width = degree_digits
    )
}

/// Inverse of [`encode_latitude`] / [`encode_longitude`]
pub fn decode_coordinate(encoded: &str) -> Option<f64> {
    if !encoded.is_ascii() || encoded.len() < 7 {
        return None;
    }
    let (body, hemisphere) = encoded.split_at(encoded.len() - 1);
    let (degrees, minutes) = body.split_at(body.len() - 5);
    let value = degrees.parse::<f64>().ok()? + minutes.parse::<f64>().ok()? / 60.0;
    match hemisphere {
        "N" | "E" => Some(value),
        "S" | "W" => Some(-value),
        _ => None,
    }
}

/// Object report for the given snapshot
///
/// Day and time come from the GPS when it has supplied both, otherwise
/// both come from `now`.
pub fn build_report(name: &str, snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    let fix = &snapshot.fix;
    let (day, time) = match (fix.utc_date, fix.utc_time) {
        (Some(date), Some(time)) => (date.day(), time),
        _ => (now.day(), now.time()),
    };
    let marker = if snapshot.intact { '*' } else { '_' };
    let state = if snapshot.intact { "Intact" } else { "Killed" };
    let minutes = (snapshot.flight_clock.elapsed_s as f64 / 6.0).round() / 10.0;

    format!(
        "{id}{name}{marker}{day:02}{hour:02}{minute:02}z{lat}{table}{lon}{symbol}{course:03}/{speed:03}\
         ++Alt:{alt:.1}m_{minutes:.1}min^{state}>{cause}<",
        id = OBJECT_REPORT_ID,
        hour = time.hour(),
        minute = time.minute(),
        lat = encode_latitude(fix.latitude),
        table = SYMBOL_TABLE,
        lon = encode_longitude(fix.longitude),
        symbol = SYMBOL_CODE,
        course = fix.course_deg.max(0.0) as u32,
        speed = fix.speed_kt.max(0.0) as u32,
        alt = fix.altitude_m,
        cause = snapshot.trigger,
    )
}

/// Report bytes followed by the sequence byte
pub fn encode_packet(report: &str, sequence: u8) -> Bytes {
    let mut packet = BytesMut::with_capacity(report.len() + 1);
    packet.put_slice(report.as_bytes());
    packet.put_u8(sequence);
    packet.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FlightClock, Fix, FlightStore, TriggerCause};
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use std::time::Duration;

    fn snapshot() -> Snapshot {
        let (store, writers) = FlightStore::new(Duration::from_secs(7200));
        writers.fix.publish(Fix {
            latitude: 38.990173,
            longitude: -104.56765,
            altitude_m: 20345.6,
            speed_kt: 22.4,
            course_deg: 84.4,
            valid: true,
            utc_time: NaiveTime::from_hms_opt(12, 35, 19),
            utc_date: NaiveDate::from_ymd_opt(2025, 6, 3),
            ..Fix::default()
        });
        writers.flight_clock.publish(FlightClock {
            origin: None,
            elapsed_s: 5_718,
        });
        store.snapshot()
    }

    #[test]
    fn test_encode_latitude() {
        assert_eq!(encode_latitude(38.990173), "3859.41N");
        assert_eq!(encode_latitude(-33.5), "3330.00S");
        assert_eq!(encode_latitude(0.0), "0000.00N");
        // Rounding carries into the degrees
        assert_eq!(encode_latitude(38.99999), "3900.00N");
    }

    #[test]
    fn test_encode_longitude() {
        assert_eq!(encode_longitude(-104.56765), "10434.06W");
        assert_eq!(encode_longitude(11.51667), "01131.00E");
    }

    #[test]
    fn test_coordinate_round_trip_within_hundredth_minute() {
        let tolerance = 0.01 / 60.0 / 2.0 + 1e-9;
        for value in [38.990173_f64, -104.56765, 0.004, -0.5, 89.99, -179.999, 45.123456] {
            let lat_or_lon = if value.abs() <= 90.0 {
                encode_latitude(value)
            } else {
                encode_longitude(value)
            };
            let decoded = decode_coordinate(&lat_or_lon).unwrap();
            assert!((decoded - value).abs() <= tolerance, "{} -> {} -> {}", value, lat_or_lon, decoded);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_coordinate(""), None);
        assert_eq!(decode_coordinate("3859.41X"), None);
        assert_eq!(decode_coordinate("38x9.41N"), None);
    }

    #[test]
    fn test_build_report_intact() {
        let now = Utc.with_ymd_and_hms(2025, 6, 4, 0, 0, 0).unwrap();
        let report = build_report("SABER_11a", &snapshot(), now);
        assert_eq!(
            report,
            ";SABER_11a*031235z3859.41N/10434.06WO084/022++Alt:20345.6m_95.3min^Intact><"
        );
    }

    #[test]
    fn test_build_report_killed() {
        let (store, writers) = FlightStore::new(Duration::from_secs(7200));
        writers.fix.publish(snapshot().fix);
        assert!(store.termination().claim(TriggerCause::Geofencing));

        let now = Utc.with_ymd_and_hms(2025, 6, 4, 0, 0, 0).unwrap();
        let report = build_report("SABER_11a", &store.snapshot(), now);
        assert!(report.starts_with(";SABER_11a_03"));
        assert!(report.ends_with("min^Killed>Geofencing<"));
    }

    #[test]
    fn test_build_report_falls_back_to_system_clock() {
        let (store, _writers) = FlightStore::new(Duration::from_secs(7200));
        let now = Utc.with_ymd_and_hms(2025, 6, 9, 7, 5, 0).unwrap();
        let report = build_report("SABER_11a", &store.snapshot(), now);
        assert!(report.starts_with(";SABER_11a*090705z0000.00N/00000.00EO000/000"));
    }

    #[test]
    fn test_gps_time_without_date_uses_system_clock() {
        let (store, writers) = FlightStore::new(Duration::from_secs(7200));
        writers.fix.publish(Fix {
            utc_time: NaiveTime::from_hms_opt(23, 59, 58),
            utc_date: None,
            ..snapshot().fix
        });
        // Just after midnight: GPS 23:59:58 must not pair with the new day
        let now = Utc.with_ymd_and_hms(2025, 6, 4, 0, 0, 3).unwrap();
        let report = build_report("SABER_11a", &store.snapshot(), now);
        assert!(report.starts_with(";SABER_11a*040000z"));
    }

    #[test]
    fn test_encode_packet_appends_sequence() {
        let packet = encode_packet(";ABC", 0xFE);
        assert_eq!(&packet[..], b";ABC\xFE");
    }
}
