//! # NMEA Sentence Decoder
//!
//! Decodes the two sentences the flight computer cares about:
//!
//! | Sentence | Supplies |
//! |----------|----------|
//! | `RMC` | status (A/V), latitude, longitude, speed (kt), course, UTC time, date |
//! | `GGA` | satellites, altitude (m MSL) |
//!
//! Any talker prefix is accepted (`$GPRMC`, `$GNRMC`, ...). A trailing `*hh`
//! checksum is verified when present. Empty fields decode to `None` so the
//! caller can leave the matching store field alone.

use chrono::{NaiveDate, NaiveTime};

use crate::error::{FlightError, Result};

/// Recommended minimum data
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rmc {
    /// Status `A`; `V` means the receiver has no usable fix
    pub valid: bool,
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_kt: Option<f64>,
    pub course_deg: Option<f64>,
    pub date: Option<NaiveDate>,
}

/// Fix data. Position and time come from RMC, so only the rest is kept.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gga {
    pub satellites: Option<u8>,
    pub altitude_m: Option<f64>,
}

/// One decoded sentence
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Rmc(Rmc),
    Gga(Gga),
    /// Well-formed but not used (GSV, VTG, ...)
    Other(String),
}

/// XOR checksum over everything between `$` and `*`
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Check the `*hh` suffix of a sentence. Sentences without one pass.
pub fn validate_checksum(line: &str) -> bool {
    let body = line.trim().trim_start_matches('$');
    match body.split_once('*') {
        None => true,
        Some((payload, hex)) => u8::from_str_radix(hex.trim(), 16)
            .map(|provided| provided == checksum(payload))
            .unwrap_or(false),
    }
}

/// Decode one sentence
///
/// # Errors
///
/// Returns `FlightError::Nmea` for a missing `$`, a checksum mismatch, a
/// truncated RMC/GGA sentence, or an unparsable numeric field.
///
/// # Examples
///
/// ```
/// use saber_flight::gps::nmea::{parse_sentence, Sentence};
///
/// let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
/// match parse_sentence(gga).unwrap() {
///     Sentence::Gga(fix) => assert_eq!(fix.altitude_m, Some(545.4)),
///     _ => unreachable!(),
/// }
/// ```
pub fn parse_sentence(line: &str) -> Result<Sentence> {
    let line = line.trim();
    let Some(body) = line.strip_prefix('$') else {
        return Err(FlightError::Nmea(format!("missing '$' in {:?}", line)));
    };

    if !validate_checksum(line) {
        return Err(FlightError::Nmea(format!("checksum mismatch in {:?}", line)));
    }

    let payload = body.split_once('*').map_or(body, |(payload, _)| payload);
    let fields: Vec<&str> = payload.split(',').collect();
    let address = fields[0];
    if address.len() < 5 || !address.is_ascii() {
        return Err(FlightError::Nmea(format!("bad address field {:?}", address)));
    }

    match &address[address.len() - 3..] {
        "RMC" => parse_rmc(&fields).map(Sentence::Rmc),
        "GGA" => parse_gga(&fields).map(Sentence::Gga),
        _ => Ok(Sentence::Other(address.to_string())),
    }
}

fn parse_rmc(fields: &[&str]) -> Result<Rmc> {
    if fields.len() < 10 {
        return Err(FlightError::Nmea(format!("RMC has {} fields, expected at least 10", fields.len())));
    }

    Ok(Rmc {
        valid: fields[2] == "A",
        time: parse_time(fields[1])?,
        latitude: parse_coordinate(fields[3], fields[4])?.map(|v| round_to(v, 5)),
        longitude: parse_coordinate(fields[5], fields[6])?.map(|v| round_to(v, 5)),
        speed_kt: parse_number(fields[7])?.map(|v| round_to(v, 1)),
        course_deg: parse_number(fields[8])?.map(|v| round_to(v, 1)),
        date: parse_date(fields[9])?,
    })
}

fn parse_gga(fields: &[&str]) -> Result<Gga> {
    if fields.len() < 10 {
        return Err(FlightError::Nmea(format!("GGA has {} fields, expected at least 10", fields.len())));
    }

    Ok(Gga {
        satellites: parse_number(fields[7])?.map(|v| v as u8),
        altitude_m: parse_number(fields[9])?.map(|v| round_to(v, 1)),
    })
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees
fn parse_coordinate(raw: &str, hemisphere: &str) -> Result<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if !raw.is_ascii() {
        return Err(FlightError::Nmea(format!("bad coordinate {:?}", raw)));
    }

    let dot = raw.find('.').unwrap_or(raw.len());
    if dot < 3 {
        return Err(FlightError::Nmea(format!("bad coordinate {:?}", raw)));
    }

    let degrees: f64 = raw[..dot - 2]
        .parse()
        .map_err(|_| FlightError::Nmea(format!("bad coordinate degrees {:?}", raw)))?;
    let minutes: f64 = raw[dot - 2..]
        .parse()
        .map_err(|_| FlightError::Nmea(format!("bad coordinate minutes {:?}", raw)))?;
    let value = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Ok(Some(value)),
        "S" | "W" => Ok(Some(-value)),
        other => Err(FlightError::Nmea(format!("bad hemisphere {:?}", other))),
    }
}

fn parse_number(raw: &str) -> Result<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| FlightError::Nmea(format!("bad number {:?}", raw)))
}

/// `hhmmss` with optional fractional seconds, which are dropped
fn parse_time(raw: &str) -> Result<Option<NaiveTime>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let digits = raw.get(..6).filter(|d| d.bytes().all(|b| b.is_ascii_digit()));
    let time = digits.and_then(|d| {
        let h = d[0..2].parse().ok()?;
        let m = d[2..4].parse().ok()?;
        let s = d[4..6].parse().ok()?;
        NaiveTime::from_hms_opt(h, m, s)
    });
    time.map(Some)
        .ok_or_else(|| FlightError::Nmea(format!("bad time {:?}", raw)))
}

/// `ddmmyy`, years taken as 20yy
fn parse_date(raw: &str) -> Result<Option<NaiveDate>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let date = (raw.len() == 6 && raw.bytes().all(|b| b.is_ascii_digit()))
        .then(|| {
            let d = raw[0..2].parse().ok()?;
            let m = raw[2..4].parse().ok()?;
            let y: i32 = raw[4..6].parse().ok()?;
            NaiveDate::from_ymd_opt(2000 + y, m, d)
        })
        .flatten();
    date.map(Some)
        .ok_or_else(|| FlightError::Nmea(format!("bad date {:?}", raw)))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn test_validate_checksum() {
        assert!(validate_checksum(GGA));
        assert!(validate_checksum(RMC));
        assert!(!validate_checksum("$GPGGA,123519,4807.038,N*00"));
        assert!(validate_checksum("$GPGGA,123519"));
    }

    #[test]
    fn test_parse_gga() {
        let Sentence::Gga(gga) = parse_sentence(GGA).unwrap() else {
            panic!("expected GGA");
        };
        assert_eq!(gga.satellites, Some(8));
        assert_eq!(gga.altitude_m, Some(545.4));
    }

    #[test]
    fn test_parse_rmc() {
        let Sentence::Rmc(rmc) = parse_sentence(RMC).unwrap() else {
            panic!("expected RMC");
        };
        assert!(rmc.valid);
        assert_eq!(rmc.speed_kt, Some(22.4));
        assert_eq!(rmc.course_deg, Some(84.4));
        assert_eq!(rmc.date, NaiveDate::from_ymd_opt(2094, 3, 23));
        assert_eq!(rmc.latitude, Some(48.1173));
    }

    #[test]
    fn test_parse_rmc_void_with_empty_fields() {
        let line = "$GNRMC,,V,,,,,,,,,,N";
        let Sentence::Rmc(rmc) = parse_sentence(line).unwrap() else {
            panic!("expected RMC");
        };
        assert!(!rmc.valid);
        assert_eq!(rmc.latitude, None);
        assert_eq!(rmc.speed_kt, None);
        assert_eq!(rmc.time, None);
    }

    #[test]
    fn test_southern_western_hemispheres() {
        let line = "$GPRMC,010203,A,3859.4104,S,10434.0589,W,0.0,,,,";
        let Sentence::Rmc(rmc) = parse_sentence(line).unwrap() else {
            panic!("expected RMC");
        };
        assert_eq!(rmc.latitude, Some(-38.99017));
        assert_eq!(rmc.longitude, Some(-104.56765));
        assert_eq!(rmc.course_deg, None);
    }

    #[test]
    fn test_other_sentence_passes_through() {
        let line = "$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00";
        assert_eq!(parse_sentence(line).unwrap(), Sentence::Other("GPGSV".to_string()));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_sentence("").is_err());
        assert!(parse_sentence("GPGGA,123519").is_err());
        assert!(parse_sentence("$GPGGA,123519,4807.038,N*00").is_err());
        assert!(parse_sentence("$GPRMC,123519,A").is_err());
        assert!(parse_sentence("$GPRMC,123519,A,48x7.038,N,01131.000,E,022.4,084.4,230394").is_err());
        assert!(parse_sentence("$GPRMC,123519,A,4807.038,Q,01131.000,E,022.4,084.4,230394").is_err());
        assert!(parse_sentence("$GPRMC,99,A,4807.038,N,01131.000,E,022.4,084.4,230394").is_err());
    }

    #[test]
    fn test_rejects_non_ascii_coordinates() {
        let rmc = "$GPRMC,123519,A,\u{e9}7.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
        assert!(matches!(parse_sentence(rmc), Err(FlightError::Nmea(_))));
        let rmc = "$GPRMC,123519,A,4807.038,N,011\u{b0}31.000,E,022.4,084.4,230394,003.1,W";
        assert!(matches!(parse_sentence(rmc), Err(FlightError::Nmea(_))));
    }
}
