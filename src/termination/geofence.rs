//! # Geofence
//!
//! The operational boundary and the trigger that terminates the flight when
//! the vehicle leaves it.
//!
//! Containment uses ray casting in plain latitude/longitude, which is fine
//! for boundaries a few hundred kilometres across away from the poles and
//! the antimeridian. A point exactly on an edge may land on either side.
//!
//! Polygons come from the `[geofence]` config section or from a JSON file:
//!
//! ```json
//! {
//!   "stay_in": [ { "id": "oparea-2", "polygon": [[41.01, -102.9], [37.01, -102.9], [37.01, -109.05]] } ],
//!   "keep_out": [ { "id": "r-2601", "polygon": [[38.7, -104.9], [38.7, -104.6], [38.9, -104.6]] } ]
//! }
//! ```
//!
//! The vehicle is contained while it is inside any stay-in polygon and
//! inside no keep-out polygon.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::SharedSequence;
use crate::config::GeofenceConfig;
use crate::error::{FlightError, Result};
use crate::state::{AirborneSignal, FlightStore, TriggerCause, Writer};

/// Cadence of the geofence trigger
pub const CHECK_PERIOD: Duration = Duration::from_secs(10);
/// Wait before confirming an outside observation
pub const DEBOUNCE: Duration = Duration::from_secs(10);

/// Closed ring of at least three `[lat, lon]` vertices
#[derive(Debug, Clone, PartialEq)]
struct Polygon {
    vertices: Vec<[f64; 2]>,
}

impl Polygon {
    fn new(vertices: Vec<[f64; 2]>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(FlightError::Geofence(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if let Some([lat, lon]) = vertices
            .iter()
            .find(|[lat, lon]| !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon))
        {
            return Err(FlightError::Geofence(format!("vertex ({}, {}) out of range", lat, lon)));
        }
        Ok(Self { vertices })
    }

    /// Ray casting
    fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        for i in 0..n {
            let [x1, y1] = self.vertices[i];
            let [x2, y2] = self.vertices[(i + 1) % n];
            if (longitude < y2) != (longitude < y1) && latitude < x1 + (longitude - y1) / (y2 - y1) * (x2 - x1) {
                inside = !inside;
            }
        }
        inside
    }
}

/// Operational boundary: one or more stay-in polygons, minus any keep-out
/// polygons
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    stay_in: Vec<Polygon>,
    keep_out: Vec<Polygon>,
}

#[derive(Debug, Deserialize)]
struct GeofenceFile {
    #[serde(default)]
    stay_in: Vec<PolygonRule>,
    #[serde(default)]
    keep_out: Vec<PolygonRule>,
}

#[derive(Debug, Deserialize)]
struct PolygonRule {
    #[serde(default)]
    id: Option<String>,
    polygon: Vec<[f64; 2]>,
}

impl Geofence {
    /// Single stay-in polygon
    ///
    /// # Errors
    ///
    /// Returns `FlightError::Geofence` for fewer than three vertices or a
    /// vertex outside valid latitude/longitude ranges.
    pub fn new(vertices: Vec<[f64; 2]>) -> Result<Self> {
        Self::with_rules(vec![vertices], Vec::new())
    }

    /// # Errors
    ///
    /// Returns `FlightError::Geofence` when there is no stay-in polygon or
    /// any polygon is invalid.
    pub fn with_rules(stay_in: Vec<Vec<[f64; 2]>>, keep_out: Vec<Vec<[f64; 2]>>) -> Result<Self> {
        if stay_in.is_empty() {
            return Err(FlightError::Geofence("no stay_in polygon".to_string()));
        }
        Ok(Self {
            stay_in: stay_in.into_iter().map(Polygon::new).collect::<Result<_>>()?,
            keep_out: keep_out.into_iter().map(Polygon::new).collect::<Result<_>>()?,
        })
    }

    /// Every `stay_in` and `keep_out` rule of a JSON geofence file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, has no
    /// `stay_in` polygon, or a polygon is invalid.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let file: GeofenceFile = serde_json::from_str(&contents)
            .map_err(|e| FlightError::Geofence(format!("{}: {}", path.display(), e)))?;

        for (kind, rules) in [("stay_in", &file.stay_in), ("keep_out", &file.keep_out)] {
            for rule in rules {
                info!(
                    "Geofence {} rule {} ({} vertices)",
                    kind,
                    rule.id.as_deref().unwrap_or("unnamed"),
                    rule.polygon.len()
                );
            }
        }
        let polygons = |rules: Vec<PolygonRule>| -> Vec<Vec<[f64; 2]>> { rules.into_iter().map(|rule| rule.polygon).collect() };
        Self::with_rules(polygons(file.stay_in), polygons(file.keep_out))
            .map_err(|e| FlightError::Geofence(format!("{}: {}", path.display(), e)))
    }

    /// Polygon named by the config: the JSON file if set, else the inline vertices
    pub fn from_config(config: &GeofenceConfig) -> Result<Self> {
        match &config.file {
            Some(path) => Self::load_json(path),
            None => Self::new(config.vertices.clone()),
        }
    }

    pub fn stay_in_count(&self) -> usize {
        self.stay_in.len()
    }

    pub fn keep_out_count(&self) -> usize {
        self.keep_out.len()
    }

    /// Inside at least one stay-in polygon and outside every keep-out polygon
    ///
    /// # Examples
    ///
    /// ```
    /// use saber_flight::termination::Geofence;
    ///
    /// let fence = Geofence::new(vec![[41.0, -109.0], [41.0, -102.0], [37.0, -102.0], [37.0, -109.0]]).unwrap();
    /// assert!(fence.contains(39.0, -105.0));
    /// assert!(!fence.contains(42.0, -105.0));
    /// ```
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.stay_in.iter().any(|p| p.contains(latitude, longitude))
            && !self.keep_out.iter().any(|p| p.contains(latitude, longitude))
    }
}

/// Sole producer of the store's `contained` flag
pub struct GeofenceTrigger {
    fence: Geofence,
    airborne: Arc<dyn AirborneSignal>,
    store: Arc<FlightStore>,
    contained: Writer<bool>,
    stale_after: Duration,
    sequence: SharedSequence,
}

impl GeofenceTrigger {
    pub fn new(
        fence: Geofence,
        airborne: Arc<dyn AirborneSignal>,
        store: Arc<FlightStore>,
        contained: Writer<bool>,
        stale_after: Duration,
        sequence: SharedSequence,
    ) -> Self {
        Self {
            fence,
            airborne,
            store,
            contained,
            stale_after,
            sequence,
        }
    }

    /// Containment of the current fix, published to the store.
    /// `None` when the fix is not usable.
    fn observe(&self) -> Option<bool> {
        let fix = self.store.fix();
        let contained = self.fence.contains(fix.latitude, fix.longitude);
        self.contained.publish(contained);
        fix.is_usable(tokio::time::Instant::now(), self.stale_after)
            .then_some(contained)
    }

    /// One check, including the debounce wait. Returns `true` if this call
    /// claimed the latch.
    pub async fn evaluate(&self) -> bool {
        let first = self.observe();
        if first != Some(false) || !self.airborne.is_airborne() {
            return false;
        }

        let fix = self.store.fix();
        warn!(
            "Outside geofence at {:.5}, {:.5}; rechecking in {} s",
            fix.latitude,
            fix.longitude,
            DEBOUNCE.as_secs()
        );
        tokio::time::sleep(DEBOUNCE).await;

        match self.observe() {
            Some(false) => {}
            Some(true) => {
                info!("Back inside geofence, no action");
                return false;
            }
            None => {
                debug!("Fix unusable on recheck, no action");
                return false;
            }
        }

        if self.store.termination().claim(TriggerCause::Geofencing) {
            warn!("Geofence breach confirmed");
            self.sequence.actuate(TriggerCause::Geofencing).await;
            return true;
        }
        false
    }

    pub async fn run(self) {
        loop {
            self.evaluate().await;
            tokio::time::sleep(CHECK_PERIOD).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Fix;
    use crate::termination::tests::permissive_sequence;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::time::Instant;

    const INSIDE: (f64, f64) = (39.0, -105.0);
    const OUTSIDE: (f64, f64) = (42.0, -105.0);

    fn colorado() -> Geofence {
        Geofence::new(vec![
            [41.01, -102.9],
            [37.01, -102.9],
            [37.01, -109.05],
            [41.01, -109.05],
        ])
        .unwrap()
    }

    fn fix_at((latitude, longitude): (f64, f64)) -> Fix {
        Fix {
            latitude,
            longitude,
            valid: true,
            received_at: Some(Instant::now()),
            ..Fix::default()
        }
    }

    #[test]
    fn test_contains_convex() {
        let fence = colorado();
        assert!(fence.contains(INSIDE.0, INSIDE.1));
        assert!(!fence.contains(OUTSIDE.0, OUTSIDE.1));
        assert!(!fence.contains(39.0, -110.0));
        assert!(!fence.contains(0.0, 0.0));
    }

    #[test]
    fn test_contains_concave() {
        // U shape open to the north
        let fence = Geofence::new(vec![
            [0.0, 0.0],
            [0.0, 3.0],
            [3.0, 3.0],
            [3.0, 2.0],
            [1.0, 2.0],
            [1.0, 1.0],
            [3.0, 1.0],
            [3.0, 0.0],
        ])
        .unwrap();
        assert!(fence.contains(2.0, 0.5));
        assert!(fence.contains(0.5, 1.5));
        assert!(!fence.contains(2.0, 1.5));
    }

    #[test]
    fn test_rejects_degenerate_polygons() {
        assert!(Geofence::new(vec![[0.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(Geofence::new(vec![[0.0, 0.0], [1.0, 1.0], [91.0, 0.0]]).is_err());
    }

    #[test]
    fn test_load_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stay_in": [{{"id": "oparea", "polygon": [[41.0, -109.0], [41.0, -102.0], [37.0, -102.0], [37.0, -109.0]]}}]}}"#
        )
        .unwrap();

        let fence = Geofence::load_json(file.path()).unwrap();
        assert_eq!(fence.stay_in_count(), 1);
        assert_eq!(fence.keep_out_count(), 0);
        assert!(fence.contains(INSIDE.0, INSIDE.1));
    }

    #[test]
    fn test_load_json_keep_out_excludes_airspace() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "stay_in": [{{"id": "colorado", "polygon": [[41.01, -102.9], [37.01, -102.9], [37.01, -109.05], [41.01, -109.05]]}}],
                "keep_out": [{{"id": "range", "polygon": [[38.0, -106.0], [38.0, -104.0], [40.0, -104.0], [40.0, -106.0]]}}]
            }}"#
        )
        .unwrap();

        let fence = Geofence::load_json(file.path()).unwrap();
        assert_eq!(fence.keep_out_count(), 1);
        assert!(!fence.contains(39.0, -105.0));
        assert!(fence.contains(39.0, -108.0));
        assert!(!fence.contains(OUTSIDE.0, OUTSIDE.1));
    }

    #[test]
    fn test_load_json_any_stay_in_contains() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stay_in": [
                {{"id": "west", "polygon": [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]]}},
                {{"id": "east", "polygon": [[0.0, 5.0], [0.0, 6.0], [1.0, 6.0], [1.0, 5.0]]}}
            ]}}"#
        )
        .unwrap();

        let fence = Geofence::load_json(file.path()).unwrap();
        assert_eq!(fence.stay_in_count(), 2);
        assert!(fence.contains(0.5, 0.5));
        assert!(fence.contains(0.5, 5.5));
        assert!(!fence.contains(0.5, 3.0));
    }

    #[test]
    fn test_load_json_rejects_bad_keep_out() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stay_in": [{{"polygon": [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]}}], "keep_out": [{{"polygon": [[0.0, 0.0]]}}]}}"#
        )
        .unwrap();
        assert!(matches!(Geofence::load_json(file.path()), Err(FlightError::Geofence(_))));
    }

    #[test]
    fn test_load_json_without_stay_in() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"keep_out": []}}"#).unwrap();
        assert!(matches!(Geofence::load_json(file.path()), Err(FlightError::Geofence(_))));
    }

    #[test]
    fn test_from_config_inline() {
        let config = crate::config::tests::create_valid_config();
        let fence = Geofence::from_config(&config.geofence).unwrap();
        assert_eq!(fence.stay_in_count(), 1);
        assert_eq!(fence.keep_out_count(), 0);
    }

    struct Harness {
        store: Arc<FlightStore>,
        fix: Writer<Fix>,
        trigger: GeofenceTrigger,
        sequence: SharedSequence,
    }

    fn harness(airborne: bool) -> Harness {
        let (store, writers) = FlightStore::new(Duration::from_secs(7200));
        writers.phase.modify(|p| p.airborne = airborne);
        let sequence = Arc::new(permissive_sequence());
        let trigger = GeofenceTrigger::new(
            colorado(),
            store.clone(),
            store.clone(),
            writers.contained,
            Duration::from_secs(10),
            sequence.clone(),
        );
        Harness {
            store,
            fix: writers.fix,
            trigger,
            sequence,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_outside_fix_is_debounced() {
        let h = harness(true);
        h.fix.publish(fix_at(OUTSIDE));

        let fix = h.fix;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            fix.publish(fix_at(INSIDE));
        });

        assert!(!h.trigger.evaluate().await);
        assert!(h.store.termination().intact());
        assert!(h.store.contained());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_breach_fires_once() {
        let h = harness(true);
        h.fix.publish(fix_at(OUTSIDE));

        // Keep the outside fix fresh across the debounce wait
        let fix = h.fix;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                fix.publish(fix_at(OUTSIDE));
            }
        });

        assert!(h.trigger.evaluate().await);
        assert!(!h.store.termination().intact());
        assert_eq!(h.store.termination().cause(), TriggerCause::Geofencing);
        assert!(!h.store.contained());

        assert!(!h.trigger.evaluate().await);
        assert_eq!(h.sequence.runs().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_on_ground() {
        let h = harness(false);
        h.fix.publish(fix_at(OUTSIDE));
        let start = Instant::now();

        assert!(!h.trigger.evaluate().await);
        assert!(!h.store.contained());
        // No debounce wait either
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_without_valid_fix() {
        let h = harness(true);
        h.fix.publish(Fix {
            valid: false,
            ..fix_at(OUTSIDE)
        });
        assert!(!h.trigger.evaluate().await);
        assert!(h.store.termination().intact());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fix_on_recheck_aborts() {
        let h = harness(true);
        h.fix.publish(fix_at(OUTSIDE));
        // No further fixes arrive, so the fix is stale by the recheck
        let trigger = GeofenceTrigger {
            stale_after: Duration::from_secs(5),
            ..h.trigger
        };
        assert!(!trigger.evaluate().await);
        assert!(h.store.termination().intact());
    }
}
