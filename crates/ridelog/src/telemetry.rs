//! Core telemetry types for ridelog.
//!
//! Raw sensor payloads, the fused [`SamplePoint`] written to the path buffer,
//! and the conversions between them (roll/pitch from an acceleration vector,
//! km/h from m/s).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default clamp for roll readings, in degrees.
pub const MAX_ROLL_ANGLE: f64 = 50.0;

/// How the phone is mounted on the bike.
///
/// Selects which accelerometer axes describe lateral tilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationMode {
    /// Long edge vertical.
    #[default]
    Portrait,
    /// Long edge horizontal.
    Landscape,
}

impl std::fmt::Display for OrientationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Portrait => write!(f, "portrait"),
            Self::Landscape => write!(f, "landscape"),
        }
    }
}

/// Raw 3-axis acceleration as delivered by the orientation feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelVector {
    /// Lateral axis.
    pub x: f64,
    /// Longitudinal axis.
    pub y: f64,
    /// Axis normal to the screen.
    pub z: f64,
}

impl AccelVector {
    /// Create a new vector.
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Whether every component is a usable number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A single position fix from the location feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Decimal degrees.
    pub latitude: f64,
    /// Decimal degrees.
    pub longitude: f64,
    /// Ground speed in meters per second, if the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl LocationFix {
    /// Create a new fix.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, speed: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            speed,
        }
    }

    /// Whether the coordinates are usable numbers.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &LocationFix) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Latest roll and pitch, in whole degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orientation {
    /// Lateral tilt.
    pub roll: i32,
    /// Forward/back tilt.
    pub pitch: i32,
}

/// Result of converting an acceleration vector into a roll angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollReading {
    /// Clamped angle in degrees; the roll dial animates toward this.
    pub clamped: f64,
    /// Clamped angle rounded to a whole degree; this is what gets stored.
    pub degrees: i32,
}

/// One fused observation, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePoint {
    /// Decimal degrees.
    pub latitude: f64,
    /// Decimal degrees.
    pub longitude: f64,
    /// When the point was appended to the path.
    #[serde(rename = "timestampIso")]
    pub timestamp: DateTime<Utc>,
    /// Latest roll at append time, within `±max_roll_angle`.
    pub roll: i32,
    /// Latest pitch at append time.
    pub pitch: i32,
    /// Speed rounded to whole km/h.
    pub speed_kmh: u32,
}

impl SamplePoint {
    /// Build a point from a fix and the latest orientation, stamped now.
    #[must_use]
    pub fn new(fix: &LocationFix, orientation: Orientation, speed_kmh: u32) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: Utc::now(),
            roll: orientation.roll,
            pitch: orientation.pitch,
            speed_kmh,
        }
    }
}

/// Convert a source speed in m/s to whole km/h.
///
/// Missing, negative and non-finite speeds read as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn speed_kmh(speed_mps: Option<f64>) -> u32 {
    match speed_mps {
        Some(speed) if speed.is_finite() && speed > 0.0 => (speed * 3.6).round() as u32,
        _ => 0,
    }
}

/// Raw lateral tilt in degrees, before clamping.
#[must_use]
pub fn raw_roll_degrees(vector: &AccelVector, mode: OrientationMode) -> f64 {
    let radians = match mode {
        OrientationMode::Portrait => (-vector.x).atan2(vector.z),
        OrientationMode::Landscape => vector.y.atan2(vector.z),
    };
    radians.to_degrees()
}

/// Roll angle for a vector, clamped to `±max_roll_angle` and rounded.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn roll_from_vector(
    vector: &AccelVector,
    mode: OrientationMode,
    max_roll_angle: f64,
) -> RollReading {
    let clamped = raw_roll_degrees(vector, mode).clamp(-max_roll_angle, max_roll_angle);
    RollReading {
        clamped,
        degrees: clamped.round() as i32,
    }
}

/// Forward/back tilt in whole degrees.
///
/// Uses the axis left over by the roll formula against the magnitude of the
/// other two, so the result stays within ±90 without clamping.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pitch_from_vector(vector: &AccelVector, mode: OrientationMode) -> i32 {
    let radians = match mode {
        OrientationMode::Portrait => vector.y.atan2(vector.x.hypot(vector.z)),
        OrientationMode::Landscape => vector.x.atan2(vector.y.hypot(vector.z)),
    };
    radians.to_degrees().round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_mode_display() {
        assert_eq!(OrientationMode::Portrait.to_string(), "portrait");
        assert_eq!(OrientationMode::Landscape.to_string(), "landscape");
    }

    #[test]
    fn test_orientation_mode_serde() {
        let json = serde_json::to_string(&OrientationMode::Landscape).unwrap();
        assert_eq!(json, "\"landscape\"");
        let mode: OrientationMode = serde_json::from_str("\"portrait\"").unwrap();
        assert_eq!(mode, OrientationMode::Portrait);
    }

    #[test]
    fn test_speed_conversion() {
        assert_eq!(speed_kmh(Some(33.33)), 120);
        assert_eq!(speed_kmh(Some(10.0)), 36);
        assert_eq!(speed_kmh(Some(0.0)), 0);
        assert_eq!(speed_kmh(None), 0);
    }

    #[test]
    fn test_speed_conversion_rejects_invalid() {
        assert_eq!(speed_kmh(Some(-1.0)), 0);
        assert_eq!(speed_kmh(Some(f64::NAN)), 0);
        assert_eq!(speed_kmh(Some(f64::INFINITY)), 0);
    }

    #[test]
    fn test_flat_phone_has_no_roll() {
        let flat = AccelVector::new(0.0, 0.0, 9.81);
        let reading = roll_from_vector(&flat, OrientationMode::Portrait, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, 0);
    }

    #[test]
    fn test_portrait_roll_formula() {
        // atan2(-x, z) with x = -z gives +45 degrees.
        let v = AccelVector::new(-5.0, 1.0, 5.0);
        let reading = roll_from_vector(&v, OrientationMode::Portrait, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, 45);
        assert!((reading.clamped - 45.0).abs() < 1e-9);

        let mirrored = AccelVector::new(5.0, 1.0, 5.0);
        let reading = roll_from_vector(&mirrored, OrientationMode::Portrait, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, -45);
    }

    #[test]
    fn test_landscape_roll_formula() {
        let v = AccelVector::new(-5.0, 5.0, 5.0);
        let reading = roll_from_vector(&v, OrientationMode::Landscape, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, 45);

        // The portrait axis is ignored in landscape.
        let v = AccelVector::new(9.0, 0.0, 9.81);
        let reading = roll_from_vector(&v, OrientationMode::Landscape, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, 0);
    }

    #[test]
    fn test_roll_is_clamped() {
        let steep = AccelVector::new(-9.81, 0.0, 1.0);
        let reading = roll_from_vector(&steep, OrientationMode::Portrait, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, 50);
        assert!((reading.clamped - 50.0).abs() < f64::EPSILON);

        let upside_down = AccelVector::new(1.0, 0.0, -9.81);
        let reading = roll_from_vector(&upside_down, OrientationMode::Portrait, MAX_ROLL_ANGLE);
        assert_eq!(reading.degrees, -50);
    }

    #[test]
    fn test_roll_matches_reference_over_grid() {
        for xi in -10..=10 {
            for zi in -10..=10 {
                let (x, z) = (f64::from(xi), f64::from(zi));
                let v = AccelVector::new(x, 0.3, z);
                let reading = roll_from_vector(&v, OrientationMode::Portrait, MAX_ROLL_ANGLE);
                let expected = (-x).atan2(z).to_degrees().clamp(-50.0, 50.0).round();
                assert!((-50..=50).contains(&reading.degrees));
                assert!((f64::from(reading.degrees) - expected).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn test_custom_clamp() {
        let v = AccelVector::new(-5.0, 0.0, 5.0);
        let reading = roll_from_vector(&v, OrientationMode::Portrait, 30.0);
        assert_eq!(reading.degrees, 30);
    }

    #[test]
    fn test_pitch() {
        let flat = AccelVector::new(0.0, 0.0, 9.81);
        assert_eq!(pitch_from_vector(&flat, OrientationMode::Portrait), 0);

        let tipped = AccelVector::new(0.0, 5.0, 5.0);
        assert_eq!(pitch_from_vector(&tipped, OrientationMode::Portrait), 45);

        let tipped = AccelVector::new(5.0, 0.0, 5.0);
        assert_eq!(pitch_from_vector(&tipped, OrientationMode::Landscape), 45);

        let vertical = AccelVector::new(0.0, 9.81, 0.0);
        assert_eq!(pitch_from_vector(&vertical, OrientationMode::Portrait), 90);
    }

    #[test]
    fn test_vector_finite() {
        assert!(AccelVector::new(0.0, 1.0, 2.0).is_finite());
        assert!(!AccelVector::new(f64::NAN, 1.0, 2.0).is_finite());
    }

    #[test]
    fn test_fix_valid_coordinates() {
        assert!(LocationFix::new(-8.65, 115.22, None).has_valid_coordinates());
        assert!(!LocationFix::new(f64::NAN, 115.22, None).has_valid_coordinates());
    }

    #[test]
    fn test_sample_point_new() {
        let fix = LocationFix::new(-8.65, 115.22, Some(33.33));
        let point = SamplePoint::new(&fix, Orientation { roll: -12, pitch: 3 }, 120);

        assert!((point.latitude + 8.65).abs() < f64::EPSILON);
        assert!((point.longitude - 115.22).abs() < f64::EPSILON);
        assert_eq!(point.roll, -12);
        assert_eq!(point.pitch, 3);
        assert_eq!(point.speed_kmh, 120);
    }

    #[test]
    fn test_sample_point_serialized_field_names() {
        let fix = LocationFix::new(1.0, 2.0, None);
        let point = SamplePoint::new(&fix, Orientation::default(), 0);
        let json = serde_json::to_value(&point).unwrap();

        assert!(json.get("timestampIso").is_some());
        assert!(json.get("speedKmh").is_some());
        assert!(json.get("roll").is_some());
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_fix_distance() {
        let origin = LocationFix::new(0.0, 0.0, None);
        let north = LocationFix::new(1.0, 0.0, None);
        assert!((origin.distance_to(&north) - 111_194.9).abs() < 1.0);
        assert!(origin.distance_to(&origin).abs() < f64::EPSILON);

        let a = LocationFix::new(-8.65, 115.22, None);
        let b = LocationFix::new(-8.65, 115.220_05, None);
        let d = a.distance_to(&b);
        assert!(d > 5.0 && d < 6.0, "got {d}");
    }
}
