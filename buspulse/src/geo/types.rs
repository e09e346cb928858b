//! Geographic value types.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use thiserror::Error;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;
/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;
/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;
/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Errors from constructing geographic values.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeoError {
    /// Latitude outside [-90, 90] or not finite.
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180] or not finite.
    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    /// Unix millisecond timestamp outside the representable range.
    #[error("Invalid timestamp: {0}ms")]
    InvalidTimestamp(i64),
}

/// Validate a latitude/longitude pair.
#[inline]
pub fn validate(latitude: f64, longitude: f64) -> Result<(), GeoError> {
    if !latitude.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&latitude) {
        return Err(GeoError::InvalidLatitude(latitude));
    }
    if !longitude.is_finite() || !(MIN_LON..=MAX_LON).contains(&longitude) {
        return Err(GeoError::InvalidLongitude(longitude));
    }
    Ok(())
}

/// A point on the earth's surface with no time attached.
///
/// Used for destinations: a bus stop or the student's viewing point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, validating both coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        validate(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// As a `(latitude, longitude)` tuple.
    pub fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

impl std::str::FromStr for GeoPoint {
    type Err = String;

    /// Parse `"LAT,LON"` in decimal degrees.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LAT,LON but got '{}'", s))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;
        GeoPoint::new(lat, lon).map_err(|e| e.to_string())
    }
}

/// A validated position fix for one bus at one moment.
///
/// Coordinates are guaranteed in range; `captured_at` is the time the device
/// took the fix, not the time it was received, kept at millisecond
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    latitude: f64,
    longitude: f64,
    captured_at: DateTime<Utc>,
}

impl Position {
    /// Create a position, validating both coordinates.
    ///
    /// Sub-millisecond precision is dropped from `captured_at`.
    pub fn new(
        latitude: f64,
        longitude: f64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, GeoError> {
        validate(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
            captured_at: captured_at.trunc_subsecs(3),
        })
    }

    /// Create a position from a unix timestamp in milliseconds.
    pub fn from_millis(
        latitude: f64,
        longitude: f64,
        captured_at_ms: i64,
    ) -> Result<Self, GeoError> {
        let captured_at = DateTime::<Utc>::from_timestamp_millis(captured_at_ms)
            .ok_or(GeoError::InvalidTimestamp(captured_at_ms))?;
        Self::new(latitude, longitude, captured_at)
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// When the fix was taken.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// The point part of this position.
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// True if this fix was captured strictly after `other`.
    pub fn is_newer_than(&self, other: &Position) -> bool {
        self.captured_at > other.captured_at
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.6},{:.6}@{}",
            self.latitude,
            self.longitude,
            self.captured_at.format("%H:%M:%S%.3f")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ranges() {
        assert!(validate(0.0, 0.0).is_ok());
        assert!(validate(90.0, 180.0).is_ok());
        assert!(validate(-90.0, -180.0).is_ok());
        assert_eq!(validate(90.1, 0.0), Err(GeoError::InvalidLatitude(90.1)));
        assert_eq!(validate(0.0, -180.5), Err(GeoError::InvalidLongitude(-180.5)));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(matches!(
            validate(f64::NAN, 0.0),
            Err(GeoError::InvalidLatitude(_))
        ));
        assert!(matches!(
            validate(0.0, f64::INFINITY),
            Err(GeoError::InvalidLongitude(_))
        ));
    }

    #[test]
    fn test_position_newer() {
        let a = Position::from_millis(40.0, -74.0, 1_000).unwrap();
        let b = Position::from_millis(40.0, -74.0, 2_000).unwrap();
        assert!(b.is_newer_than(&a));
        assert!(!a.is_newer_than(&b));
        assert!(!a.is_newer_than(&a));
    }

    #[test]
    fn test_geo_point_parse() {
        let p: GeoPoint = "40.7128, -74.0060".parse().unwrap();
        assert_eq!(p.lat_lon(), (40.7128, -74.006));

        assert!("40.7128".parse::<GeoPoint>().is_err());
        assert!("abc,1".parse::<GeoPoint>().is_err());
        assert!("95.0,1.0".parse::<GeoPoint>().is_err());
    }

    #[test]
    fn test_position_serde_shape() {
        let p = Position::from_millis(40.0, -74.0, 0).unwrap();
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["latitude"], 40.0);
        assert_eq!(json["longitude"], -74.0);
        assert_eq!(json["capturedAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("captured_at").is_none());
    }

    #[test]
    fn test_position_truncates_to_millis() {
        let base = DateTime::<Utc>::from_timestamp_millis(5_000).unwrap();
        let a = Position::new(40.0, -74.0, base + chrono::Duration::microseconds(200)).unwrap();
        let b = Position::new(40.0, -74.0, base + chrono::Duration::microseconds(700)).unwrap();

        assert_eq!(a.captured_at(), base);
        assert_eq!(b.captured_at(), base);
        assert!(!b.is_newer_than(&a));
    }
}
