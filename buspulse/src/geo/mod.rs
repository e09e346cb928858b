//! Geographic primitives.
//!
//! Validated position and point types plus great-circle math used by the
//! ETA estimator.

mod types;

pub use types::{validate, GeoError, GeoPoint, Position, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Calculate the great-circle distance between two points.
///
/// Uses the haversine formula, which stays accurate over the short distances
/// between consecutive bus fixes.
///
/// # Returns
///
/// Distance in meters.
///
/// # Example
///
/// ```
/// use buspulse::geo::{distance_m, GeoPoint};
///
/// let a = GeoPoint::new(0.0, 0.0).unwrap();
/// let b = GeoPoint::new(1.0, 0.0).unwrap();
/// let d = distance_m(&a, &b);
/// assert!((d - 111_195.0).abs() < 10.0); // 1 degree of latitude
/// ```
pub fn distance_m(from: &GeoPoint, to: &GeoPoint) -> f64 {
    haversine_m(from.lat_lon(), to.lat_lon())
}

/// Great-circle distance between two `(latitude, longitude)` pairs in meters.
pub fn haversine_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lat = (lat2 - lat1) * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1.0 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Initial bearing from one point to another.
///
/// Returns bearing in degrees (0-360), where 0 = North, 90 = East.
pub fn bearing_deg(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.latitude() * DEG_TO_RAD;
    let lat2 = to.latitude() * DEG_TO_RAD;
    let delta_lon = (to.longitude() - from.longitude()) * DEG_TO_RAD;

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    let bearing = y.atan2(x).to_degrees();
    if bearing < 0.0 {
        bearing + 360.0
    } else {
        bearing
    }
}

/// Point reached by travelling `distance_m` from `origin` along `bearing`.
///
/// Used by the route simulator to advance a bus along its heading.
pub fn destination_point(origin: &GeoPoint, bearing: f64, distance_m: f64) -> GeoPoint {
    let angular = distance_m / EARTH_RADIUS_M;
    let bearing_rad = bearing * DEG_TO_RAD;
    let lat1 = origin.latitude() * DEG_TO_RAD;
    let lon1 = origin.longitude() * DEG_TO_RAD;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing_rad.cos()).asin();
    let lon2 = lon1
        + (bearing_rad.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    // Normalize longitude into [-180, 180]
    let lon_deg = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    let lat_deg = lat2.to_degrees().clamp(MIN_LAT, MAX_LAT);

    // Both components are clamped into range above
    GeoPoint::new(lat_deg, lon_deg).unwrap_or(*origin)
}
