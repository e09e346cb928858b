//! Raw fixes and watch options.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default per-fix timeout requested from the device.
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One raw reading from a location-sensing capability, before filtering.
///
/// Every field beyond the coordinates is optional because real devices do
/// not always report them; the publisher discards fixes it cannot date or
/// qualify.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFix {
    /// Latitude in degrees (unvalidated).
    pub latitude: f64,
    /// Longitude in degrees (unvalidated).
    pub longitude: f64,
    /// When the device took the fix.
    pub captured_at: Option<DateTime<Utc>>,
    /// Reported horizontal accuracy radius in meters.
    pub accuracy_m: Option<f64>,
}

impl RawFix {
    /// Create a fully qualified fix.
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>, accuracy_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at: Some(captured_at),
            accuracy_m: Some(accuracy_m),
        }
    }

    /// Create a fix stamped with the current wall-clock time.
    pub fn now(latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self::new(latitude, longitude, Utc::now(), accuracy_m)
    }
}

/// Options passed to a source when a trip starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Ask for the most accurate fix the device can give.
    pub high_accuracy: bool,
    /// Maximum age of a cached fix the device may return (zero = always fresh).
    pub maximum_age: Duration,
    /// How long the device may take to produce each fix before reporting a timeout.
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }
}
