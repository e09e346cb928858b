//! Raw fix admission.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::{GeoError, Position};
use crate::source::RawFix;

/// Why a raw fix was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum DiscardReason {
    /// The fix carried no capture time.
    MissingTimestamp,
    /// Accuracy absent, negative, or not finite.
    UnknownAccuracy,
    /// Latitude or longitude out of range or not finite.
    InvalidCoordinates {
        #[serde(skip)]
        error: GeoError,
    },
    /// Not captured strictly after the last forwarded fix.
    NotNewer,
    /// The channel already holds a newer position for this bus.
    Superseded,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::MissingTimestamp => write!(f, "missing timestamp"),
            DiscardReason::UnknownAccuracy => write!(f, "unknown accuracy"),
            DiscardReason::InvalidCoordinates { error } => write!(f, "{}", error),
            DiscardReason::NotNewer => write!(f, "not newer than last forwarded fix"),
            DiscardReason::Superseded => write!(f, "channel holds a newer position"),
        }
    }
}

/// Decides which raw fixes become channel writes.
///
/// There is no distance or time throttling: every admissible fix is
/// forwarded.
#[derive(Debug, Clone, Default)]
pub struct FixFilter {
    last_forwarded: Option<DateTime<Utc>>,
}

impl FixFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a fix and, if admitted, remember its capture time.
    pub fn admit(&mut self, fix: &RawFix) -> Result<Position, DiscardReason> {
        let captured_at = fix.captured_at.ok_or(DiscardReason::MissingTimestamp)?;

        match fix.accuracy_m {
            Some(accuracy) if accuracy.is_finite() && accuracy >= 0.0 => {}
            _ => return Err(DiscardReason::UnknownAccuracy),
        }

        let position = Position::new(fix.latitude, fix.longitude, captured_at)
            .map_err(|error| DiscardReason::InvalidCoordinates { error })?;

        let captured_at = position.captured_at();
        if self.last_forwarded.is_some_and(|last| captured_at <= last) {
            return Err(DiscardReason::NotNewer);
        }

        self.last_forwarded = Some(captured_at);
        Ok(position)
    }

    /// Capture time of the last admitted fix.
    pub fn last_forwarded(&self) -> Option<DateTime<Utc>> {
        self.last_forwarded
    }
}
