//! Bus identifier key.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::ChannelError;

/// The human-entered identifier that correlates a driver's publishing session
/// with student subscriptions.
///
/// Surrounding whitespace is trimmed; case is preserved, so `"Bus-42"` and
/// `"bus-42"` are different buses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BusId(String);

impl BusId {
    /// Parse a bus identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidKey`] if the input is empty after trimming.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ChannelError> {
        let raw = raw.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ChannelError::InvalidKey(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identifier as entered (trimmed).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BusId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BusId::new(s)
    }
}

impl AsRef<str> for BusId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
