//! Error types for position sources.

use thiserror::Error;

/// Failures reported by a device's location capability.
///
/// Returned from [`super::PositionSource::watch`] when the capability is
/// missing altogether, and yielded inside a running fix stream for transient
/// faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The user or platform refused access to location.
    #[error("Location permission denied")]
    PermissionDenied,

    /// No fix arrived within the requested timeout.
    #[error("Timed out waiting for a position fix")]
    Timeout,

    /// The location capability is not available (no hardware, no signal).
    #[error("Location unavailable: {0}")]
    Unavailable(String),
}
