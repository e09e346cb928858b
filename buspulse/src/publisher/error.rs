//! Error types for the publisher.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::source::SourceError;

/// Errors from publisher control operations.
///
/// Faults from a running source are not errors here; they are reported as
/// [`PublisherEvent::SourceError`](super::PublisherEvent::SourceError) and the
/// trip continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublisherError {
    /// `start` was called with no bus number entered.
    #[error("No bus identifier set")]
    NoBusId,

    /// `start` was called while a trip is running.
    #[error("Already publishing for bus {0}")]
    AlreadyPublishing(String),

    /// The bus number cannot be edited while a trip is running.
    #[error("Bus identifier is locked while publishing for bus {0}")]
    BusIdLocked(String),

    /// The position source cannot provide positions at all.
    #[error("Location capability unavailable: {0}")]
    CapabilityUnavailable(#[source] SourceError),

    /// The entered bus number is not a valid key.
    #[error(transparent)]
    InvalidBusId(#[from] ChannelError),
}
