//! Shared per-bus location channel.
//!
//! The [`LocationChannel`] is the single source of truth for each bus's last
//! known position. Drivers write through [`LocationChannel::publish`] (or the
//! [`LocationSink`] seam); students read through [`LocationChannel::subscribe`].
//!
//! # Guarantees
//!
//! - Last-write-wins by capture time: a publish whose `captured_at` is not
//!   strictly later than the stored one is ignored and not delivered.
//! - Every subscriber of a bus sees the accepted updates in the same order.
//! - An entry is removed only after it has had no subscribers and no publishes
//!   for the configured retention window.

mod bus_id;
mod error;
mod stats;
mod store;
mod subscription;

pub use bus_id::BusId;
pub use error::ChannelError;
pub use stats::ChannelStats;
pub use store::{
    LocationChannel, LocationChannelConfig, DEFAULT_FANOUT_CAPACITY, DEFAULT_RETENTION,
    DEFAULT_SWEEP_INTERVAL,
};
pub use subscription::{Subscription, SubscriptionId};

use crate::geo::Position;

/// Write side of the channel, as seen by a publisher.
///
/// Returns true if the position was accepted (strictly newer than the stored
/// one).
pub trait LocationSink: Send + Sync {
    fn write_position(&self, bus_id: &BusId, position: Position) -> bool;
}
