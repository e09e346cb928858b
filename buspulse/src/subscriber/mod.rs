//! Student-side tracking of one bus.
//!
//! A [`ChannelSubscriber`] subscribes to a bus on the [`LocationChannel`] and
//! runs a background task that keeps a bounded position history, detects
//! staleness on a timer, and recomputes the ETA toward a target on every
//! accepted update.
//!
//! # Usage
//!
//! ```ignore
//! let subscriber = ChannelSubscriber::new(channel.clone());
//! let mut handle = subscriber.track(&bus_id, Some(stop))?;
//!
//! let mut events = handle.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     // reposition marker, update ETA badge
//! }
//!
//! handle.stop().await;
//! ```

mod handle;
mod history;
mod session;

use std::time::Duration;

pub use handle::{SubscriberHandle, TrackingEvent, TrackingSnapshot};
pub use history::{SampleHistory, DEFAULT_HISTORY_CAPACITY};
pub use session::{PositionOutcome, StatusChange, TrackingSession, TrackingStatus};

use crate::channel::{BusId, ChannelError, LocationChannel};
use crate::eta::{EtaConfig, EtaEstimator};
use crate::geo::GeoPoint;
use handle::TrackingTask;

/// Default time without updates before a live bus is reported stale.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default staleness check interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for tracking sessions.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub stale_timeout: Duration,
    pub tick_interval: Duration,
    pub history_capacity: usize,
    pub eta: EtaConfig,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            eta: EtaConfig::default(),
        }
    }
}

/// Starts tracking sessions against a channel.
#[derive(Clone)]
pub struct ChannelSubscriber {
    channel: LocationChannel,
    config: SubscriberConfig,
}

impl ChannelSubscriber {
    pub fn new(channel: LocationChannel) -> Self {
        Self::with_config(channel, SubscriberConfig::default())
    }

    pub fn with_config(channel: LocationChannel, config: SubscriberConfig) -> Self {
        Self { channel, config }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// Start tracking a bus by its raw identifier.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ChannelError::InvalidKey`] for an empty or whitespace-only id.
    pub fn track(
        &self,
        bus_id: &str,
        target: Option<GeoPoint>,
    ) -> Result<SubscriberHandle, ChannelError> {
        let bus_id = BusId::new(bus_id)?;
        Ok(self.track_bus(&bus_id, target))
    }

    /// Start tracking an already-validated bus identifier.
    pub fn track_bus(&self, bus_id: &BusId, target: Option<GeoPoint>) -> SubscriberHandle {
        let subscription = self.channel.subscribe_to(bus_id);
        let task = TrackingTask {
            session: TrackingSession::new(
                bus_id.clone(),
                self.config.history_capacity,
                self.config.stale_timeout,
            ),
            subscription,
            estimator: EtaEstimator::with_config(self.config.eta.clone()),
            target,
            tick_interval: self.config.tick_interval.max(Duration::from_millis(1)),
        };
        task.start()
    }
}
