//! Application bootstrap implementation.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::AppConfig;
use super::error::AppError;
use crate::channel::{ChannelStats, LocationChannel};
use crate::geo::GeoPoint;
use crate::publisher::ChannelPublisher;
use crate::source::PositionSource;
use crate::subscriber::{ChannelSubscriber, SubscriberHandle};

/// Bus Pulse application with service lifecycle management.
///
/// Owns one [`LocationChannel`] and its retention janitor, and hands out
/// publishers and tracking sessions bound to it. Everything created from the
/// same app shares the same channel.
///
/// # Example
///
/// ```ignore
/// let app = BusPulseApp::start(AppConfig::default())?;
///
/// let publisher = app.publisher(Arc::new(source));
/// publisher.set_bus_id("42")?;
/// publisher.start()?;
///
/// let mut handle = app.track("42", Some(stop))?;
///
/// app.shutdown().await;
/// ```
pub struct BusPulseApp {
    channel: LocationChannel,
    subscriber: ChannelSubscriber,
    config: AppConfig,
    shutdown: CancellationToken,
    janitor: Option<JoinHandle<()>>,
}

impl BusPulseApp {
    /// Start the application. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RuntimeUnavailable`] outside a runtime.
    pub fn start(config: AppConfig) -> Result<Self, AppError> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::RuntimeUnavailable(e.to_string()))?;

        let channel = LocationChannel::with_config(config.channel.clone());
        let shutdown = CancellationToken::new();
        let janitor = channel.spawn_janitor(shutdown.child_token());

        info!(
            retention_secs = config.channel.retention.as_secs(),
            sweep_interval_secs = config.channel.sweep_interval.as_secs(),
            stale_timeout_secs = config.subscriber.stale_timeout.as_secs(),
            "Bus Pulse started"
        );

        let subscriber = ChannelSubscriber::with_config(channel.clone(), config.subscriber.clone());
        Ok(Self {
            channel,
            subscriber,
            config,
            shutdown,
            janitor: Some(janitor),
        })
    }

    /// The shared location channel.
    pub fn channel(&self) -> &LocationChannel {
        &self.channel
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Create a driver-side publisher writing to this app's channel.
    pub fn publisher(&self, source: Arc<dyn PositionSource>) -> ChannelPublisher {
        ChannelPublisher::with_options(
            source,
            Arc::new(self.channel.clone()),
            self.config.watch_options,
        )
    }

    /// Start tracking a bus.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Channel`] for a blank bus identifier.
    pub fn track(
        &self,
        bus_id: &str,
        target: Option<GeoPoint>,
    ) -> Result<SubscriberHandle, AppError> {
        Ok(self.subscriber.track(bus_id, target)?)
    }

    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Stop the janitor and wait for it to exit.
    ///
    /// Publishers and tracking handles are owned by callers and stop
    /// independently.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(janitor) = self.janitor.take() {
            if let Err(e) = janitor.await {
                tracing::warn!(error = %e, "Janitor task failed");
            }
        }
        let stats = self.channel.stats();
        info!(
            buses = stats.buses,
            publishes = stats.publishes_accepted,
            rejected = stats.publishes_rejected,
            "Bus Pulse stopped"
        );
    }
}

impl Drop for BusPulseApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
