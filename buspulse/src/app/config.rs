//! Application configuration for `BusPulseApp`.

use crate::channel::LocationChannelConfig;
use crate::config::ConfigFile;
use crate::source::WatchOptions;
use crate::subscriber::SubscriberConfig;

/// Configuration combining every component's settings.
///
/// This is what `BusPulseApp::start()` takes; building it from the
/// configuration file keeps all components consistent.
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    /// Location channel retention and fan-out.
    pub channel: LocationChannelConfig,

    /// Tracking session staleness, history, and ETA tuning.
    pub subscriber: SubscriberConfig,

    /// Options passed to position sources when a trip starts.
    pub watch_options: WatchOptions,
}

impl AppConfig {
    /// Create application config from the configuration file.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        Self {
            channel: file.channel_config(),
            subscriber: file.subscriber_config(),
            watch_options: file.watch_options(),
        }
    }

    pub fn with_channel(mut self, channel: LocationChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_subscriber(mut self, subscriber: SubscriberConfig) -> Self {
        self.subscriber = subscriber;
        self
    }

    pub fn with_watch_options(mut self, watch_options: WatchOptions) -> Self {
        self.watch_options = watch_options;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_from_config_file() {
        let mut file = ConfigFile::default();
        file.channel.retention_secs = 5;
        file.subscriber.history_capacity = 4;
        file.source.timeout_ms = 1500;

        let config = AppConfig::from_config_file(&file);
        assert_eq!(config.channel.retention, Duration::from_secs(5));
        assert_eq!(config.subscriber.history_capacity, 4);
        assert_eq!(config.watch_options.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_builder() {
        let config = AppConfig::default().with_watch_options(WatchOptions {
            high_accuracy: false,
            ..Default::default()
        });
        assert!(!config.watch_options.high_accuracy);
        assert_eq!(config.subscriber.history_capacity, 8);
    }
}
