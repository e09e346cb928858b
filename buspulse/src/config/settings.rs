//! Settings structs for each configuration section.
//!
//! Each struct represents one `[section]` of the INI config file. Conversion
//! into the runtime config types lives here too; parsing and serialization
//! do not.

use std::time::Duration;

use crate::channel::{
    LocationChannelConfig, DEFAULT_FANOUT_CAPACITY, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL,
};
use crate::eta::{
    EtaConfig, DEFAULT_HIGH_CONFIDENCE_SAMPLES, DEFAULT_HORIZON_STEPS, DEFAULT_MAX_SPEED_MPS,
    DEFAULT_MIN_SPEED_MPS,
};
use crate::source::{WatchOptions, DEFAULT_WATCH_TIMEOUT};
use crate::subscriber::{
    SubscriberConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_STALE_TIMEOUT, DEFAULT_TICK_INTERVAL,
};

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub channel: ChannelSettings,
    pub subscriber: SubscriberSettings,
    pub eta: EtaSettings,
    pub source: SourceSettings,
}

/// `[channel]`
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    /// Seconds an abandoned bus entry is kept.
    pub retention_secs: u64,
    /// Seconds between retention sweeps.
    pub sweep_interval_secs: u64,
    /// Per-bus fan-out buffer size.
    pub fanout_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
        }
    }
}

/// `[subscriber]`
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberSettings {
    pub stale_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub history_capacity: usize,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            stale_timeout_secs: DEFAULT_STALE_TIMEOUT.as_secs(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// `[eta]`
#[derive(Debug, Clone, PartialEq)]
pub struct EtaSettings {
    pub max_speed_mps: f64,
    pub min_speed_mps: f64,
    pub high_confidence_samples: usize,
    pub horizon_steps: f64,
}

impl Default for EtaSettings {
    fn default() -> Self {
        Self {
            max_speed_mps: DEFAULT_MAX_SPEED_MPS,
            min_speed_mps: DEFAULT_MIN_SPEED_MPS,
            high_confidence_samples: DEFAULT_HIGH_CONFIDENCE_SAMPLES,
            horizon_steps: DEFAULT_HORIZON_STEPS,
        }
    }
}

/// `[source]`
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub high_accuracy: bool,
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: DEFAULT_WATCH_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ConfigFile {
    pub fn channel_config(&self) -> LocationChannelConfig {
        LocationChannelConfig {
            retention: Duration::from_secs(self.channel.retention_secs),
            sweep_interval: Duration::from_secs(self.channel.sweep_interval_secs),
            fanout_capacity: self.channel.fanout_capacity,
        }
    }

    pub fn eta_config(&self) -> EtaConfig {
        EtaConfig {
            max_speed_mps: self.eta.max_speed_mps,
            min_speed_mps: self.eta.min_speed_mps,
            high_confidence_samples: self.eta.high_confidence_samples,
            horizon_steps: self.eta.horizon_steps,
        }
    }

    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            stale_timeout: Duration::from_secs(self.subscriber.stale_timeout_secs),
            tick_interval: Duration::from_millis(self.subscriber.tick_interval_ms),
            history_capacity: self.subscriber.history_capacity,
            eta: self.eta_config(),
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.source.high_accuracy,
            maximum_age: Duration::from_millis(self.source.maximum_age_ms),
            timeout: Duration::from_millis(self.source.timeout_ms),
        }
    }
}
