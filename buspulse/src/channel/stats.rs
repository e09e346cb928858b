//! Channel counters and point-in-time stats.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free publish counters.
///
/// Relaxed ordering: the counters are independent measurements.
#[derive(Debug, Default)]
pub(super) struct ChannelMetrics {
    publishes_accepted: AtomicU64,
    publishes_rejected: AtomicU64,
    subscriptions_opened: AtomicU64,
    entries_swept: AtomicU64,
}

impl ChannelMetrics {
    pub(super) fn publish_accepted(&self) {
        self.publishes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn publish_rejected(&self) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn subscription_opened(&self) {
        self.subscriptions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn entries_swept(&self, count: usize) {
        self.entries_swept
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self, buses: usize, subscribers: usize) -> ChannelStats {
        ChannelStats {
            buses,
            subscribers,
            publishes_accepted: self.publishes_accepted.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            subscriptions_opened: self.subscriptions_opened.load(Ordering::Relaxed),
            entries_swept: self.entries_swept.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    /// Bus entries currently held.
    pub buses: usize,
    /// Active subscriptions across all buses.
    pub subscribers: usize,
    /// Publishes that replaced the last position.
    pub publishes_accepted: u64,
    /// Publishes ignored because they were not newer.
    pub publishes_rejected: u64,
    /// Subscriptions opened since the channel was created.
    pub subscriptions_opened: u64,
    /// Abandoned entries removed by sweeps.
    pub entries_swept: u64,
}

impl ChannelStats {
    /// Fraction of publishes that were rejected as stale or duplicate.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.publishes_accepted + self.publishes_rejected;
        if total == 0 {
            0.0
        } else {
            self.publishes_rejected as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = ChannelMetrics::default();
        metrics.publish_accepted();
        metrics.publish_accepted();
        metrics.publish_accepted();
        metrics.publish_rejected();
        metrics.subscription_opened();
        metrics.entries_swept(2);

        let stats = metrics.snapshot(4, 1);
        assert_eq!(stats.buses, 4);
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.publishes_accepted, 3);
        assert_eq!(stats.publishes_rejected, 1);
        assert_eq!(stats.subscriptions_opened, 1);
        assert_eq!(stats.entries_swept, 2);
        assert!((stats.rejection_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejection_rate_empty() {
        assert_eq!(ChannelStats::default().rejection_rate(), 0.0);
    }
}
