//! The keyed last-write-wins location store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::stats::{ChannelMetrics, ChannelStats};
use super::subscription::{Subscription, SubscriptionId};
use super::{BusId, ChannelError, LocationSink};
use crate::geo::Position;

/// Default grace period before an abandoned bus entry is removed.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

/// Default interval between retention sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of updates buffered per bus for slow subscribers.
pub const DEFAULT_FANOUT_CAPACITY: usize = 64;

/// Configuration for a [`LocationChannel`].
#[derive(Debug, Clone)]
pub struct LocationChannelConfig {
    /// How long an entry with no subscribers survives without a publish.
    pub retention: Duration,
    /// How often the janitor sweeps abandoned entries.
    pub sweep_interval: Duration,
    /// Per-bus fan-out buffer. Subscribers further behind skip updates.
    pub fanout_capacity: usize,
}

impl Default for LocationChannelConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
        }
    }
}

/// Per-bus state, owned exclusively by the channel.
struct BusEntry {
    last_position: Option<Position>,
    last_updated_at: Instant,
    /// When the subscriber set last became empty.
    idle_since: Option<Instant>,
    subscribers: HashSet<SubscriptionId>,
    tx: broadcast::Sender<Position>,
}

impl BusEntry {
    fn new(capacity: usize, now: Instant) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            last_position: None,
            last_updated_at: now,
            idle_since: None,
            subscribers: HashSet::new(),
            tx,
        }
    }

    fn last_activity(&self) -> Instant {
        match self.idle_since {
            Some(idle) if idle > self.last_updated_at => idle,
            _ => self.last_updated_at,
        }
    }
}

struct ChannelInner {
    entries: DashMap<BusId, BusEntry>,
    config: LocationChannelConfig,
    next_subscription_id: AtomicU64,
    metrics: ChannelMetrics,
}

/// Keyed publish/subscribe store: the single source of truth for the last
/// known position of each bus.
///
/// Cheap to clone; clones share the same store. Publishes for one bus are
/// applied and fanned out while that bus's entry is locked, so every
/// subscriber observes the same linearized, `captured_at`-ordered sequence.
///
/// # Example
///
/// ```
/// use buspulse::channel::LocationChannel;
/// use buspulse::geo::Position;
///
/// let channel = LocationChannel::new();
/// let p = Position::from_millis(40.0, -74.0, 1_000).unwrap();
///
/// assert_eq!(channel.publish("101", p), Ok(true));
/// // Same timestamp again: no-op
/// assert_eq!(channel.publish("101", p), Ok(false));
/// assert!(channel.publish("  ", p).is_err());
/// ```
#[derive(Clone)]
pub struct LocationChannel {
    inner: Arc<ChannelInner>,
}

impl Default for LocationChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationChannel {
    /// Create a channel with default configuration.
    pub fn new() -> Self {
        Self::with_config(LocationChannelConfig::default())
    }

    /// Create a channel with custom configuration.
    pub fn with_config(config: LocationChannelConfig) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                entries: DashMap::new(),
                config,
                next_subscription_id: AtomicU64::new(1),
                metrics: ChannelMetrics::default(),
            }),
        }
    }

    /// The channel configuration.
    pub fn config(&self) -> &LocationChannelConfig {
        &self.inner.config
    }

    /// Publish a position under a raw bus identifier.
    ///
    /// Returns `Ok(true)` if the position replaced the last known one, and
    /// `Ok(false)` if it was not strictly newer (nothing changes, nobody is
    /// notified).
    ///
    /// # Errors
    ///
    /// [`ChannelError::InvalidKey`] for an empty or whitespace-only id.
    pub fn publish(&self, bus_id: &str, position: Position) -> Result<bool, ChannelError> {
        let bus_id = BusId::new(bus_id)?;
        Ok(self.publish_to(&bus_id, position))
    }

    /// Publish a position under an already-validated bus identifier.
    pub fn publish_to(&self, bus_id: &BusId, position: Position) -> bool {
        let now = Instant::now();
        let capacity = self.inner.config.fanout_capacity;
        let mut entry = self
            .inner
            .entries
            .entry(bus_id.clone())
            .or_insert_with(|| BusEntry::new(capacity, now));

        if let Some(last) = &entry.last_position {
            if !position.is_newer_than(last) {
                self.inner.metrics.publish_rejected();
                trace!(
                    bus_id = %bus_id,
                    incoming = %position.captured_at(),
                    stored = %last.captured_at(),
                    "Ignoring publish that is not newer than the stored position"
                );
                return false;
            }
        }

        entry.last_position = Some(position);
        entry.last_updated_at = now;
        // No receivers is fine; the position is still stored
        let receivers = entry.tx.send(position).unwrap_or(0);
        drop(entry);

        self.inner.metrics.publish_accepted();
        trace!(bus_id = %bus_id, position = %position, receivers, "Position published");
        true
    }

    /// Subscribe to a raw bus identifier.
    ///
    /// # Errors
    ///
    /// [`ChannelError::InvalidKey`] for an empty or whitespace-only id.
    pub fn subscribe(&self, bus_id: &str) -> Result<Subscription, ChannelError> {
        let bus_id = BusId::new(bus_id)?;
        Ok(self.subscribe_to(&bus_id))
    }

    /// Subscribe to an already-validated bus identifier.
    ///
    /// The returned subscription first yields the current last position (if
    /// any) stamped with when it was published, then every later accepted
    /// publish in order. Reading the last
    /// position and registering for updates happen under the same entry lock,
    /// so no publish falls between them.
    pub fn subscribe_to(&self, bus_id: &BusId) -> Subscription {
        let now = Instant::now();
        let capacity = self.inner.config.fanout_capacity;
        let id = SubscriptionId(
            self.inner
                .next_subscription_id
                .fetch_add(1, Ordering::Relaxed),
        );

        let mut entry = self
            .inner
            .entries
            .entry(bus_id.clone())
            .or_insert_with(|| BusEntry::new(capacity, now));
        entry.subscribers.insert(id);
        entry.idle_since = None;
        let rx = entry.tx.subscribe();
        let updated_at = entry.last_updated_at;
        let initial = entry.last_position.map(|position| (position, updated_at));
        let count = entry.subscribers.len();
        drop(entry);

        self.inner.metrics.subscription_opened();
        debug!(bus_id = %bus_id, subscription = id.0, subscribers = count, "Subscribed");
        Subscription::new(self.clone(), bus_id.clone(), id, initial, rx)
    }

    /// Release a subscription.
    ///
    /// Idempotent: returns true only the first time a given subscription is
    /// released, so the subscriber count is decremented exactly once.
    pub fn unsubscribe(&self, bus_id: &BusId, id: SubscriptionId) -> bool {
        let Some(mut entry) = self.inner.entries.get_mut(bus_id) else {
            return false;
        };
        if !entry.subscribers.remove(&id) {
            return false;
        }
        if entry.subscribers.is_empty() {
            entry.idle_since = Some(Instant::now());
        }
        let remaining = entry.subscribers.len();
        drop(entry);

        debug!(bus_id = %bus_id, subscription = id.0, subscribers = remaining, "Unsubscribed");
        true
    }

    /// Last known position of a bus.
    pub fn last_position(&self, bus_id: &BusId) -> Option<Position> {
        self.inner
            .entries
            .get(bus_id)
            .and_then(|entry| entry.last_position)
    }

    /// Number of active subscriptions for a bus (zero if unknown).
    pub fn subscriber_count(&self, bus_id: &BusId) -> usize {
        self.inner
            .entries
            .get(bus_id)
            .map(|entry| entry.subscribers.len())
            .unwrap_or(0)
    }

    /// Whether the channel currently holds an entry for a bus.
    pub fn contains(&self, bus_id: &BusId) -> bool {
        self.inner.entries.contains_key(bus_id)
    }

    /// Number of bus entries held.
    pub fn bus_count(&self) -> usize {
        self.inner.entries.len()
    }

    /// Remove entries with no subscribers and no activity within the
    /// retention window. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let retention = self.inner.config.retention;
        let before = self.inner.entries.len();

        self.inner.entries.retain(|bus_id, entry| {
            let abandoned = entry.subscribers.is_empty()
                && now.saturating_duration_since(entry.last_activity()) >= retention;
            if abandoned {
                debug!(bus_id = %bus_id, "Removing abandoned bus entry");
            }
            !abandoned
        });

        let removed = before.saturating_sub(self.inner.entries.len());
        if removed > 0 {
            self.inner.metrics.entries_swept(removed);
        }
        removed
    }

    /// Spawn a background task that sweeps abandoned entries periodically.
    ///
    /// Runs until `cancellation` is triggered.
    pub fn spawn_janitor(&self, cancellation: CancellationToken) -> JoinHandle<()> {
        let channel = self.clone();
        let interval = self.inner.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = channel.sweep(Instant::now());
                        if removed > 0 {
                            info!(removed, remaining = channel.bus_count(), "Swept abandoned buses");
                        }
                    }
                    _ = cancellation.cancelled() => {
                        debug!("Location channel janitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Point-in-time stats.
    pub fn stats(&self) -> ChannelStats {
        let buses = self.inner.entries.len();
        let subscribers = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.subscribers.len())
            .sum();
        self.inner.metrics.snapshot(buses, subscribers)
    }
}

impl LocationSink for LocationChannel {
    fn write_position(&self, bus_id: &BusId, position: Position) -> bool {
        self.publish_to(bus_id, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(id: &str) -> BusId {
        BusId::new(id).unwrap()
    }

    fn at(ms: i64) -> Position {
        Position::from_millis(40.0 + ms as f64 * 1e-6, -74.0, ms).unwrap()
    }

    #[test]
    fn test_publish_creates_entry() {
        let channel = LocationChannel::new();
        assert!(!channel.contains(&bus("101")));

        assert_eq!(channel.publish("101", at(1_000)), Ok(true));
        assert!(channel.contains(&bus("101")));
        assert_eq!(channel.last_position(&bus("101")), Some(at(1_000)));
    }

    #[test]
    fn test_publish_rejects_invalid_key() {
        let channel = LocationChannel::new();
        assert_eq!(
            channel.publish("", at(1)),
            Err(ChannelError::InvalidKey(String::new()))
        );
        assert!(channel.subscribe("   ").is_err());
        assert_eq!(channel.bus_count(), 0);
    }

    #[test]
    fn test_older_or_equal_publish_is_noop() {
        let channel = LocationChannel::new();
        let id = bus("101");
        assert!(channel.publish_to(&id, at(2_000)));

        assert!(!channel.publish_to(&id, at(2_000)));
        assert!(!channel.publish_to(&id, at(1_000)));
        assert_eq!(channel.last_position(&id), Some(at(2_000)));

        let stats = channel.stats();
        assert_eq!(stats.publishes_accepted, 1);
        assert_eq!(stats.publishes_rejected, 2);
    }

    #[test]
    fn test_keys_are_case_preserving() {
        let channel = LocationChannel::new();
        channel.publish("Bus-42", at(1)).unwrap();
        assert!(channel.last_position(&bus("bus-42")).is_none());
        assert!(channel.last_position(&bus("Bus-42")).is_some());
    }

    #[test]
    fn test_subscriber_count_and_idempotent_unsubscribe() {
        let channel = LocationChannel::new();
        let id = bus("7");

        let mut first = channel.subscribe_to(&id);
        let second = channel.subscribe_to(&id);
        assert_eq!(channel.subscriber_count(&id), 2);

        assert!(first.unsubscribe());
        assert!(!first.unsubscribe());
        assert!(!channel.unsubscribe(&id, first.id()));
        assert_eq!(channel.subscriber_count(&id), 1);

        drop(second);
        assert_eq!(channel.subscriber_count(&id), 0);
        assert!(channel.contains(&id), "entry survives until swept");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_retention() {
        let channel = LocationChannel::with_config(LocationChannelConfig {
            retention: Duration::from_secs(60),
            ..Default::default()
        });
        let id = bus("9");
        channel.publish_to(&id, at(1));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(channel.sweep(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(channel.sweep(Instant::now()), 1);
        assert!(!channel.contains(&id));
        assert_eq!(channel.stats().entries_swept, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_subscribed_entries() {
        let channel = LocationChannel::new();
        let id = bus("9");
        let sub = channel.subscribe_to(&id);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(channel.sweep(Instant::now()), 0);

        // Grace period restarts when the last subscriber leaves
        drop(sub);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(channel.sweep(Instant::now()), 0);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(channel.sweep(Instant::now()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_sweeps_until_cancelled() {
        let channel = LocationChannel::with_config(LocationChannelConfig {
            retention: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
            ..Default::default()
        });
        channel.publish("3", at(1)).unwrap();

        let cancel = CancellationToken::new();
        let handle = channel.spawn_janitor(cancel.clone());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(channel.bus_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_sink_trait_routes_to_publish() {
        let channel = LocationChannel::new();
        let sink: &dyn LocationSink = &channel;
        assert!(sink.write_position(&bus("1"), at(5)));
        assert!(!sink.write_position(&bus("1"), at(4)));
    }
}
