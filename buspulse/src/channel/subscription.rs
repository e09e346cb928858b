//! Subscription handles.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::Instant;
use tracing::warn;

use super::{BusId, LocationChannel};
use crate::geo::Position;

/// Identifies one subscription within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(super) u64);

impl SubscriptionId {
    /// Raw numeric value, unique per channel.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A live feed of positions for one bus.
///
/// Yields the bus's last known position at subscribe time (if any), then each
/// accepted publish in order. A subscriber that falls more than the channel's
/// fan-out capacity behind skips the oldest updates; what it does receive is
/// still in increasing `captured_at` order.
///
/// The replayed position keeps the time it was published to the channel, so
/// a late subscriber can tell how old it is; see
/// [`next_with_time`](Self::next_with_time).
///
/// Dropping the subscription releases it.
pub struct Subscription {
    channel: LocationChannel,
    bus_id: BusId,
    id: SubscriptionId,
    pending: Option<(Position, Instant)>,
    rx: broadcast::Receiver<Position>,
    released: bool,
}

impl Subscription {
    pub(super) fn new(
        channel: LocationChannel,
        bus_id: BusId,
        id: SubscriptionId,
        initial: Option<(Position, Instant)>,
        rx: broadcast::Receiver<Position>,
    ) -> Self {
        Self {
            channel,
            bus_id,
            id,
            pending: initial,
            rx,
            released: false,
        }
    }

    /// The bus this subscription follows.
    pub fn bus_id(&self) -> &BusId {
        &self.bus_id
    }

    /// This subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether [`unsubscribe`](Self::unsubscribe) has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Wait for the next position.
    ///
    /// Returns `None` once the subscription is released or the channel entry
    /// is gone.
    pub async fn next(&mut self) -> Option<Position> {
        self.next_with_time().await.map(|(position, _)| position)
    }

    /// Wait for the next position together with when the channel accepted it.
    ///
    /// For the replayed last position this is its original publish time;
    /// for live updates it is the time of receipt.
    pub async fn next_with_time(&mut self) -> Option<(Position, Instant)> {
        if self.released {
            return None;
        }
        if let Some(replayed) = self.pending.take() {
            return Some(replayed);
        }
        loop {
            match self.rx.recv().await {
                Ok(position) => return Some((position, Instant::now())),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(bus_id = %self.bus_id, skipped, "Subscriber lagged, skipping updates");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next position if one is already available.
    pub fn try_next(&mut self) -> Option<Position> {
        if self.released {
            return None;
        }
        if let Some((position, _)) = self.pending.take() {
            return Some(position);
        }
        loop {
            match self.rx.try_recv() {
                Ok(position) => return Some(position),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(bus_id = %self.bus_id, skipped, "Subscriber lagged, skipping updates");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription. Safe to call more than once; returns true
    /// only on the call that actually released it.
    pub fn unsubscribe(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.pending = None;
        self.channel.unsubscribe(&self.bus_id, self.id)
    }

    /// Convert into a stream of positions.
    pub fn into_stream(self) -> BoxStream<'static, Position> {
        futures::stream::unfold(self, |mut sub| async move {
            let position = sub.next().await?;
            Some((position, sub))
        })
        .boxed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("bus_id", &self.bus_id)
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::LocationChannelConfig;

    fn at(ms: i64) -> Position {
        Position::from_millis(40.0, -74.0 + ms as f64 * 1e-6, ms).unwrap()
    }

    #[tokio::test]
    async fn test_initial_position_is_delivered_first() {
        let channel = LocationChannel::new();
        channel.publish("5", at(1_000)).unwrap();

        let mut sub = channel.subscribe("5").unwrap();
        channel.publish("5", at(2_000)).unwrap();

        assert_eq!(sub.next().await, Some(at(1_000)));
        assert_eq!(sub.next().await, Some(at(2_000)));
        assert_eq!(sub.try_next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_keeps_publish_time() {
        let channel = LocationChannel::new();
        channel.publish("5", at(1_000)).unwrap();
        let published_at = Instant::now();

        tokio::time::advance(Duration::from_secs(600)).await;
        let mut sub = channel.subscribe("5").unwrap();

        assert_eq!(sub.next_with_time().await, Some((at(1_000), published_at)));

        channel.publish("5", at(2_000)).unwrap();
        let (position, received_at) = sub.next_with_time().await.unwrap();
        assert_eq!(position, at(2_000));
        assert_eq!(received_at, published_at + Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_subscribe_before_any_publish() {
        let channel = LocationChannel::new();
        let mut sub = channel.subscribe("5").unwrap();
        assert_eq!(sub.try_next(), None);

        channel.publish("5", at(10)).unwrap();
        assert_eq!(sub.next().await, Some(at(10)));
    }

    #[tokio::test]
    async fn test_stale_publish_not_delivered() {
        let channel = LocationChannel::new();
        let mut sub = channel.subscribe("5").unwrap();
        channel.publish("5", at(20)).unwrap();
        channel.publish("5", at(10)).unwrap();
        channel.publish("5", at(30)).unwrap();

        assert_eq!(sub.next().await, Some(at(20)));
        assert_eq!(sub.next().await, Some(at(30)));
        assert_eq!(sub.try_next(), None);
    }

    #[tokio::test]
    async fn test_released_subscription_yields_nothing() {
        let channel = LocationChannel::new();
        let mut sub = channel.subscribe("5").unwrap();
        assert!(sub.unsubscribe());
        assert!(sub.is_released());

        channel.publish("5", at(10)).unwrap();
        assert_eq!(sub.next().await, None);
        assert_eq!(sub.try_next(), None);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_order() {
        let channel = LocationChannel::with_config(LocationChannelConfig {
            fanout_capacity: 2,
            ..Default::default()
        });
        let mut sub = channel.subscribe("5").unwrap();
        for ms in 1..=10 {
            channel.publish("5", at(ms)).unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(Some(p)) = tokio::time::timeout(Duration::from_millis(10), sub.next()).await {
            seen.push(p.captured_at());
        }
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(at(10).captured_at()));
    }

    #[tokio::test]
    async fn test_into_stream() {
        let channel = LocationChannel::new();
        channel.publish("5", at(1)).unwrap();
        let sub = channel.subscribe("5").unwrap();
        let mut stream = sub.into_stream();
        assert_eq!(stream.next().await, Some(at(1)));

        drop(stream);
        let id = BusId::new("5").unwrap();
        assert_eq!(channel.subscriber_count(&id), 0);
    }
}
