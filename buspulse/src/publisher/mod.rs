//! Driver-side publishing.
//!
//! A [`ChannelPublisher`] bridges a [`PositionSource`] to a [`LocationSink`]
//! under the bus number the driver entered:
//!
//! ```text
//! Idle --start--> Publishing --stop--> Idle
//! ```
//!
//! While publishing, every raw fix passes through a [`FixFilter`] and is
//! written immediately if admitted. Source faults are reported as events and
//! the trip keeps running. The bus number is locked for the duration of a
//! trip.
//!
//! # Stop guarantee
//!
//! Every write happens under the publisher's session lock after checking the
//! trip's cancellation token. `stop` cancels the token under the same lock,
//! so once it returns no further write is attempted.

mod error;
mod events;
mod filter;

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use error::PublisherError;
pub use events::{
    format_trip_duration, PublisherEvent, PublisherState, PublisherStatus, TripSummary,
};
pub use filter::{DiscardReason, FixFilter};

use crate::channel::{BusId, LocationSink};
use crate::geo::Position;
use crate::source::{FixStream, PositionSource, RawFix, SourceError, WatchOptions};

/// Buffered events before slow listeners lag.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A running trip.
struct Trip {
    bus_id: BusId,
    started_at: Instant,
    cancellation: CancellationToken,
    last_position: Option<Position>,
    fixes_forwarded: u64,
    fixes_discarded: u64,
    source_errors: u64,
}

impl Trip {
    fn summary(&self) -> TripSummary {
        TripSummary {
            bus_id: self.bus_id.clone(),
            duration: self.started_at.elapsed(),
            fixes_forwarded: self.fixes_forwarded,
            fixes_discarded: self.fixes_discarded,
            source_errors: self.source_errors,
        }
    }
}

enum Session {
    Idle,
    Publishing(Trip),
}

struct PublisherInner {
    bus_id: Option<BusId>,
    session: Session,
}

impl PublisherInner {
    /// The trip owning `cancellation`, if it is still the active one.
    fn active_trip(&mut self, cancellation: &CancellationToken) -> Option<&mut Trip> {
        match &mut self.session {
            Session::Publishing(trip) if !cancellation.is_cancelled() => Some(trip),
            _ => None,
        }
    }
}

/// Driver-side publisher.
///
/// Cheap to clone; clones control the same session.
#[derive(Clone)]
pub struct ChannelPublisher {
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn LocationSink>,
    options: WatchOptions,
    inner: Arc<Mutex<PublisherInner>>,
    events: broadcast::Sender<PublisherEvent>,
}

impl ChannelPublisher {
    /// Create an idle publisher with default watch options.
    pub fn new(source: Arc<dyn PositionSource>, sink: Arc<dyn LocationSink>) -> Self {
        Self::with_options(source, sink, WatchOptions::default())
    }

    /// Create an idle publisher passing `options` to the source on start.
    pub fn with_options(
        source: Arc<dyn PositionSource>,
        sink: Arc<dyn LocationSink>,
        options: WatchOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            sink,
            options,
            inner: Arc::new(Mutex::new(PublisherInner {
                bus_id: None,
                session: Session::Idle,
            })),
            events,
        }
    }

    /// Set the bus number.
    ///
    /// # Errors
    ///
    /// - [`PublisherError::BusIdLocked`] while publishing
    /// - [`PublisherError::InvalidBusId`] if the input is blank
    pub fn set_bus_id(&self, raw: &str) -> Result<BusId, PublisherError> {
        let mut inner = self.inner.lock();
        if let Session::Publishing(trip) = &inner.session {
            return Err(PublisherError::BusIdLocked(trip.bus_id.to_string()));
        }
        let bus_id = BusId::new(raw)?;
        inner.bus_id = Some(bus_id.clone());
        Ok(bus_id)
    }

    /// Clear the bus number. Fails with `BusIdLocked` while publishing.
    pub fn clear_bus_id(&self) -> Result<(), PublisherError> {
        let mut inner = self.inner.lock();
        if let Session::Publishing(trip) = &inner.session {
            return Err(PublisherError::BusIdLocked(trip.bus_id.to_string()));
        }
        inner.bus_id = None;
        Ok(())
    }

    pub fn bus_id(&self) -> Option<BusId> {
        self.inner.lock().bus_id.clone()
    }

    pub fn is_publishing(&self) -> bool {
        matches!(self.inner.lock().session, Session::Publishing(_))
    }

    /// Subscribe to publisher events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PublisherEvent> {
        self.events.subscribe()
    }

    /// Current status for display.
    pub fn status(&self) -> PublisherStatus {
        let inner = self.inner.lock();
        match &inner.session {
            Session::Idle => PublisherStatus {
                state: PublisherState::Idle,
                bus_id: inner.bus_id.clone(),
                last_position: None,
                trip_duration: None,
            },
            Session::Publishing(trip) => PublisherStatus {
                state: PublisherState::Publishing,
                bus_id: Some(trip.bus_id.clone()),
                last_position: trip.last_position,
                trip_duration: Some(trip.started_at.elapsed()),
            },
        }
    }

    /// Start a trip. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`PublisherError::AlreadyPublishing`] if a trip is running
    /// - [`PublisherError::NoBusId`] if no bus number is set
    /// - [`PublisherError::CapabilityUnavailable`] if the source cannot watch
    pub fn start(&self) -> Result<(), PublisherError> {
        let mut inner = self.inner.lock();
        if let Session::Publishing(trip) = &inner.session {
            return Err(PublisherError::AlreadyPublishing(trip.bus_id.to_string()));
        }
        let bus_id = inner.bus_id.clone().ok_or(PublisherError::NoBusId)?;

        let stream = self.source.watch(self.options).map_err(|e| {
            warn!(source = self.source.name(), error = %e, "Position source unavailable");
            PublisherError::CapabilityUnavailable(e)
        })?;

        let cancellation = CancellationToken::new();
        inner.session = Session::Publishing(Trip {
            bus_id: bus_id.clone(),
            started_at: Instant::now(),
            cancellation: cancellation.clone(),
            last_position: None,
            fixes_forwarded: 0,
            fixes_discarded: 0,
            source_errors: 0,
        });

        let worker = TripWorker {
            bus_id: bus_id.clone(),
            sink: Arc::clone(&self.sink),
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
            filter: FixFilter::new(),
            cancellation,
        };
        info!(bus_id = %bus_id, source = self.source.name(), "Publishing started");
        // Started precedes every event from the worker
        let _ = self.events.send(PublisherEvent::Started { bus_id });
        tokio::spawn(worker.run(stream));
        drop(inner);
        Ok(())
    }

    /// Stop the trip. Returns its summary, or `None` if idle.
    ///
    /// No write is attempted after this returns, including for a fix that
    /// was being processed concurrently.
    pub fn stop(&self) -> Option<TripSummary> {
        let trip = {
            let mut inner = self.inner.lock();
            match std::mem::replace(&mut inner.session, Session::Idle) {
                Session::Idle => return None,
                Session::Publishing(trip) => {
                    trip.cancellation.cancel();
                    trip
                }
            }
        };

        let summary = trip.summary();
        info!(
            bus_id = %summary.bus_id,
            duration = %format_trip_duration(summary.duration),
            forwarded = summary.fixes_forwarded,
            discarded = summary.fixes_discarded,
            source_errors = summary.source_errors,
            "Publishing stopped"
        );
        let _ = self.events.send(PublisherEvent::Stopped {
            summary: summary.clone(),
        });
        Some(summary)
    }
}

/// The task that consumes one trip's fix stream.
struct TripWorker {
    bus_id: BusId,
    sink: Arc<dyn LocationSink>,
    inner: Arc<Mutex<PublisherInner>>,
    events: broadcast::Sender<PublisherEvent>,
    filter: FixFilter,
    cancellation: CancellationToken,
}

impl TripWorker {
    async fn run(mut self, mut stream: FixStream) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancellation.cancelled() => break,

                item = stream.next() => match item {
                    Some(Ok(fix)) => self.on_fix(fix),
                    Some(Err(error)) => self.on_source_error(error),
                    None => {
                        info!(bus_id = %self.bus_id, "Position source ended, waiting for stop");
                        self.cancellation.cancelled().await;
                        break;
                    }
                },
            }
        }
        debug!(bus_id = %self.bus_id, "Trip worker exited");
    }

    /// Events are sent while the session lock is held, so none can follow
    /// the `Stopped` event sent by `stop`.
    fn on_fix(&mut self, fix: RawFix) {
        let admitted = self.filter.admit(&fix);
        let mut inner = self.inner.lock();
        let Some(trip) = inner.active_trip(&self.cancellation) else {
            debug!(bus_id = %self.bus_id, "Dropping fix delivered after stop");
            return;
        };

        let event = match admitted {
            Ok(position) => {
                if self.sink.write_position(&self.bus_id, position) {
                    trip.fixes_forwarded += 1;
                    trip.last_position = Some(position);
                    debug!(bus_id = %self.bus_id, position = %position, "Fix forwarded");
                    PublisherEvent::Forwarded { position }
                } else {
                    trip.fixes_discarded += 1;
                    debug!(bus_id = %self.bus_id, "Fix superseded by a newer channel position");
                    PublisherEvent::Discarded {
                        reason: DiscardReason::Superseded,
                    }
                }
            }
            Err(reason) => {
                trip.fixes_discarded += 1;
                debug!(bus_id = %self.bus_id, reason = %reason, "Fix discarded");
                PublisherEvent::Discarded { reason }
            }
        };
        let _ = self.events.send(event);
        drop(inner);
    }

    fn on_source_error(&mut self, error: SourceError) {
        let mut inner = self.inner.lock();
        let Some(trip) = inner.active_trip(&self.cancellation) else {
            return;
        };
        trip.source_errors += 1;
        warn!(bus_id = %self.bus_id, error = %error, "Position source fault");
        let _ = self.events.send(PublisherEvent::SourceError { error });
        drop(inner);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::channel::LocationChannel;
    use crate::source::{ChannelSource, UnavailableSource};

    fn fix(secs: i64) -> RawFix {
        RawFix::new(
            40.0 + secs as f64 * 1e-4,
            -74.0,
            Utc.timestamp_opt(secs, 0).unwrap(),
            5.0,
        )
    }

    fn setup() -> (ChannelPublisher, crate::source::FixFeeder, LocationChannel) {
        let (source, feeder) = ChannelSource::new();
        let channel = LocationChannel::new();
        let publisher = ChannelPublisher::new(Arc::new(source), Arc::new(channel.clone()));
        (publisher, feeder, channel)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_start_requires_bus_id() {
        let (publisher, _feeder, _channel) = setup();
        assert_eq!(publisher.start(), Err(PublisherError::NoBusId));
        assert!(!publisher.is_publishing());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (publisher, _feeder, _channel) = setup();
        publisher.set_bus_id("12").unwrap();
        publisher.start().unwrap();
        assert_eq!(
            publisher.start(),
            Err(PublisherError::AlreadyPublishing("12".to_string()))
        );
        publisher.stop();
    }

    #[tokio::test]
    async fn test_unavailable_capability() {
        let channel = LocationChannel::new();
        let publisher = ChannelPublisher::new(Arc::new(UnavailableSource), Arc::new(channel));
        publisher.set_bus_id("12").unwrap();
        assert!(matches!(
            publisher.start(),
            Err(PublisherError::CapabilityUnavailable(_))
        ));
        assert!(!publisher.is_publishing());
    }

    #[tokio::test]
    async fn test_bus_id_locked_while_publishing() {
        let (publisher, _feeder, _channel) = setup();
        publisher.set_bus_id(" 12 ").unwrap();
        publisher.start().unwrap();

        assert_eq!(
            publisher.set_bus_id("13"),
            Err(PublisherError::BusIdLocked("12".to_string()))
        );
        assert!(publisher.clear_bus_id().is_err());

        publisher.stop();
        assert_eq!(publisher.set_bus_id("13").unwrap().as_str(), "13");
    }

    #[tokio::test]
    async fn test_forwards_valid_fixes_and_counts_discards() {
        let (publisher, feeder, channel) = setup();
        publisher.set_bus_id("12").unwrap();
        publisher.start().unwrap();

        feeder.push(fix(1));
        feeder.push(fix(2));
        feeder.push(fix(2));
        feeder.push(RawFix {
            accuracy_m: None,
            ..fix(3)
        });
        settle().await;

        let id = BusId::new("12").unwrap();
        assert_eq!(
            channel.last_position(&id).map(|p| p.captured_at()),
            fix(2).captured_at
        );
        let status = publisher.status();
        assert_eq!(status.state, PublisherState::Publishing);
        assert!(status.last_position.is_some());

        let summary = publisher.stop().unwrap();
        assert_eq!(summary.fixes_forwarded, 2);
        assert_eq!(summary.fixes_discarded, 2);
        assert_eq!(summary.source_errors, 0);
    }

    #[tokio::test]
    async fn test_source_errors_keep_trip_alive() {
        let (publisher, feeder, channel) = setup();
        publisher.set_bus_id("12").unwrap();
        publisher.start().unwrap();
        let mut events = publisher.subscribe_events();

        feeder.fail(SourceError::Timeout);
        feeder.fail(SourceError::PermissionDenied);
        feeder.push(fix(1));
        settle().await;

        assert!(publisher.is_publishing());
        assert!(matches!(
            events.recv().await,
            Ok(PublisherEvent::SourceError {
                error: SourceError::Timeout
            })
        ));
        assert!(channel.contains(&BusId::new("12").unwrap()));
        assert_eq!(publisher.stop().unwrap().source_errors, 2);
    }

    #[tokio::test]
    async fn test_no_write_after_stop() {
        let (publisher, feeder, channel) = setup();
        publisher.set_bus_id("12").unwrap();
        publisher.start().unwrap();
        feeder.push(fix(1));
        settle().await;

        let summary = publisher.stop().unwrap();
        feeder.push(fix(2));
        settle().await;

        let id = BusId::new("12").unwrap();
        assert_eq!(
            channel.last_position(&id).map(|p| p.captured_at()),
            fix(1).captured_at
        );
        assert_eq!(summary.fixes_forwarded, 1);
        assert!(publisher.stop().is_none());
        assert_eq!(publisher.status().state, PublisherState::Idle);
    }

    #[tokio::test]
    async fn test_source_end_keeps_publishing() {
        let (publisher, feeder, _channel) = setup();
        publisher.set_bus_id("12").unwrap();
        publisher.start().unwrap();
        feeder.close();
        settle().await;

        assert!(publisher.is_publishing());
        assert!(publisher.stop().is_some());
    }

    #[tokio::test]
    async fn test_events_started_and_stopped() {
        let (publisher, _feeder, _channel) = setup();
        let mut events = publisher.subscribe_events();
        publisher.set_bus_id("12").unwrap();
        publisher.start().unwrap();
        publisher.stop();

        assert!(matches!(events.recv().await, Ok(PublisherEvent::Started { .. })));
        assert!(matches!(events.recv().await, Ok(PublisherEvent::Stopped { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trip_events_bracketed_by_start_and_stop() {
        for _ in 0..20 {
            let (publisher, feeder, _channel) = setup();
            let mut events = publisher.subscribe_events();
            publisher.set_bus_id("12").unwrap();
            publisher.start().unwrap();

            for secs in 1..=100 {
                feeder.push(fix(secs));
            }
            tokio::task::yield_now().await;
            let summary = publisher.stop().unwrap();
            settle().await;

            let mut received = Vec::new();
            while let Ok(event) = events.try_recv() {
                received.push(event);
            }
            assert!(matches!(received.first(), Some(PublisherEvent::Started { .. })));
            assert!(matches!(received.last(), Some(PublisherEvent::Stopped { .. })));

            let forwarded = received
                .iter()
                .filter(|e| matches!(e, PublisherEvent::Forwarded { .. }))
                .count() as u64;
            assert_eq!(forwarded, summary.fixes_forwarded);
        }
    }
}
