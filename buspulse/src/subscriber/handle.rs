//! Background tracking task and its handle.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::session::{PositionOutcome, StatusChange, TrackingSession, TrackingStatus};
use crate::channel::{BusId, Subscription};
use crate::eta::{EtaEstimate, EtaEstimator};
use crate::geo::{GeoPoint, Position};

/// Buffered events per handle before slow event listeners lag.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Point-in-time view of a tracked bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub bus_id: BusId,
    pub status: TrackingStatus,
    pub latest: Option<Position>,
    /// Oldest first.
    pub history: Vec<Position>,
    pub target: Option<GeoPoint>,
    /// Present once a target is set.
    pub eta: Option<EtaEstimate>,
}

impl TrackingSnapshot {
    fn initial(bus_id: BusId, target: Option<GeoPoint>) -> Self {
        Self {
            bus_id,
            status: TrackingStatus::Connecting,
            latest: None,
            history: Vec::new(),
            target,
            eta: None,
        }
    }
}

/// Changes pushed to listeners of a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackingEvent {
    /// A newer position was accepted.
    Position { position: Position },
    /// The session changed status.
    StatusChanged(StatusChange),
    /// The ETA was recomputed.
    Eta { estimate: EtaEstimate },
}

#[derive(Debug)]
enum Command {
    SetTarget(Option<GeoPoint>),
}

/// Everything the tracking task owns.
pub(super) struct TrackingTask {
    pub(super) session: TrackingSession,
    pub(super) subscription: Subscription,
    pub(super) estimator: EtaEstimator,
    pub(super) target: Option<GeoPoint>,
    pub(super) tick_interval: Duration,
}

impl TrackingTask {
    /// Spawn the task and return its handle.
    pub(super) fn start(self) -> SubscriberHandle {
        let bus_id = self.session.bus_id().clone();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(TrackingSnapshot::initial(bus_id.clone(), self.target));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();

        let runner = TaskRunner {
            task: self,
            snapshot_tx,
            events_tx: events_tx.clone(),
            commands_rx,
            cancellation: cancellation.clone(),
            eta: None,
        };
        let join = tokio::spawn(runner.run());

        SubscriberHandle {
            bus_id,
            snapshot_rx,
            events_tx,
            commands_tx,
            cancellation,
            task: Some(join),
        }
    }
}

struct TaskRunner {
    task: TrackingTask,
    snapshot_tx: watch::Sender<TrackingSnapshot>,
    events_tx: broadcast::Sender<TrackingEvent>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    cancellation: CancellationToken,
    eta: Option<EtaEstimate>,
}

impl TaskRunner {
    async fn run(mut self) {
        let bus_id = self.task.session.bus_id().clone();
        info!(bus_id = %bus_id, "Tracking started");

        let mut ticker = tokio::time::interval(self.task.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Don't fire immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation.cancelled() => break,

                command = self.commands_rx.recv() => match command {
                    Some(Command::SetTarget(target)) => self.on_target(target),
                    None => break,
                },

                update = self.task.subscription.next_with_time() => match update {
                    Some((position, updated_at)) => self.on_position(position, updated_at),
                    None => {
                        debug!(bus_id = %bus_id, "Subscription ended");
                        break;
                    }
                },

                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.task.subscription.unsubscribe();
        if let Some(change) = self.task.session.stop() {
            self.emit(TrackingEvent::StatusChanged(change));
        }
        self.publish_snapshot();
        info!(bus_id = %bus_id, "Tracking stopped");
    }

    fn on_position(&mut self, position: Position, updated_at: Instant) {
        let now = Instant::now();
        match self.task.session.on_position_at(position, updated_at, now) {
            PositionOutcome::Ignored => {
                trace!(bus_id = %self.task.session.bus_id(), "Ignoring stale position");
            }
            PositionOutcome::Accepted(change) => {
                self.emit(TrackingEvent::Position { position });
                if let Some(change) = change {
                    self.log_change(change);
                    self.emit(TrackingEvent::StatusChanged(change));
                }
                self.recompute_eta();
                self.publish_snapshot();
            }
        }
    }

    fn on_tick(&mut self) {
        if let Some(change) = self.task.session.on_tick(Instant::now()) {
            self.log_change(change);
            self.emit(TrackingEvent::StatusChanged(change));
            self.publish_snapshot();
        }
    }

    fn on_target(&mut self, target: Option<GeoPoint>) {
        debug!(bus_id = %self.task.session.bus_id(), target = ?target, "Target changed");
        self.task.target = target;
        self.recompute_eta();
        self.publish_snapshot();
    }

    fn recompute_eta(&mut self) {
        let Some(target) = self.task.target else {
            self.eta = None;
            return;
        };
        let estimate = self
            .task
            .estimator
            .estimate(self.task.session.history_slice(), target);
        trace!(
            bus_id = %self.task.session.bus_id(),
            eta = %estimate,
            "ETA recomputed"
        );
        self.eta = Some(estimate);
        self.emit(TrackingEvent::Eta { estimate });
    }

    fn log_change(&self, change: StatusChange) {
        info!(
            bus_id = %self.task.session.bus_id(),
            from = %change.from,
            to = %change.to,
            "Tracking status changed"
        );
    }

    fn emit(&self, event: TrackingEvent) {
        // No listeners is fine
        let _ = self.events_tx.send(event);
    }

    fn publish_snapshot(&self) {
        let session = &self.task.session;
        self.snapshot_tx.send_replace(TrackingSnapshot {
            bus_id: session.bus_id().clone(),
            status: session.status(),
            latest: session.latest(),
            history: session.history().to_vec(),
            target: self.task.target,
            eta: self.eta,
        });
    }
}

/// Handle to a running tracking session.
///
/// Dropping the handle stops tracking in the background; call
/// [`stop`](Self::stop) to wait for the subscription to be released.
pub struct SubscriberHandle {
    bus_id: BusId,
    snapshot_rx: watch::Receiver<TrackingSnapshot>,
    events_tx: broadcast::Sender<TrackingEvent>,
    commands_tx: mpsc::UnboundedSender<Command>,
    cancellation: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SubscriberHandle {
    pub fn bus_id(&self) -> &BusId {
        &self.bus_id
    }

    /// Current view of the session.
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> TrackingStatus {
        self.snapshot_rx.borrow().status
    }

    pub fn latest(&self) -> Option<Position> {
        self.snapshot_rx.borrow().latest
    }

    pub fn history(&self) -> Vec<Position> {
        self.snapshot_rx.borrow().history.clone()
    }

    pub fn eta(&self) -> Option<EtaEstimate> {
        self.snapshot_rx.borrow().eta
    }

    /// Receiver that is notified on every snapshot change.
    pub fn watch_snapshot(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to pushed events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events_tx.subscribe()
    }

    /// Change the point the ETA is computed against. The ETA is recomputed
    /// immediately. Returns false if tracking has already stopped.
    pub fn set_target(&self, target: Option<GeoPoint>) -> bool {
        self.commands_tx.send(Command::SetTarget(target)).is_ok()
    }

    /// Whether the tracking task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop tracking and wait for the channel subscription to be released.
    ///
    /// Idempotent. Returns the final snapshot.
    pub async fn stop(&mut self) -> TrackingSnapshot {
        self.cancellation.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(bus_id = %self.bus_id, error = %e, "Tracking task failed");
            }
        }
        self.snapshot()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("bus_id", &self.bus_id)
            .field("status", &self.status())
            .finish()
    }
}
