//! Tracking session state machine.
//!
//! ```text
//! Connecting --first position--> Live --no update for stale_timeout--> Stale
//!                                  ^                                     |
//!                                  +-----------update resumes------------+
//!
//! Connecting --replayed position older than stale_timeout--> Stale
//! Connecting | Live | Stale --stop--> Stopped (terminal)
//! ```
//!
//! The session is a plain value driven by the tracking task; all time comes
//! in as arguments so it can be tested without a runtime.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::history::SampleHistory;
use crate::channel::BusId;
use crate::geo::Position;

/// Where a tracking session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    /// Subscribed, no position received yet.
    Connecting,
    /// Updates are arriving.
    Live,
    /// No update for longer than the stale timeout.
    Stale,
    /// Tracking ended; no further updates are processed.
    Stopped,
}

impl TrackingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingStatus::Stopped)
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrackingStatus::Connecting => "connecting",
            TrackingStatus::Live => "live",
            TrackingStatus::Stale => "stale",
            TrackingStatus::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// A status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: TrackingStatus,
    pub to: TrackingStatus,
}

/// Outcome of feeding a position to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    /// Position entered the history. Carries the status change, if any.
    Accepted(Option<StatusChange>),
    /// Not newer than the latest position, or the session is stopped.
    Ignored,
}

/// Subscriber-side view of one bus.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    bus_id: BusId,
    status: TrackingStatus,
    history: SampleHistory,
    last_update_at: Option<Instant>,
    stale_timeout: Duration,
}

impl TrackingSession {
    pub fn new(bus_id: BusId, history_capacity: usize, stale_timeout: Duration) -> Self {
        Self {
            bus_id,
            status: TrackingStatus::Connecting,
            history: SampleHistory::new(history_capacity),
            last_update_at: None,
            stale_timeout,
        }
    }

    pub fn bus_id(&self) -> &BusId {
        &self.bus_id
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn latest(&self) -> Option<Position> {
        self.history.latest().copied()
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    /// History as a contiguous slice, oldest first.
    pub fn history_slice(&mut self) -> &[Position] {
        self.history.as_slice()
    }

    /// Feed a position received fresh at `now`.
    pub fn on_position(&mut self, position: Position, now: Instant) -> PositionOutcome {
        self.on_position_at(position, now, now)
    }

    /// Feed a position the channel accepted at `updated_at`, observed at `now`.
    ///
    /// The staleness clock starts from `updated_at`, so a replayed position
    /// that is already older than the stale timeout leaves the session Stale
    /// rather than Live.
    pub fn on_position_at(
        &mut self,
        position: Position,
        updated_at: Instant,
        now: Instant,
    ) -> PositionOutcome {
        if self.status.is_terminal() || !self.history.record(position) {
            return PositionOutcome::Ignored;
        }
        self.last_update_at = Some(updated_at);
        let status = if self.is_expired(updated_at, now) {
            TrackingStatus::Stale
        } else {
            TrackingStatus::Live
        };
        PositionOutcome::Accepted(self.transition(status))
    }

    /// Check staleness at `now`.
    ///
    /// Only a Live session can go stale; a bus that never published stays
    /// Connecting.
    pub fn on_tick(&mut self, now: Instant) -> Option<StatusChange> {
        if self.status != TrackingStatus::Live {
            return None;
        }
        let last = self.last_update_at?;
        if self.is_expired(last, now) {
            self.transition(TrackingStatus::Stale)
        } else {
            None
        }
    }

    fn is_expired(&self, updated_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(updated_at) >= self.stale_timeout
    }

    /// Move to Stopped. Returns None if already stopped.
    pub fn stop(&mut self) -> Option<StatusChange> {
        self.transition(TrackingStatus::Stopped)
    }

    fn transition(&mut self, to: TrackingStatus) -> Option<StatusChange> {
        if self.status == to {
            return None;
        }
        let from = self.status;
        self.status = to;
        Some(StatusChange { from, to })
    }
}
