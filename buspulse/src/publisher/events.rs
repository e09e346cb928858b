//! Publisher events, status, and trip summaries.

use std::time::Duration;

use serde::Serialize;

use super::filter::DiscardReason;
use crate::channel::BusId;
use crate::geo::Position;
use crate::source::SourceError;

/// Publishing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherState {
    Idle,
    Publishing,
}

/// What the driver dashboard shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherStatus {
    pub state: PublisherState,
    pub bus_id: Option<BusId>,
    /// Last position written during the current trip.
    pub last_position: Option<Position>,
    /// Time since the current trip started.
    pub trip_duration: Option<Duration>,
}

/// Totals for one publishing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripSummary {
    pub bus_id: BusId,
    pub duration: Duration,
    pub fixes_forwarded: u64,
    pub fixes_discarded: u64,
    pub source_errors: u64,
}

impl std::fmt::Display for TripSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bus {} trip {}: {} forwarded, {} discarded, {} source errors",
            self.bus_id,
            format_trip_duration(self.duration),
            self.fixes_forwarded,
            self.fixes_discarded,
            self.source_errors
        )
    }
}

/// Events broadcast by a [`ChannelPublisher`](super::ChannelPublisher).
#[derive(Debug, Clone, PartialEq)]
pub enum PublisherEvent {
    Started { bus_id: BusId },
    Forwarded { position: Position },
    Discarded { reason: DiscardReason },
    /// Non-fatal; the trip keeps running.
    SourceError { error: SourceError },
    Stopped { summary: TripSummary },
}

/// Render a trip duration as `m:ss`.
///
/// Minutes are not wrapped into hours: 75 minutes renders as `75:00`.
pub fn format_trip_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_trip_duration() {
        assert_eq!(format_trip_duration(Duration::ZERO), "0:00");
        assert_eq!(format_trip_duration(Duration::from_millis(59_999)), "0:59");
        assert_eq!(format_trip_duration(Duration::from_secs(61)), "1:01");
        assert_eq!(format_trip_duration(Duration::from_secs(75 * 60)), "75:00");
    }

    #[test]
    fn test_trip_summary_display() {
        let summary = TripSummary {
            bus_id: BusId::new("12").unwrap(),
            duration: Duration::from_secs(125),
            fixes_forwarded: 10,
            fixes_discarded: 2,
            source_errors: 1,
        };
        assert_eq!(
            summary.to_string(),
            "bus 12 trip 2:05: 10 forwarded, 2 discarded, 1 source errors"
        );
    }
}
