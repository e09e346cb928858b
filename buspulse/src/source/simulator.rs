//! Simulated bus driving toward a stop.
//!
//! Emits one fix per interval, advancing along the great-circle heading from
//! the start point toward the destination at a constant speed. Once the
//! destination is reached the bus parks there and keeps reporting.
//!
//! Timestamps are derived from the watch start time plus whole intervals, so
//! a simulated trip is reproducible and strictly increasing regardless of
//! scheduler jitter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use tokio::time::Instant;

use super::{FixStream, PositionSource, RawFix, SourceError, WatchOptions};
use crate::geo::{bearing_deg, destination_point, distance_m, GeoPoint};

/// Default simulated accuracy in meters.
const DEFAULT_ACCURACY_M: f64 = 5.0;

/// Configuration for a simulated trip.
#[derive(Debug, Clone)]
pub struct RouteSimulatorConfig {
    /// Where the bus starts.
    pub from: GeoPoint,
    /// Where the bus is heading.
    pub to: GeoPoint,
    /// Constant ground speed in meters per second.
    pub speed_mps: f64,
    /// Time between fixes.
    pub interval: Duration,
    /// Reported accuracy of each fix.
    pub accuracy_m: f64,
    /// Go silent after this many fixes (simulates a lost signal).
    pub stall_after: Option<u64>,
}

impl RouteSimulatorConfig {
    /// Create a config with a 10 m/s bus reporting every second.
    pub fn new(from: GeoPoint, to: GeoPoint) -> Self {
        Self {
            from,
            to,
            speed_mps: 10.0,
            interval: Duration::from_secs(1),
            accuracy_m: DEFAULT_ACCURACY_M,
            stall_after: None,
        }
    }

    /// Set the ground speed.
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = speed_mps;
        self
    }

    /// Set the interval between fixes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop emitting after `fixes` fixes.
    pub fn with_stall_after(mut self, fixes: u64) -> Self {
        self.stall_after = Some(fixes);
        self
    }
}

/// A [`PositionSource`] that drives a straight line.
#[derive(Debug, Clone)]
pub struct RouteSimulator {
    config: RouteSimulatorConfig,
}

impl RouteSimulator {
    /// Create a simulator.
    pub fn new(config: RouteSimulatorConfig) -> Self {
        Self { config }
    }

    /// Position after `step` intervals.
    pub fn point_at(&self, step: u64) -> GeoPoint {
        let total = distance_m(&self.config.from, &self.config.to);
        let travelled = self.config.speed_mps * self.config.interval.as_secs_f64() * step as f64;
        if travelled <= 0.0 {
            return self.config.from;
        }
        if travelled >= total {
            return self.config.to;
        }
        let bearing = bearing_deg(&self.config.from, &self.config.to);
        destination_point(&self.config.from, bearing, travelled)
    }
}

struct SimState {
    simulator: RouteSimulator,
    started_at: DateTime<Utc>,
    origin: Instant,
    step: u64,
}

impl PositionSource for RouteSimulator {
    fn name(&self) -> &str {
        "simulator"
    }

    fn watch(&self, _options: WatchOptions) -> Result<FixStream, SourceError> {
        if !self.config.speed_mps.is_finite() || self.config.speed_mps < 0.0 {
            return Err(SourceError::Unavailable(format!(
                "invalid simulated speed {}",
                self.config.speed_mps
            )));
        }
        if self.config.interval.is_zero() {
            return Err(SourceError::Unavailable(
                "simulated interval must be non-zero".to_string(),
            ));
        }

        let state = SimState {
            simulator: self.clone(),
            started_at: Utc::now(),
            origin: Instant::now(),
            step: 0,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            let config = &state.simulator.config;
            if config.stall_after.is_some_and(|limit| state.step >= limit) {
                tracing::debug!(step = state.step, "Simulated source stalled");
                futures::future::pending::<()>().await;
            }

            let offset = config
                .interval
                .saturating_mul(u32::try_from(state.step).unwrap_or(u32::MAX));
            tokio::time::sleep_until(state.origin + offset).await;

            let point = state.simulator.point_at(state.step);
            let captured_at = state.started_at
                + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero());
            let fix = RawFix::new(
                point.latitude(),
                point.longitude(),
                captured_at,
                config.accuracy_m,
            );

            state.step += 1;
            Some((Ok(fix), state))
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_point_at_progresses_and_parks() {
        let sim = RouteSimulator::new(
            RouteSimulatorConfig::new(point(40.0, -74.0), point(40.01, -74.0))
                .with_speed(100.0)
                .with_interval(Duration::from_secs(1)),
        );

        assert_eq!(sim.point_at(0), point(40.0, -74.0));
        let after_one = sim.point_at(1);
        let d = distance_m(&point(40.0, -74.0), &after_one);
        assert!((d - 100.0).abs() < 0.5, "got {}", d);

        // ~1112m route at 100 m/s: parked by step 20
        assert_eq!(sim.point_at(20), point(40.01, -74.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_timestamps_increase_by_interval() {
        let sim = RouteSimulator::new(
            RouteSimulatorConfig::new(point(40.0, -74.0), point(40.01, -74.0))
                .with_interval(Duration::from_millis(500)),
        );
        let mut stream = sim.watch(WatchOptions::default()).unwrap();

        let a = stream.next().await.unwrap().unwrap();
        let b = stream.next().await.unwrap().unwrap();
        let c = stream.next().await.unwrap().unwrap();

        let ab = b.captured_at.unwrap() - a.captured_at.unwrap();
        let bc = c.captured_at.unwrap() - b.captured_at.unwrap();
        assert_eq!(ab.num_milliseconds(), 500);
        assert_eq!(bc.num_milliseconds(), 500);
        assert_eq!(a.accuracy_m, Some(DEFAULT_ACCURACY_M));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_after_goes_silent() {
        let sim = RouteSimulator::new(
            RouteSimulatorConfig::new(point(40.0, -74.0), point(40.01, -74.0)).with_stall_after(2),
        );
        let mut stream = sim.watch(WatchOptions::default()).unwrap();
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());

        let third = tokio::time::timeout(Duration::from_secs(60), stream.next()).await;
        assert!(third.is_err(), "stalled stream should not yield");
    }

    #[test]
    fn test_invalid_speed_is_unavailable() {
        let sim = RouteSimulator::new(
            RouteSimulatorConfig::new(point(40.0, -74.0), point(40.01, -74.0)).with_speed(-1.0),
        );
        assert!(matches!(
            sim.watch(WatchOptions::default()),
            Err(SourceError::Unavailable(_))
        ));
    }
}
