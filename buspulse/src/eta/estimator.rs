//! Median-speed ETA estimation.

use std::cmp::Ordering;

use serde::Serialize;

use super::format::format_eta;
use crate::geo::{distance_m, GeoPoint, Position};

/// Default upper bound for a plausible bus speed (144 km/h).
pub const DEFAULT_MAX_SPEED_MPS: f64 = 40.0;

/// Default speed below which the bus is treated as stopped.
pub const DEFAULT_MIN_SPEED_MPS: f64 = 0.1;

/// Default number of valid steps required for high confidence.
pub const DEFAULT_HIGH_CONFIDENCE_SAMPLES: usize = 4;

/// Default high-confidence horizon, in median step lengths.
pub const DEFAULT_HORIZON_STEPS: f64 = 20.0;

/// How much an estimate can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}

/// Result of one estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaEstimate {
    /// Seconds until arrival, absent when there is not enough data or the bus
    /// is not moving.
    pub eta_seconds: Option<f64>,
    pub confidence: Confidence,
    /// Effective speed used for the estimate.
    pub speed_mps: Option<f64>,
    /// Great-circle distance from the latest position to the target.
    pub remaining_meters: Option<f64>,
}

impl EtaEstimate {
    /// An estimate with nothing known.
    pub fn unknown() -> Self {
        Self {
            eta_seconds: None,
            confidence: Confidence::Low,
            speed_mps: None,
            remaining_meters: None,
        }
    }

    /// Whether an arrival time is available.
    pub fn is_known(&self) -> bool {
        self.eta_seconds.is_some()
    }

    /// Human-readable arrival time, e.g. `"4 min"` or `"unknown"`.
    pub fn display(&self) -> String {
        format_eta(self.eta_seconds)
    }
}

impl Default for EtaEstimate {
    fn default() -> Self {
        Self::unknown()
    }
}

impl std::fmt::Display for EtaEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} confidence)", self.display(), self.confidence)
    }
}

/// Estimator tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EtaConfig {
    /// Steps faster than this are treated as GPS jumps and discarded.
    pub max_speed_mps: f64,
    /// Effective speeds below this produce no ETA.
    pub min_speed_mps: f64,
    /// Valid steps required before an estimate can be high confidence.
    pub high_confidence_samples: usize,
    /// High confidence also requires the remaining distance to be within
    /// this many median step lengths.
    pub horizon_steps: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            max_speed_mps: DEFAULT_MAX_SPEED_MPS,
            min_speed_mps: DEFAULT_MIN_SPEED_MPS,
            high_confidence_samples: DEFAULT_HIGH_CONFIDENCE_SAMPLES,
            horizon_steps: DEFAULT_HORIZON_STEPS,
        }
    }
}

/// One consecutive pair of positions that passed the plausibility checks.
#[derive(Debug, Clone, Copy)]
struct Step {
    distance_m: f64,
    speed_mps: f64,
}

/// Derives an [`EtaEstimate`] from a short position history.
///
/// Pure and deterministic: identical inputs give bit-identical outputs.
/// Never fails; degenerate input yields an estimate with no arrival time.
#[derive(Debug, Clone, Default)]
pub struct EtaEstimator {
    config: EtaConfig,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EtaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EtaConfig {
        &self.config
    }

    /// Estimate the arrival time at `target`.
    ///
    /// `history` must be ordered oldest first.
    pub fn estimate(&self, history: &[Position], target: GeoPoint) -> EtaEstimate {
        let Some(latest) = history.last() else {
            return EtaEstimate::unknown();
        };
        let remaining = distance_m(&latest.point(), &target);

        if history.len() < 2 {
            return EtaEstimate {
                remaining_meters: Some(remaining),
                ..EtaEstimate::unknown()
            };
        }

        let (steps, discarded) = self.valid_steps(history);
        let Some(speed) = median(steps.iter().map(|s| s.speed_mps)) else {
            return EtaEstimate {
                remaining_meters: Some(remaining),
                ..EtaEstimate::unknown()
            };
        };

        if speed < self.config.min_speed_mps {
            return EtaEstimate {
                eta_seconds: None,
                confidence: Confidence::Low,
                speed_mps: Some(speed),
                remaining_meters: Some(remaining),
            };
        }

        let confidence = self.confidence(&steps, discarded, remaining);
        EtaEstimate {
            eta_seconds: Some(remaining / speed),
            confidence,
            speed_mps: Some(speed),
            remaining_meters: Some(remaining),
        }
    }

    fn valid_steps(&self, history: &[Position]) -> (Vec<Step>, usize) {
        let mut steps = Vec::with_capacity(history.len().saturating_sub(1));
        let mut discarded = 0;

        for pair in history.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let elapsed_ms = (b.captured_at() - a.captured_at()).num_milliseconds();
            if elapsed_ms <= 0 {
                discarded += 1;
                continue;
            }
            let distance = distance_m(&a.point(), &b.point());
            let speed = distance / (elapsed_ms as f64 / 1000.0);
            if !speed.is_finite() || speed < 0.0 || speed > self.config.max_speed_mps {
                tracing::debug!(
                    speed_mps = speed,
                    max_speed_mps = self.config.max_speed_mps,
                    "Discarding implausible step"
                );
                discarded += 1;
                continue;
            }
            steps.push(Step {
                distance_m: distance,
                speed_mps: speed,
            });
        }

        (steps, discarded)
    }

    fn confidence(&self, steps: &[Step], discarded: usize, remaining: f64) -> Confidence {
        let median_step = median(steps.iter().map(|s| s.distance_m)).unwrap_or(0.0);
        let within_horizon = remaining < self.config.horizon_steps * median_step;

        if steps.len() >= self.config.high_confidence_samples && discarded == 0 && within_horizon
        {
            Confidence::High
        } else if steps.len() >= 2 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Median of the values; the mean of the middle pair for even counts.
fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64, secs: i64) -> Position {
        Position::from_millis(lat, lon, secs * 1000).unwrap()
    }

    fn target(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    /// Straight northbound run at ~11.1 m/s, one fix every 10 s.
    fn steady(count: usize) -> Vec<Position> {
        (0..count)
            .map(|i| pos(40.0 + i as f64 * 0.001, -74.0, i as i64 * 10))
            .collect()
    }

    #[test]
    fn test_empty_history_is_unknown() {
        let est = EtaEstimator::new().estimate(&[], target(40.01, -74.0));
        assert_eq!(est, EtaEstimate::unknown());
        assert_eq!(est.display(), "unknown");
    }

    #[test]
    fn test_single_sample_is_low_with_distance() {
        let est = EtaEstimator::new().estimate(&steady(1), target(40.01, -74.0));
        assert!(est.eta_seconds.is_none());
        assert_eq!(est.confidence, Confidence::Low);
        let remaining = est.remaining_meters.unwrap();
        assert!((remaining - 1111.9).abs() < 1.0, "got {}", remaining);
    }

    #[test]
    fn test_two_samples_reference_case() {
        let history = [pos(40.0, -74.0, 0), pos(40.001, -74.0, 10)];
        let estimator = EtaEstimator::new();
        let est = estimator.estimate(&history, target(40.01, -74.0));

        let speed = est.speed_mps.unwrap();
        assert!((speed - 11.12).abs() < 0.01, "got {}", speed);
        let eta = est.eta_seconds.unwrap();
        assert!((eta - 90.0).abs() < 0.5, "got {}", eta);
        assert_eq!(est.confidence, Confidence::Low);
        assert_eq!(est.display(), "2 min");

        // Bit-identical on repeat
        let again = estimator.estimate(&history, target(40.01, -74.0));
        assert_eq!(
            est.eta_seconds.unwrap().to_bits(),
            again.eta_seconds.unwrap().to_bits()
        );
    }

    #[test]
    fn test_medium_with_few_samples() {
        let est = EtaEstimator::new().estimate(&steady(3), target(40.05, -74.0));
        assert_eq!(est.confidence, Confidence::Medium);
    }

    #[test]
    fn test_high_within_horizon() {
        // 5 samples, 4 steps of ~111 m, target ~1 km past the last fix
        let est = EtaEstimator::new().estimate(&steady(5), target(40.013, -74.0));
        assert_eq!(est.confidence, Confidence::High);
    }

    #[test]
    fn test_far_target_is_not_high() {
        let est = EtaEstimator::new().estimate(&steady(5), target(41.0, -74.0));
        assert_eq!(est.confidence, Confidence::Medium);
        assert!(est.is_known());
    }

    #[test]
    fn test_outlier_is_excluded_and_caps_confidence() {
        let mut history = steady(6);
        // 5 km jump in 10 s
        history.push(pos(40.05, -74.0, 60));
        let estimator = EtaEstimator::new();
        let est = estimator.estimate(&history, target(40.06, -74.0));

        let speed = est.speed_mps.unwrap();
        assert!(speed < DEFAULT_MAX_SPEED_MPS);
        assert!((speed - 11.12).abs() < 0.01, "got {}", speed);
        assert!(est.confidence <= Confidence::Medium);
    }

    #[test]
    fn test_zero_speed_has_no_eta() {
        let history = [pos(40.0, -74.0, 0), pos(40.0, -74.0, 10), pos(40.0, -74.0, 20)];
        let est = EtaEstimator::new().estimate(&history, target(40.01, -74.0));
        assert!(est.eta_seconds.is_none());
        assert_eq!(est.confidence, Confidence::Low);
        assert_eq!(est.speed_mps, Some(0.0));
    }

    #[test]
    fn test_equal_timestamps_are_discarded() {
        let history = [pos(40.0, -74.0, 10), pos(40.001, -74.0, 10)];
        let est = EtaEstimator::new().estimate(&history, target(40.01, -74.0));
        assert!(est.eta_seconds.is_none());
        assert!(est.speed_mps.is_none());
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median([3.0, 1.0, 2.0].into_iter()), Some(2.0));
        assert_eq!(median([4.0, 1.0, 3.0, 2.0].into_iter()), Some(2.5));
        assert_eq!(median(std::iter::empty()), None);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(EtaEstimate::unknown()).unwrap();
        assert_eq!(json["etaSeconds"], serde_json::Value::Null);
        assert_eq!(json["confidence"], "low");
    }
}
