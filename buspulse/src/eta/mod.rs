//! Estimated time of arrival from a bus's recent positions.
//!
//! The estimator takes the median of per-step speeds over a short history,
//! discarding steps that are physically implausible (non-positive elapsed
//! time or faster than [`EtaConfig::max_speed_mps`]). Confidence reflects how
//! much clean data backs the estimate and how far the target is.

mod estimator;
mod format;

pub use estimator::{
    Confidence, EtaConfig, EtaEstimate, EtaEstimator, DEFAULT_HIGH_CONFIDENCE_SAMPLES,
    DEFAULT_HORIZON_STEPS, DEFAULT_MAX_SPEED_MPS, DEFAULT_MIN_SPEED_MPS,
};
pub use format::format_eta;
