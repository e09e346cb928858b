//! Bus Pulse - live bus location sync and ETA estimation.
//!
//! A driver's device publishes its position under a bus number; students
//! subscribe to the same bus number and watch it approach with an estimated
//! time of arrival.
//!
//! ```text
//! PositionSource ─► ChannelPublisher ─► LocationChannel ─► ChannelSubscriber ─► EtaEstimator
//! ```
//!
//! # Modules
//!
//! - [`source`] - device location capability and a route simulator
//! - [`publisher`] - driver side: filtered fixes into channel writes
//! - [`channel`] - keyed last-write-wins publish/subscribe store
//! - [`subscriber`] - student side: live tracking with staleness detection
//! - [`eta`] - median-speed arrival estimates
//! - [`app`] - lifecycle owner wiring the above together

pub mod app;
pub mod channel;
pub mod config;
pub mod eta;
pub mod geo;
pub mod logging;
pub mod publisher;
pub mod source;
pub mod subscriber;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
