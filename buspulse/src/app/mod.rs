//! Application bootstrap and lifecycle management.
//!
//! [`BusPulseApp`] owns the one location channel for the process, runs its
//! retention janitor, and creates publishers and tracking sessions bound to
//! it.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     BusPulseApp                      │
//! │                                                      │
//! │  ChannelPublisher ──► LocationChannel ──► Subscriber │
//! │   (PositionSource)      └── janitor       └── ETA    │
//! └──────────────────────────────────────────────────────┘
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::BusPulseApp;
pub use config::AppConfig;
pub use error::AppError;
