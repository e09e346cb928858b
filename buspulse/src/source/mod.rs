//! Position sources: the device's location-sensing capability.
//!
//! A [`PositionSource`] produces a lazy, infinite, non-restartable stream of
//! raw fixes while a trip is active. Each call to [`PositionSource::watch`]
//! starts a fresh stream; a stream that has been dropped cannot be resumed.
//!
//! # Implementations
//!
//! - [`ChannelSource`] - fixes are pushed in by the embedder through a
//!   [`FixFeeder`] (platform geolocation callbacks, tests)
//! - [`RouteSimulator`] - a bus driving in a straight line toward a stop
//! - [`UnavailableSource`] - a device with no location capability at all
//!
//! # Example
//!
//! ```ignore
//! let (source, feeder) = ChannelSource::new();
//! let mut fixes = source.watch(WatchOptions::default())?;
//!
//! feeder.push(RawFix::now(40.7128, -74.0060, 5.0));
//! while let Some(fix) = fixes.next().await {
//!     // ...
//! }
//! ```

mod error;
mod fix;
mod simulator;

pub use error::SourceError;
pub use fix::{RawFix, WatchOptions, DEFAULT_WATCH_TIMEOUT};
pub use simulator::{RouteSimulator, RouteSimulatorConfig};

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A stream of raw fixes or transient source faults.
pub type FixStream = BoxStream<'static, Result<RawFix, SourceError>>;

/// The device's location-sensing capability.
pub trait PositionSource: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Start watching the device position.
    ///
    /// Fails if the device cannot provide positions at all. Transient faults
    /// after a successful start are yielded inside the stream.
    fn watch(&self, options: WatchOptions) -> Result<FixStream, SourceError>;
}

type FixSender = mpsc::UnboundedSender<Result<RawFix, SourceError>>;

/// A source fed by the embedder.
///
/// The paired [`FixFeeder`] pushes fixes into whichever stream is currently
/// being watched. Starting a new watch closes the previous stream.
pub struct ChannelSource {
    current: Arc<Mutex<Option<FixSender>>>,
}

/// Push handle for a [`ChannelSource`].
#[derive(Clone)]
pub struct FixFeeder {
    current: Arc<Mutex<Option<FixSender>>>,
}

impl ChannelSource {
    /// Create a source and its feeder.
    pub fn new() -> (Self, FixFeeder) {
        let current = Arc::new(Mutex::new(None));
        (
            Self {
                current: Arc::clone(&current),
            },
            FixFeeder { current },
        )
    }
}

impl PositionSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    fn watch(&self, _options: WatchOptions) -> Result<FixStream, SourceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock() = Some(tx);
        Ok(receiver_stream(rx))
    }
}

impl FixFeeder {
    /// Deliver a fix to the active stream.
    ///
    /// Returns false if nothing is watching.
    pub fn push(&self, fix: RawFix) -> bool {
        self.send(Ok(fix))
    }

    /// Deliver a transient fault to the active stream.
    pub fn fail(&self, error: SourceError) -> bool {
        self.send(Err(error))
    }

    /// End the active stream, as a device would when its watch is torn down.
    pub fn close(&self) {
        self.current.lock().take();
    }

    /// Whether a stream is currently being watched.
    pub fn is_watched(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, item: Result<RawFix, SourceError>) -> bool {
        match self.current.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

/// A device without any location capability.
#[derive(Debug, Clone, Default)]
pub struct UnavailableSource;

impl PositionSource for UnavailableSource {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn watch(&self, _options: WatchOptions) -> Result<FixStream, SourceError> {
        Err(SourceError::Unavailable(
            "geolocation is not supported on this device".to_string(),
        ))
    }
}

fn receiver_stream(
    rx: mpsc::UnboundedReceiver<Result<RawFix, SourceError>>,
) -> FixStream {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}
