//! Error types for the location channel.

use thiserror::Error;

/// Errors from the location channel.
///
/// The channel never fails on well-formed input; the only failure is a key
/// that cannot identify a bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The bus identifier is empty or whitespace-only.
    #[error("Invalid bus identifier: '{0}'")]
    InvalidKey(String),
}
