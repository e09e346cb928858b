//! Application error types.

use std::fmt;

use crate::channel::ChannelError;
use crate::config::ConfigFileError;

/// Errors that can occur during application lifecycle.
#[derive(Debug)]
pub enum AppError {
    /// Configuration file could not be loaded.
    Config(ConfigFileError),

    /// A bus identifier was rejected by the channel.
    Channel(ChannelError),

    /// Started outside a Tokio runtime.
    RuntimeUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Channel(e) => write!(f, "Location channel error: {}", e),
            AppError::RuntimeUnavailable(msg) => {
                write!(f, "No Tokio runtime available: {}", msg)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Channel(e) => Some(e),
            AppError::RuntimeUnavailable(_) => None,
        }
    }
}

impl From<ConfigFileError> for AppError {
    fn from(e: ConfigFileError) -> Self {
        AppError::Config(e)
    }
}

impl From<ChannelError> for AppError {
    fn from(e: ChannelError) -> Self {
        AppError::Channel(e)
    }
}
