//! Configuration file support.
//!
//! Settings are read from `~/.buspulse/config.ini`; any missing section or
//! key falls back to its default.
//!
//! # Example
//!
//! ```no_run
//! use buspulse::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let channel_config = config.channel_config();
//! # Ok::<(), buspulse::config::ConfigFileError>(())
//! ```

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ChannelSettings, ConfigFile, EtaSettings, SourceSettings, SubscriberSettings};
