//! EventKit Settings Crate
//!
//! Handles configuration files for the event bus and the application's logging.

pub mod config;
pub mod error;

pub use config::{LoggingSettings, Settings, CONFIG_FILE_NAME};
pub use error::{ConfigError, SettingsError, SettingsResult};
