//! # EventKit
//!
//! A process-local publish/subscribe event bus.
//!
//! ## Architecture
//!
//! EventKit is organized as a workspace:
//!
//! 1. **eventkit-core** - The event bus, listeners, subscriptions, typed channels
//! 2. **eventkit-settings** - Configuration files for the bus and logging
//! 3. **eventkit** - Logging setup, the demo consumers and the binary
//!
//! The demo consumers in [`demo`] mirror how UI components use the bus: they
//! never reference each other, only event names.

pub mod demo;

pub use eventkit_core::{
    event_bus, init_event_bus, install_event_bus, names, reset_event_bus, show_notification,
    Channel, Envelope, EventBus, EventBusConfig, EventBusError, Listener, ListenerFailure,
    Notification, NotificationKind, Payload, Subscription, SubscriptionGuard, SubscriptionId,
};
pub use eventkit_settings::{LoggingSettings, Settings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support, falling back to `settings.filter`
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
