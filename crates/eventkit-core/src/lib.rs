//! # EventKit Core
//!
//! A process-local publish/subscribe event bus.
//! Components exchange payloads by event name through a shared [`EventBus`]
//! without holding references to each other.

pub mod error;
pub mod event_bus;

pub use error::{EventBusError, ListenerFailure, Result};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, init_event_bus, install_event_bus, names, reset_event_bus, show_notification,
    Channel, Envelope, EventBus, EventBusConfig, Listener, Notification, NotificationKind,
    Payload, Subscription, SubscriptionGuard, SubscriptionId,
};
