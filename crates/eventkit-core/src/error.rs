//! Error handling for EventKit
//!
//! Two kinds of failure exist on the bus:
//! - [`EventBusError`]: rejected calls (returned synchronously to the caller)
//! - [`ListenerFailure`]: a listener panicked during dispatch (reported to the
//!   failure handler, never to the publisher or to other listeners)

use thiserror::Error;

use crate::event_bus::SubscriptionId;

/// Error types for event bus operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Event names are channel keys and must contain at least one character.
    #[error("Event name must not be empty")]
    EmptyEventName,
}

/// A listener that panicked while an event was being dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener {subscription} on '{event}' panicked: {message}")]
pub struct ListenerFailure {
    /// The event being dispatched when the listener failed.
    pub event: String,
    /// The registration that failed.
    pub subscription: SubscriptionId,
    /// The panic message, if it carried a string.
    pub message: String,
}

/// Result type alias for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
