//! Well-known event names and typed channels.
//!
//! The bus itself is untyped. [`Channel`] pairs an event name with the payload
//! type its publishers agree on, so listeners receive `&T` instead of
//! downcasting by hand.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::marker::PhantomData;

use super::bus::EventBus;
use super::listener::Payload;
use super::subscription::Subscription;
use crate::error::Result;

/// Event name constants to avoid string literals
pub mod names {
    /// Application finished starting up.
    pub const APP_INITIALIZED: &str = "app:initialized";
    /// Application-level error.
    pub const APP_ERROR: &str = "app:error";

    /// A user signed in.
    pub const USER_LOGGED_IN: &str = "user:logged_in";
    /// A user signed out.
    pub const USER_LOGGED_OUT: &str = "user:logged_out";

    /// Data finished loading.
    pub const DATA_LOADED: &str = "data:loaded";
    /// Data changed.
    pub const DATA_UPDATED: &str = "data:updated";
    /// Loading or updating data failed.
    pub const DATA_ERROR: &str = "data:error";

    /// Show a notification; payload is a `Notification`.
    pub const NOTIFICATION_SHOW: &str = "notification:show";
    /// Hide a notification; payload is its id.
    pub const NOTIFICATION_HIDE: &str = "notification:hide";

    pub const COUNTER_INCREMENT: &str = "counter:increment";
    pub const COUNTER_DECREMENT: &str = "counter:decrement";
    pub const COUNTER_RESET: &str = "counter:reset";
    /// New counter value; payload is an `i64`.
    pub const COUNTER_VALUE_CHANGED: &str = "counter:value_changed";
}

/// An event name bound to a payload type.
pub struct Channel<T> {
    name: &'static str,
    _payload: PhantomData<fn(T)>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Channel<T> {}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Channel({})", self.name)
    }
}

impl<T: Any + Send + Sync> Channel<T> {
    /// Bind `name` to payload type `T`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    /// The underlying event name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Subscribe with a typed listener.
    ///
    /// Payloads of another type are skipped with a warning. On a `Channel<()>`
    /// an empty payload counts as `()`.
    pub fn subscribe<F>(&self, bus: &EventBus, listener: F) -> Result<Subscription>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let name = self.name;
        bus.subscribe(name, move |payload| deliver::<T, F>(name, payload, &listener))
    }

    /// Typed one-shot subscription. Payloads are matched as in
    /// [`Channel::subscribe`]; a skipped mismatched payload still uses up the
    /// single invocation.
    pub fn subscribe_once<F>(&self, bus: &EventBus, listener: F) -> Result<Subscription>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let name = self.name;
        bus.subscribe_once(name, move |payload| deliver::<T, F>(name, payload, &listener))
    }

    /// Publish a typed payload.
    pub fn publish(&self, bus: &EventBus, value: T) -> Result<usize> {
        bus.publish(self.name, value)
    }
}

/// Hand `payload` to a typed listener, or log and skip it.
fn deliver<T, F>(name: &'static str, payload: &Payload, listener: &F)
where
    T: Any,
    F: Fn(&T),
{
    if let Some(value) = payload.downcast_ref::<T>() {
        listener(value);
    } else if payload.is_empty() && TypeId::of::<T>() == TypeId::of::<()>() {
        if let Some(unit) = (&() as &dyn Any).downcast_ref::<T>() {
            listener(unit);
        }
    } else {
        tracing::warn!(
            event = name,
            expected = std::any::type_name::<T>(),
            "Payload type mismatch, listener skipped"
        );
    }
}

pub const APP_INITIALIZED: Channel<()> = Channel::new(names::APP_INITIALIZED);
/// Carries a human-readable error description.
pub const APP_ERROR: Channel<String> = Channel::new(names::APP_ERROR);

pub const NOTIFICATION_SHOW: Channel<Notification> = Channel::new(names::NOTIFICATION_SHOW);
pub const NOTIFICATION_HIDE: Channel<String> = Channel::new(names::NOTIFICATION_HIDE);

pub const COUNTER_INCREMENT: Channel<()> = Channel::new(names::COUNTER_INCREMENT);
pub const COUNTER_DECREMENT: Channel<()> = Channel::new(names::COUNTER_DECREMENT);
pub const COUNTER_RESET: Channel<()> = Channel::new(names::COUNTER_RESET);
pub const COUNTER_VALUE_CHANGED: Channel<i64> = Channel::new(names::COUNTER_VALUE_CHANGED);

/// Default time a notification stays visible.
pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 5000;

/// Notification severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Info => write!(f, "info"),
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Warning => write!(f, "warning"),
            NotificationKind::Error => write!(f, "error"),
        }
    }
}

/// Payload of `notification:show`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short random id, used by `notification:hide`.
    pub id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Auto-hide delay; `None` keeps the notification until hidden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Notification {
    /// Create a notification with a fresh id and the default duration
    pub fn new(message: impl Into<String>, kind: NotificationKind) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..7].to_string();
        Self {
            id,
            message: message.into(),
            kind,
            duration_ms: Some(DEFAULT_NOTIFICATION_DURATION_MS),
        }
    }

    /// Override the auto-hide delay
    pub fn with_duration(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Publish a notification on `bus`, returning its id
pub fn show_notification(
    bus: &EventBus,
    message: impl Into<String>,
    kind: NotificationKind,
    duration_ms: Option<u64>,
) -> Result<String> {
    let notification = Notification::new(message, kind).with_duration(duration_ms);
    let id = notification.id.clone();
    NOTIFICATION_SHOW.publish(bus, notification)?;
    Ok(id)
}

/// Ask listeners to hide the notification with `id`
pub fn hide_notification(bus: &EventBus, id: impl Into<String>) -> Result<usize> {
    NOTIFICATION_HIDE.publish(bus, id.into())
}
