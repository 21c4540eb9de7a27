//! Event Bus implementation.
//!
//! Provides the core EventBus struct and the replaceable global instance for
//! application-wide event distribution.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

use super::listener::{Entry, Listener, Payload};
use super::subscription::{Subscription, SubscriptionId};
use crate::error::{EventBusError, ListenerFailure, Result};

/// Default advisory limit of listeners per event.
pub const DEFAULT_MAX_LISTENERS: usize = 100;

/// Default capacity of the async tap.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Type alias for the injected listener-failure sink
type FailureHandler = Arc<dyn Fn(&ListenerFailure) + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Listener count per event above which a possible-leak warning is logged.
    /// Zero disables the warning.
    pub max_listeners: usize,
    /// Capacity of the broadcast channel behind [`EventBus::receiver`].
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_listeners: DEFAULT_MAX_LISTENERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A published event as seen by async receivers
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Event name.
    pub event: String,
    /// The payload handed to listeners.
    pub payload: Payload,
    /// When `publish` was called.
    pub published_at: DateTime<Utc>,
}

/// Registry shared between the bus and the handles it gives out
pub(crate) struct Shared {
    /// Event name to registrations, in invocation order
    registry: Mutex<HashMap<String, Vec<Arc<Entry>>>>,
    /// Advisory leak threshold
    max_listeners: AtomicUsize,
    /// Events that already logged a leak warning
    leak_warned: Mutex<HashSet<String>>,
    /// Optional sink for listener panics
    failure_handler: RwLock<Option<FailureHandler>>,
    /// Broadcast channel sender for async receivers
    sender: broadcast::Sender<Envelope>,
}

impl Shared {
    /// Remove one registration by id. Returns true if it was present.
    pub(crate) fn remove_entry(&self, event: &str, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let Some(entries) = registry.get_mut(event) else {
            return false;
        };
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };

        let entry = entries.remove(index);
        entry.retire();
        if entries.is_empty() {
            registry.remove(event);
        }
        tracing::debug!(event, "Subscription {} removed", id);
        true
    }

    fn report_failure(&self, failure: ListenerFailure) {
        tracing::error!(
            event = %failure.event,
            subscription = %failure.subscription,
            "Listener panicked: {}",
            failure.message
        );

        // Clone out so the handler may replace itself.
        let handler = self.failure_handler.read().clone();
        if let Some(handler) = handler {
            handler(&failure);
        }
    }
}

/// Central event bus for application-wide event distribution
///
/// Cloning an `EventBus` yields another handle to the same registry.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(HashMap::new()),
                max_listeners: AtomicUsize::new(config.max_listeners),
                leak_warned: Mutex::new(HashSet::new()),
                failure_handler: RwLock::new(None),
                sender,
            }),
            config,
        }
    }

    /// Subscribe a closure to an event.
    pub fn subscribe<F>(&self, event: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.register(event, Listener::new(listener), false)
    }

    /// Subscribe a closure that is removed right before its first invocation.
    pub fn subscribe_once<F>(&self, event: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.register(event, Listener::new(listener), true)
    }

    /// Subscribe an existing listener instance.
    ///
    /// Registering the same instance twice creates two independent entries.
    pub fn subscribe_listener(&self, event: &str, listener: &Listener) -> Result<Subscription> {
        self.register(event, listener.clone(), false)
    }

    /// One-shot variant of [`EventBus::subscribe_listener`].
    pub fn subscribe_listener_once(
        &self,
        event: &str,
        listener: &Listener,
    ) -> Result<Subscription> {
        self.register(event, listener.clone(), true)
    }

    fn register(&self, event: &str, listener: Listener, once: bool) -> Result<Subscription> {
        validate_event_name(event)?;

        let entry = Arc::new(Entry::new(listener, once));
        let id = entry.id;
        let weak_entry = Arc::downgrade(&entry);

        let count = {
            let mut registry = self.shared.registry.lock();
            let entries = registry.entry(event.to_string()).or_default();
            entries.push(entry);
            entries.len()
        };

        let max = self.max_listeners();
        if max > 0 && count > max && self.shared.leak_warned.lock().insert(event.to_string()) {
            tracing::warn!(
                event,
                count,
                max,
                "Possible listener leak: more than {} listeners on '{}'",
                max,
                event
            );
        }

        tracing::debug!(event, once, "Subscription {} added", id);
        Ok(Subscription::new(
            event,
            weak_entry,
            id,
            Arc::downgrade(&self.shared),
        ))
    }

    /// Publish a value to every listener of `event`.
    ///
    /// Returns the number of listeners invoked, including any that panicked.
    pub fn publish<T>(&self, event: &str, payload: T) -> Result<usize>
    where
        T: Any + Send + Sync,
    {
        self.publish_payload(event, Payload::new(payload))
    }

    /// Publish with no payload.
    pub fn publish_empty(&self, event: &str) -> Result<usize> {
        self.publish_payload(event, Payload::empty())
    }

    /// Publish an already wrapped payload.
    ///
    /// The listener list is copied before the first invocation, so listeners
    /// added during this dispatch only see later publishes. Removal is checked
    /// per invocation: a listener removed mid-dispatch is skipped.
    pub fn publish_payload(&self, event: &str, payload: Payload) -> Result<usize> {
        validate_event_name(event)?;

        // Never hold the lock while a listener runs.
        let snapshot: Vec<Arc<Entry>> = self
            .shared
            .registry
            .lock()
            .get(event)
            .cloned()
            .unwrap_or_default();

        tracing::trace!(event, listeners = snapshot.len(), "Dispatching event");

        let mut invoked = 0;
        for entry in &snapshot {
            if entry.once {
                if !entry.retire() {
                    continue;
                }
                self.shared.remove_entry(event, entry.id);
            } else if !entry.is_live() {
                continue;
            }

            invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.listener.call(&payload)));
            if let Err(panic) = outcome {
                self.shared.report_failure(ListenerFailure {
                    event: event.to_string(),
                    subscription: entry.id,
                    message: panic_message(panic.as_ref()),
                });
            }
        }

        if self.shared.sender.receiver_count() > 0 {
            // Lagging or departed receivers are their own concern.
            let _ = self.shared.sender.send(Envelope {
                event: event.to_string(),
                payload,
                published_at: Utc::now(),
            });
        }

        Ok(invoked)
    }

    /// Remove the most recent registration of `listener` on `event`.
    ///
    /// Returns true if a registration was removed.
    pub fn unsubscribe(&self, event: &str, listener: &Listener) -> bool {
        let id = {
            let registry = self.shared.registry.lock();
            registry.get(event).and_then(|entries| {
                entries
                    .iter()
                    .rev()
                    .find(|entry| entry.listener.same_as(listener))
                    .map(|entry| entry.id)
            })
        };

        match id {
            Some(id) => self.shared.remove_entry(event, id),
            None => false,
        }
    }

    /// Clear one event's listeners, or every event's when `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let removed: Vec<Arc<Entry>> = {
            let mut registry = self.shared.registry.lock();
            match event {
                Some(event) => registry.remove(event).unwrap_or_default(),
                None => registry.drain().flat_map(|(_, entries)| entries).collect(),
            }
        };

        for entry in &removed {
            entry.retire();
        }
        {
            let mut warned = self.shared.leak_warned.lock();
            match event {
                Some(event) => {
                    warned.remove(event);
                }
                None => warned.clear(),
            }
        }
        tracing::debug!(
            event = event.unwrap_or("*"),
            removed = removed.len(),
            "Listeners cleared"
        );
    }

    /// Number of listeners registered for `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared
            .registry
            .lock()
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Whether `event` has at least one listener
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    /// Names of all events with at least one listener, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.registry.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of active subscriptions across all events
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().values().map(Vec::len).sum()
    }

    /// Current advisory leak threshold
    pub fn max_listeners(&self) -> usize {
        self.shared.max_listeners.load(Ordering::Relaxed)
    }

    /// Change the advisory leak threshold; zero disables the warning
    pub fn set_max_listeners(&self, max: usize) {
        self.shared.max_listeners.store(max, Ordering::Relaxed);
    }

    /// Install the sink that receives listener panics
    pub fn set_failure_handler<F>(&self, handler: F)
    where
        F: Fn(&ListenerFailure) + Send + Sync + 'static,
    {
        *self.shared.failure_handler.write() = Some(Arc::new(handler));
    }

    /// Remove the listener-failure sink; panics are then only logged
    pub fn clear_failure_handler(&self) {
        *self.shared.failure_handler.write() = None;
    }

    /// Get a receiver for manual event polling
    ///
    /// Useful when handling an event needs async work: receive it in a tokio
    /// task instead of blocking the dispatch.
    pub fn receiver(&self) -> broadcast::Receiver<Envelope> {
        self.shared.sender.subscribe()
    }

    /// Get the configuration this bus was created with
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// True if both handles point at the same registry
    pub fn same_bus(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

fn validate_event_name(event: &str) -> Result<()> {
    if event.is_empty() {
        return Err(EventBusError::EmptyEventName);
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Global event bus slot
static EVENT_BUS: OnceLock<RwLock<EventBus>> = OnceLock::new();

fn global_slot() -> &'static RwLock<EventBus> {
    EVENT_BUS.get_or_init(|| RwLock::new(EventBus::new()))
}

/// Get the global event bus, creating it on first access
///
/// This is the primary way to access the event bus throughout the application.
/// The returned handle stays valid even if another bus is installed later.
pub fn event_bus() -> EventBus {
    global_slot().read().clone()
}

/// Replace the global event bus, returning the previous one
pub fn install_event_bus(bus: EventBus) -> EventBus {
    let previous = std::mem::replace(&mut *global_slot().write(), bus);
    tracing::debug!("Global event bus replaced");
    previous
}

/// Replace the global event bus with a fresh one built from `config`
pub fn init_event_bus(config: EventBusConfig) -> EventBus {
    install_event_bus(EventBus::with_config(config))
}

/// Drop every listener on the global event bus
pub fn reset_event_bus() {
    event_bus().remove_all_listeners(None);
}

/// Convenience macro to publish an event to the global event bus
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::event_bus::event_bus().publish_empty($event)
    };
    ($event:expr, $payload:expr) => {
        $crate::event_bus::event_bus().publish($event, $payload)
    };
}

/// Convenience macro to subscribe to events on the global event bus
#[macro_export]
macro_rules! on_event {
    ($event:expr, $handler:expr) => {
        $crate::event_bus::event_bus().subscribe($event, $handler)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<String>>);

    impl LogBuffer {
        fn lock(&self) -> parking_lot::MutexGuard<'_, String> {
            self.0.lock()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().push_str(&String::from_utf8_lossy(buf));
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs() -> (LogBuffer, impl tracing::Subscriber + Send + Sync) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        (logs, subscriber)
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |name: &str| {
                let log = log.clone();
                let name = name.to_string();
                Listener::new(move |_| log.lock().push(name.clone()))
            }
        };
        (log, make)
    }

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.max_listeners(), DEFAULT_MAX_LISTENERS);
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();

        let sub = bus.subscribe("data:loaded", |_| {}).expect("subscribe");
        assert_eq!(bus.subscriber_count(), 1);

        assert!(sub.unsubscribe());
        assert_eq!(bus.subscriber_count(), 0);

        // Double unsubscribe should return false
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_invocation_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        for name in ["a", "b", "c", "d"] {
            bus.subscribe_listener("data:updated", &make(name))
                .expect("subscribe");
        }

        assert_eq!(bus.publish("data:updated", ()).expect("publish"), 4);
        assert_eq!(*log.lock(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_payload_passthrough() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        bus.subscribe("counter:value_changed", move |payload| {
            *s.lock() = payload.downcast_ref::<i64>().copied();
        })
        .expect("subscribe");

        bus.publish("counter:value_changed", 5_i64).expect("publish");
        assert_eq!(*seen.lock(), Some(5));
    }

    #[test]
    fn test_publish_without_listeners() {
        let bus = EventBus::new();
        assert_eq!(bus.publish_empty("nobody:listens").expect("publish"), 0);
        assert!(!bus.has_listeners("nobody:listens"));
    }

    #[test]
    fn test_events_are_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.subscribe("user:logged_in", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .expect("subscribe");

        bus.publish_empty("user:logged_out").expect("publish");
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.publish_empty("user:logged_in").expect("publish");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_event_name_rejected() {
        let bus = EventBus::new();

        assert_eq!(
            bus.subscribe("", |_| {}).unwrap_err(),
            EventBusError::EmptyEventName
        );
        assert_eq!(
            bus.subscribe_once("", |_| {}).unwrap_err(),
            EventBusError::EmptyEventName
        );
        assert_eq!(
            bus.publish("", 1_u8).unwrap_err(),
            EventBusError::EmptyEventName
        );
        assert_eq!(bus.subscriber_count(), 0);

        // Removal with an empty name is a harmless no-op.
        assert!(!bus.unsubscribe("", &Listener::new(|_| {})));
        bus.remove_all_listeners(Some(""));
    }

    #[test]
    fn test_unsubscribe_by_listener_identity() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");

        bus.subscribe_listener("data:loaded", &a).expect("subscribe");
        bus.subscribe_listener("data:loaded", &b).expect("subscribe");

        assert!(bus.unsubscribe("data:loaded", &a));
        assert!(!bus.unsubscribe("data:loaded", &a));
        assert!(!bus.unsubscribe("unknown", &b));

        bus.publish_empty("data:loaded").expect("publish");
        assert_eq!(*log.lock(), vec!["b"]);
    }

    #[test]
    fn test_duplicate_registration_is_independent() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");

        let first = bus.subscribe_listener("data:loaded", &a).expect("subscribe");
        let second = bus.subscribe_listener("data:loaded", &a).expect("subscribe");
        assert_ne!(first.id(), second.id());

        bus.publish_empty("data:loaded").expect("publish");
        assert_eq!(log.lock().len(), 2);

        // Identity removal takes one entry at a time.
        assert!(bus.unsubscribe("data:loaded", &a));
        assert_eq!(bus.listener_count("data:loaded"), 1);
        assert!(first.is_active());
        assert!(!second.is_active());
    }

    #[test]
    fn test_empty_channels_are_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("data:loaded", |_| {}).expect("subscribe");
        assert_eq!(bus.event_names(), vec!["data:loaded".to_string()]);

        sub.unsubscribe();
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_leak_warning_is_advisory() {
        let (logs, subscriber) = captured_logs();
        let bus = EventBus::with_config(EventBusConfig {
            max_listeners: 2,
            ..Default::default()
        });

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..5 {
                bus.subscribe("data:updated", |_| {}).expect("subscribe");
            }
        });
        assert_eq!(bus.listener_count("data:updated"), 5);
        assert_eq!(logs.lock().matches("Possible listener leak").count(), 1);

        bus.set_max_listeners(0);
        bus.subscribe("data:updated", |_| {}).expect("subscribe");
        assert_eq!(bus.listener_count("data:updated"), 6);
    }

    #[test]
    fn test_leak_warning_after_lowering_threshold() {
        let (logs, subscriber) = captured_logs();
        let bus = EventBus::new();

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                bus.subscribe("data:loaded", |_| {}).expect("subscribe");
            }
            assert!(!logs.lock().contains("Possible listener leak"));

            bus.set_max_listeners(1);
            bus.subscribe("data:loaded", |_| {}).expect("subscribe");
            bus.subscribe("data:loaded", |_| {}).expect("subscribe");
        });

        assert_eq!(logs.lock().matches("Possible listener leak").count(), 1);
    }

    #[test]
    fn test_unlimited_max_listeners() {
        let (logs, subscriber) = captured_logs();
        let bus = EventBus::with_config(EventBusConfig {
            max_listeners: usize::MAX,
            ..Default::default()
        });

        tracing::subscriber::with_default(subscriber, || {
            bus.subscribe("data:loaded", |_| {}).expect("subscribe");
            bus.subscribe("data:loaded", |_| {}).expect("subscribe");
        });

        assert_eq!(bus.listener_count("data:loaded"), 2);
        assert!(!logs.lock().contains("Possible listener leak"));
    }

    #[test]
    fn test_failure_handler_receives_panics() {
        let bus = EventBus::new();
        let failures = Arc::new(Mutex::new(Vec::new()));

        let f = failures.clone();
        bus.set_failure_handler(move |failure| f.lock().push(failure.clone()));

        let sub = bus
            .subscribe("app:error", |_| panic!("listener exploded"))
            .expect("subscribe");
        bus.publish_empty("app:error").expect("publish");

        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].event, "app:error");
        assert_eq!(failures[0].subscription, sub.id());
        assert_eq!(failures[0].message, "listener exploded");
    }

    #[test]
    fn test_cleared_failure_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        bus.set_failure_handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.clear_failure_handler();

        bus.subscribe("app:error", |_| panic!("ignored"))
            .expect("subscribe");
        assert_eq!(bus.publish_empty("app:error").expect("publish"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42_u32), "non-string panic payload");
    }

    #[test]
    fn test_clones_share_registry() {
        let bus = EventBus::new();
        let other = bus.clone();
        assert!(bus.same_bus(&other));
        assert!(!bus.same_bus(&EventBus::new()));

        other.subscribe("data:loaded", |_| {}).expect("subscribe");
        assert_eq!(bus.listener_count("data:loaded"), 1);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        bus.publish("counter:value_changed", 7_i64).expect("publish");

        let envelope = receiver.try_recv().expect("envelope");
        assert_eq!(envelope.event, "counter:value_changed");
        assert_eq!(envelope.payload.downcast_ref::<i64>(), Some(&7));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EventBusConfig =
            serde_json::from_str(r#"{ "max_listeners": 10 }"#).expect("config");
        assert_eq!(config.max_listeners, 10);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }
}
