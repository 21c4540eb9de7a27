//! Demo consumers of the event bus.
//!
//! These are the terminal counterparts of the counter and notification
//! widgets: each one talks to the others only through event names. Every
//! consumer holds [`SubscriptionGuard`]s, so dropping it unsubscribes.

use chrono::Local;
use eventkit_core::event_bus::{
    self as bus, EventBus, Notification, SubscriptionGuard, COUNTER_DECREMENT, COUNTER_INCREMENT,
    COUNTER_RESET, COUNTER_VALUE_CHANGED, NOTIFICATION_HIDE, NOTIFICATION_SHOW,
};
use eventkit_core::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Entries kept by [`CounterLogger`]
pub const LOGGER_CAPACITY: usize = 10;

/// Publishes counter changes. Holds its own value; nobody reads it directly.
#[derive(Debug)]
pub struct CounterControls {
    bus: EventBus,
    value: i64,
}

impl CounterControls {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            bus: bus.clone(),
            value: 0,
        }
    }

    pub fn increment(&mut self) -> Result<()> {
        self.value += 1;
        COUNTER_INCREMENT.publish(&self.bus, ())?;
        COUNTER_VALUE_CHANGED.publish(&self.bus, self.value)?;
        Ok(())
    }

    pub fn decrement(&mut self) -> Result<()> {
        self.value -= 1;
        COUNTER_DECREMENT.publish(&self.bus, ())?;
        COUNTER_VALUE_CHANGED.publish(&self.bus, self.value)?;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.value = 0;
        COUNTER_RESET.publish(&self.bus, ())?;
        COUNTER_VALUE_CHANGED.publish(&self.bus, 0)?;
        Ok(())
    }
}

/// Shows the last published counter value.
#[derive(Debug)]
pub struct CounterDisplay {
    value: Arc<AtomicI64>,
    _subscription: SubscriptionGuard,
}

impl CounterDisplay {
    pub fn new(bus: &EventBus) -> Result<Self> {
        let value = Arc::new(AtomicI64::new(0));
        let v = value.clone();
        let subscription = COUNTER_VALUE_CHANGED
            .subscribe(bus, move |new_value| v.store(*new_value, Ordering::SeqCst))?
            .guard();

        Ok(Self {
            value,
            _subscription: subscription,
        })
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Records every counter event, newest first.
#[derive(Debug)]
pub struct CounterLogger {
    entries: Arc<Mutex<VecDeque<String>>>,
    _subscriptions: Vec<SubscriptionGuard>,
}

impl CounterLogger {
    pub fn new(bus: &EventBus) -> Result<Self> {
        let entries = Arc::new(Mutex::new(VecDeque::with_capacity(LOGGER_CAPACITY)));

        let subscriptions = vec![
            COUNTER_INCREMENT
                .subscribe(bus, log_to(&entries, |_: &()| "Counter incremented".to_string()))?
                .guard(),
            COUNTER_DECREMENT
                .subscribe(bus, log_to(&entries, |_: &()| "Counter decremented".to_string()))?
                .guard(),
            COUNTER_RESET
                .subscribe(bus, log_to(&entries, |_: &()| "Counter reset".to_string()))?
                .guard(),
            COUNTER_VALUE_CHANGED
                .subscribe(
                    bus,
                    log_to(&entries, |value: &i64| {
                        format!("Counter value changed to {}", value)
                    }),
                )?
                .guard(),
        ];

        Ok(Self {
            entries,
            _subscriptions: subscriptions,
        })
    }

    /// Logged lines, newest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().iter().cloned().collect()
    }
}

fn log_to<T, F>(
    entries: &Arc<Mutex<VecDeque<String>>>,
    describe: F,
) -> impl Fn(&T) + Send + Sync + 'static
where
    T: 'static,
    F: Fn(&T) -> String + Send + Sync + 'static,
{
    let entries = entries.clone();
    move |payload: &T| {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), describe(payload));
        tracing::info!("{}", line);
        let mut entries = entries.lock();
        entries.push_front(line);
        entries.truncate(LOGGER_CAPACITY);
    }
}

/// Keeps the notifications currently on screen.
#[derive(Debug)]
pub struct NotificationCenter {
    active: Arc<Mutex<Vec<Notification>>>,
    _subscriptions: Vec<SubscriptionGuard>,
}

impl NotificationCenter {
    pub fn new(bus: &EventBus) -> Result<Self> {
        let active = Arc::new(Mutex::new(Vec::new()));

        let shown = active.clone();
        let show = NOTIFICATION_SHOW
            .subscribe(bus, move |notification: &Notification| {
                tracing::info!(
                    id = %notification.id,
                    kind = %notification.kind,
                    "{}",
                    notification.message
                );
                shown.lock().push(notification.clone());
            })?
            .guard();

        let hidden = active.clone();
        let hide = NOTIFICATION_HIDE
            .subscribe(bus, move |id: &String| {
                hidden.lock().retain(|notification| &notification.id != id);
            })?
            .guard();

        Ok(Self {
            active,
            _subscriptions: vec![show, hide],
        })
    }

    pub fn active(&self) -> Vec<Notification> {
        self.active.lock().clone()
    }

    /// Close a notification locally, as the close button would.
    pub fn dismiss(&self, id: &str) {
        self.active.lock().retain(|notification| notification.id != id);
    }
}

/// Hide notifications once their duration elapses.
///
/// Listeners must not block, so the timers run in a tokio task fed by the
/// bus's async receiver. The task runs until aborted.
pub fn spawn_notification_expiry(bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = bus.receiver();
    let publisher = bus.clone();

    tokio::spawn(async move {
        loop {
            let envelope = match receiver.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification expiry lagged behind the bus");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if envelope.event != NOTIFICATION_SHOW.name() {
                continue;
            }
            let Some(notification) = envelope.payload.downcast_ref::<Notification>() else {
                continue;
            };
            let Some(duration_ms) = notification.duration_ms else {
                continue;
            };

            let id = notification.id.clone();
            let publisher = publisher.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                if let Err(err) = bus::hide_notification(&publisher, id) {
                    tracing::error!("Failed to hide notification: {}", err);
                }
            });
        }
    })
}
