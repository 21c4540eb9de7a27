//! Listener and payload primitives.
//!
//! The bus never inspects what it forwards: a [`Payload`] is an opaque,
//! cheaply cloneable box that listeners downcast to the type they expect for
//! their channel. A [`Listener`] is a shareable callback whose identity is the
//! allocation it points to, so the same instance can later be removed with
//! [`EventBus::unsubscribe`](super::EventBus::unsubscribe).

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::subscription::SubscriptionId;

/// Opaque event payload passed from a publisher to every listener.
#[derive(Clone, Default)]
pub struct Payload(Option<Arc<dyn Any + Send + Sync>>);

impl Payload {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// A payload carrying nothing, used by `publish_empty`.
    pub fn empty() -> Self {
        Self(None)
    }

    /// True when the publisher supplied no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the value as `T` if that is what was published.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    /// Check the payload type without borrowing it.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Payload(..)"),
            None => f.write_str("Payload(empty)"),
        }
    }
}

/// Type alias for listener callbacks
type ListenerFn = dyn Fn(&Payload) + Send + Sync;

/// A registered callback.
///
/// Cloning a `Listener` yields the same instance: clones compare equal under
/// [`Listener::same_as`] and unsubscribe each other's registrations.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    /// Create a listener from a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, payload: &Payload) {
        (self.0)(payload)
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// One registration in the registry.
///
/// `live` flips to false exactly once: on removal, or when a one-shot entry is
/// claimed for its single invocation.
pub(crate) struct Entry {
    pub(crate) id: SubscriptionId,
    pub(crate) listener: Listener,
    pub(crate) once: bool,
    live: AtomicBool,
}

impl Entry {
    pub(crate) fn new(listener: Listener, once: bool) -> Self {
        Self {
            id: SubscriptionId::new(),
            listener,
            once,
            live: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Mark dead. Returns whether this call was the one that did it.
    pub(crate) fn retire(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_downcast() {
        let payload = Payload::new(5_i64);
        assert!(!payload.is_empty());
        assert_eq!(payload.downcast_ref::<i64>(), Some(&5));
        assert!(payload.downcast_ref::<String>().is_none());
        assert!(payload.is::<i64>());
    }

    #[test]
    fn test_empty_payload() {
        let payload = Payload::empty();
        assert!(payload.is_empty());
        assert!(payload.downcast_ref::<()>().is_none());
        assert_eq!(format!("{:?}", payload), "Payload(empty)");
    }

    #[test]
    fn test_listener_identity() {
        let a = Listener::new(|_| {});
        let b = Listener::new(|_| {});
        let a2 = a.clone();

        assert!(a.same_as(&a2));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_entry_retires_once() {
        let entry = Entry::new(Listener::new(|_| {}), true);
        assert!(entry.is_live());
        assert!(entry.retire());
        assert!(!entry.retire());
        assert!(!entry.is_live());
    }
}
