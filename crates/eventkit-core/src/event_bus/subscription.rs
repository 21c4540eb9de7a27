//! Subscription handles.
//!
//! A [`Subscription`] is the value returned by every subscribe call. Releasing
//! it removes exactly the registration it was created for. Dropping it does
//! nothing; use [`Subscription::guard`] when the registration should end with
//! a scope.

use std::sync::Weak;
use uuid::Uuid;

use super::bus::Shared;
use super::listener::Entry;

/// Unique identifier for one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Handle for a single registration on one event.
///
/// Holds only weak references, so an outstanding handle keeps neither the bus
/// nor the listener alive.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    event: String,
    entry: Weak<Entry>,
    bus: Weak<Shared>,
}

impl Subscription {
    pub(crate) fn new(
        event: &str,
        entry: Weak<Entry>,
        id: SubscriptionId,
        bus: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            event: event.to_string(),
            entry,
            bus,
        }
    }

    /// Identifier of this registration.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The event this registration listens on.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// True while the listener can still be invoked.
    ///
    /// A one-shot registration turns inactive the moment it is claimed for its
    /// invocation.
    pub fn is_active(&self) -> bool {
        self.entry.upgrade().is_some_and(|entry| entry.is_live())
    }

    /// Remove this registration.
    ///
    /// Returns true only on the call that actually removed it; repeated calls,
    /// calls after a one-shot fired, and calls after the bus was dropped all
    /// return false.
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove_entry(&self.event, self.id),
            None => false,
        }
    }

    /// Tie the registration to a scope: it is removed when the guard drops.
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard(Some(self))
    }
}

/// Removes its subscription on drop.
#[derive(Debug)]
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard(Option<Subscription>);

impl SubscriptionGuard {
    /// The wrapped subscription.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.0.as_ref()
    }

    /// Give the subscription back without removing it.
    pub fn release(mut self) -> Option<Subscription> {
        self.0.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }
}
