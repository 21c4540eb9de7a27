//! # Event Bus Module
//!
//! A process-local publish/subscribe bus for decoupled communication between
//! application components.
//!
//! ## Overview
//!
//! - Publishers emit payloads by event name without knowing subscribers
//! - Listeners run synchronously on the publishing thread, in registration order
//! - A panicking listener is contained; the rest of the dispatch still runs
//! - Async consumers can poll every publish through [`EventBus::receiver`]
//!
//! ## Usage
//!
//! ```rust
//! use eventkit_core::event_bus::{event_bus, names};
//!
//! // Subscribe to value changes
//! let subscription = event_bus()
//!     .subscribe(names::DATA_UPDATED, |payload| {
//!         if let Some(value) = payload.downcast_ref::<u32>() {
//!             println!("Data updated: {}", value);
//!         }
//!     })
//!     .unwrap();
//!
//! // Publish an event
//! event_bus().publish(names::DATA_UPDATED, 42_u32).unwrap();
//!
//! // Unsubscribe when done
//! subscription.unsubscribe();
//! ```

mod bus;
mod events;
mod listener;
mod subscription;

pub use bus::*;
pub use events::*;
pub use listener::{Listener, Payload};
pub use subscription::{Subscription, SubscriptionGuard, SubscriptionId};
