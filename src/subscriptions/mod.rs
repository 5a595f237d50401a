//! Notification bus for applied store mutations.
//!
//! Every update the reconciler applies is re-emitted under a consumer-visible
//! event name to all registered instances:
//! - `txNew` for new transactions
//! - `txConfirmed` for confirmations
//! - `milestones` for milestone confirmations
//! - `txReattaches` for reattachments
//!
//! Delivery is synchronous, in registration order, to the handlers registered
//! at emission time. Nothing is buffered or replayed.
//!
//! # Example
//!
//! ```ignore
//! let bus = NotificationBus::new();
//! let instance = bus.register();
//!
//! let disposer = instance.on(EventName::TxNew, Arc::new(|update: &TxUpdate| {
//!     println!("new transaction {}", update.hash());
//! }));
//!
//! // Later
//! disposer.dispose();
//! ```

mod manager;
mod types;

pub use manager::{Disposer, InstanceHandlers, NotificationBus};
pub use types::{EventName, Handler, HandlerId, InstanceId, SubscriptionHandle};
