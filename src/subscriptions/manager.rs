//! Notification bus fanning updates out to every registered instance.

use crate::types::TxUpdate;
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::types::{EventName, Handler, HandlerId, InstanceId, SubscriptionHandle};

/// Handlers registered by one instance, per event name, in registration order.
pub struct InstanceHandlers {
    id: InstanceId,
    events: RwLock<HashMap<EventName, Vec<(HandlerId, Handler)>>>,
    next_handler: AtomicU64,
}

impl InstanceHandlers {
    fn new(id: InstanceId) -> Self {
        Self {
            id,
            events: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Register `handler` for `event`. The returned disposer removes exactly it.
    pub fn on(self: &Arc<Self>, event: EventName, handler: Handler) -> Disposer {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::SeqCst));
        self.events
            .write()
            .entry(event)
            .or_default()
            .push((id, handler));

        Disposer {
            owner: Arc::downgrade(self),
            event,
            handler: id,
        }
    }

    /// Feed `event` into a bounded channel instead of a callback.
    ///
    /// When the buffer is full the update is dropped for this receiver only.
    pub fn subscribe_channel(self: &Arc<Self>, event: EventName, buffer: usize) -> SubscriptionHandle {
        let (sender, receiver) = bounded(buffer.max(1));
        let instance = self.id;
        let disposer = self.on(
            event,
            Arc::new(move |update: &TxUpdate| match sender.try_send(update.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(instance = instance.0, %event, hash = %update.hash(), "subscriber buffer full; dropping update");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }),
        );

        SubscriptionHandle {
            event,
            receiver,
            disposer,
        }
    }

    /// Call this instance's handlers for `event`, in registration order.
    ///
    /// Handlers run outside the lock so they may register or dispose handlers.
    pub fn emit(&self, event: EventName, update: &TxUpdate) {
        let handlers: Vec<Handler> = match self.events.read().get(&event) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        for handler in handlers {
            handler(update);
        }
    }

    pub fn handler_count(&self, event: EventName) -> usize {
        self.events.read().get(&event).map_or(0, Vec::len)
    }

    fn remove(&self, event: EventName, handler: HandlerId) {
        if let Some(list) = self.events.write().get_mut(&event) {
            list.retain(|(id, _)| *id != handler);
        }
    }
}

/// Removes one handler. Disposing twice is a no-op; dropping does not dispose.
#[derive(Clone)]
pub struct Disposer {
    owner: Weak<InstanceHandlers>,
    event: EventName,
    handler: HandlerId,
}

impl Disposer {
    pub fn dispose(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.remove(self.event, self.handler);
        }
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler
    }
}

/// Manages instances and broadcasts updates to all of them.
///
/// Instances register once and stay registered for the bus's lifetime.
pub struct NotificationBus {
    /// Registered instances, in registration order.
    instances: RwLock<Vec<Arc<InstanceHandlers>>>,
    /// Counter for generating instance IDs.
    next_id: AtomicU64,
}

impl NotificationBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new instance.
    pub fn register(&self) -> Arc<InstanceHandlers> {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let instance = Arc::new(InstanceHandlers::new(id));
        self.instances.write().push(Arc::clone(&instance));
        instance
    }

    /// Get instance count.
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Deliver `update` to every instance's `event` handlers, synchronously.
    pub fn emit(&self, event: EventName, update: &TxUpdate) {
        let instances: Vec<Arc<InstanceHandlers>> = self.instances.read().clone();
        tracing::trace!(%event, hash = %update.hash(), instances = instances.len(), "emitting");
        for instance in instances {
            instance.emit(event, update);
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
