//! Subscription types for store notifications.

use crate::types::{TxUpdate, UpdateKind};
use std::fmt;
use std::sync::Arc;

/// Consumer-visible event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A new transaction was inserted.
    TxNew,
    /// A transaction was confirmed.
    TxConfirmed,
    /// A milestone was confirmed.
    Milestones,
    /// A transaction was reattached.
    TxReattaches,
}

impl EventName {
    pub const ALL: [EventName; 4] = [
        EventName::TxNew,
        EventName::TxConfirmed,
        EventName::Milestones,
        EventName::TxReattaches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::TxNew => "txNew",
            EventName::TxConfirmed => "txConfirmed",
            EventName::Milestones => "milestones",
            EventName::TxReattaches => "txReattaches",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Event emitted after applying an update of `kind`.
    pub fn for_kind(kind: UpdateKind) -> Self {
        match kind {
            UpdateKind::NewTransaction => EventName::TxNew,
            UpdateKind::Confirmed => EventName::TxConfirmed,
            UpdateKind::Milestone => EventName::Milestones,
            UpdateKind::Reattach => EventName::TxReattaches,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked synchronously on every emission of its event.
pub type Handler = Arc<dyn Fn(&TxUpdate) + Send + Sync>;

/// Unique identifier for a registered instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

/// Unique identifier for a handler within an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Channel-backed subscription, an alternative to callbacks.
pub struct SubscriptionHandle {
    pub event: EventName,
    /// Channel to receive updates.
    pub receiver: crossbeam_channel::Receiver<TxUpdate>,
    /// Removes the feeding handler.
    pub disposer: super::Disposer,
}

impl SubscriptionHandle {
    /// Receive the next update (blocking).
    pub fn recv(&self) -> Result<TxUpdate, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an update (non-blocking).
    pub fn try_recv(&self) -> Result<TxUpdate, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<TxUpdate, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Stop feeding this receiver. Buffered updates stay readable.
    pub fn unsubscribe(&self) {
        self.disposer.dispose();
    }
}
