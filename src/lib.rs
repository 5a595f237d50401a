//! # Transaction Mirror
//!
//! Keeps a local, queryable copy of a ledger node's recent transaction
//! history current, by combining a one-shot bulk catch-up with a live
//! stream of incremental updates.
//!
//! ## Core Concepts
//!
//! - **Sources**: One isolated context per backend host (store, live flag, catch-up flag)
//! - **Bulk Loader**: Fetches recent history once, with a shared retry budget
//! - **Live Channel**: Single self-healing socket.io connection per source
//! - **Reconciler**: Turns updates into store mutations without duplicates
//! - **Notification Bus**: Re-emits applied updates to every instance
//!
//! ## Example
//!
//! ```ignore
//! use txmirror::{EventName, FindOptions, InstanceOptions, Mirror, MirrorConfig, Query};
//!
//! let mirror = Mirror::new(MirrorConfig::default());
//! mirror.install_exit_hook();
//!
//! let view = mirror.instance(InstanceOptions::host("node.example").with_ssl(true))?;
//!
//! let disposer = view.on(EventName::TxConfirmed, |update| {
//!     println!("confirmed {}", update.hash());
//! });
//!
//! let recent = view.tx_history(Default::default()).await?;
//! let latest = view.find(&Query::all(), FindOptions::limit(10)).await?;
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod mirror;
pub mod reconcile;
pub mod records;
pub mod sources;
pub mod stream;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::{
    BackfillConfig, HistoryConfig, InstanceOptions, MirrorConfig, ReconnectPolicy, Scheme,
    SourceEndpoint,
};
pub use error::{Result, SyncError};
pub use loader::{BulkLoader, HistoryFetcher, HttpHistoryFetcher, RetryBudget};
pub use mirror::{
    FindOptions, HistoryOptions, Mirror, MirrorBuilder, MirrorHandle, RemoveOptions, RemoveResult,
};
pub use reconcile::{Outcome, Reconciler};
pub use records::{Collection, Field, FieldValue, Query, Sort, TransactionStore};
pub use sources::{SourceContext, SourceRegistry, StoreFactory};
pub use stream::{
    ChannelState, LiveChannel, SocketIoConnector, StreamConnection, StreamConnector, StreamMessage,
};
pub use subscriptions::{
    Disposer, EventName, Handler, InstanceHandlers, NotificationBus, SubscriptionHandle,
};
pub use types::*;
