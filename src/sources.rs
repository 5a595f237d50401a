//! Per-host source contexts.
//!
//! A source context holds one backend host's collection, its live-connection
//! flag and its bulk-load completion flag. Contexts are created lazily on
//! first use and live as long as the registry.

use crate::config::SourceEndpoint;
use crate::records::{Collection, TransactionStore};
use crate::stream::ChannelState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Builds the store for a newly created source.
pub type StoreFactory = Arc<dyn Fn(&SourceEndpoint) -> Arc<dyn TransactionStore> + Send + Sync>;

/// One backend host's isolated state.
pub struct SourceContext {
    endpoint: SourceEndpoint,
    store: Arc<dyn TransactionStore>,

    /// Set while a live connection is being attempted or is open.
    stream_active: AtomicBool,

    /// Set once the bulk catch-up succeeded. Never reset.
    history_loaded: AtomicBool,

    channel_state: RwLock<ChannelState>,

    /// Handshakes started over the context's lifetime.
    connect_attempts: AtomicU64,
}

impl SourceContext {
    pub fn new(endpoint: SourceEndpoint, store: Arc<dyn TransactionStore>) -> Self {
        Self {
            endpoint,
            store,
            stream_active: AtomicBool::new(false),
            history_loaded: AtomicBool::new(false),
            channel_state: RwLock::new(ChannelState::Idle),
            connect_attempts: AtomicU64::new(0),
        }
    }

    pub fn host(&self) -> &str {
        self.endpoint.key()
    }

    pub fn endpoint(&self) -> &SourceEndpoint {
        &self.endpoint
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Claim the single live-connection slot.
    ///
    /// Returns false if another attempt already holds it.
    pub fn try_activate_stream(&self) -> bool {
        let claimed = self
            .stream_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        }
        claimed
    }

    pub fn release_stream(&self) {
        self.stream_active.store(false, Ordering::SeqCst);
    }

    pub fn stream_active(&self) -> bool {
        self.stream_active.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn mark_history_loaded(&self) {
        self.history_loaded.store(true, Ordering::SeqCst);
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded.load(Ordering::SeqCst)
    }

    pub fn channel_state(&self) -> ChannelState {
        *self.channel_state.read()
    }

    pub(crate) fn set_channel_state(&self, state: ChannelState) {
        let mut current = self.channel_state.write();
        if *current != state {
            tracing::debug!(host = %self.host(), from = ?*current, to = ?state, "channel state");
            *current = state;
        }
    }
}

/// Registry of source contexts keyed by host.
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<SourceContext>>>,
    factory: StoreFactory,
}

impl SourceRegistry {
    /// Registry whose sources use in-memory collections.
    pub fn new() -> Self {
        Self::with_store_factory(Arc::new(|endpoint: &SourceEndpoint| {
            Arc::new(Collection::new(endpoint.key())) as Arc<dyn TransactionStore>
        }))
    }

    pub fn with_store_factory(factory: StoreFactory) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Look up the context for `endpoint`, creating it on first use.
    ///
    /// The flag is true when this call created the context.
    pub fn get_or_create(&self, endpoint: &SourceEndpoint) -> (Arc<SourceContext>, bool) {
        if let Some(existing) = self.sources.read().get(endpoint.key()) {
            return (Arc::clone(existing), false);
        }

        let mut sources = self.sources.write();
        if let Some(existing) = sources.get(endpoint.key()) {
            return (Arc::clone(existing), false);
        }

        let store = (self.factory)(endpoint);
        let context = Arc::new(SourceContext::new(endpoint.clone(), store));
        sources.insert(endpoint.key().to_string(), Arc::clone(&context));
        tracing::debug!(host = %endpoint.key(), "created source context");
        (context, true)
    }

    pub fn get(&self, host: &str) -> Option<Arc<SourceContext>> {
        self.sources.read().get(host).cloned()
    }

    pub fn all(&self) -> Vec<Arc<SourceContext>> {
        self.sources.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
