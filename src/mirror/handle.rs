//! Per-instance read/write surface over a source's store.

use super::MirrorInner;
use crate::error::{Result, SyncError};
use crate::records::{Query, Sort};
use crate::sources::SourceContext;
use crate::subscriptions::{Disposer, EventName, InstanceHandlers, SubscriptionHandle};
use crate::types::{Transaction, TxUpdate};
use std::sync::Arc;
use tracing::debug;

/// Options for [`MirrorHandle::find`].
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    /// Keep only the last N matches. `None` or 0 keeps all.
    pub limit: Option<usize>,
    pub sort: Option<Sort>,
}

impl FindOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Options for [`MirrorHandle::remove`].
#[derive(Clone, Debug, Default)]
pub struct RemoveOptions {
    /// Remove at most N matches. `None` or 0 removes all.
    pub limit: Option<usize>,
}

/// Options for [`MirrorHandle::tx_history`].
#[derive(Clone, Debug, Default)]
pub struct HistoryOptions {
    /// Return at most the last N transactions. `None` returns all.
    pub amount: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoveResult {
    pub removed: usize,
}

/// One consumer's view of a source.
///
/// All handles for the same host share one store and one live connection.
pub struct MirrorHandle {
    mirror: Arc<MirrorInner>,
    source: Arc<SourceContext>,
    handlers: Arc<InstanceHandlers>,
}

impl MirrorHandle {
    pub(crate) fn new(
        mirror: Arc<MirrorInner>,
        source: Arc<SourceContext>,
        handlers: Arc<InstanceHandlers>,
    ) -> Self {
        Self {
            mirror,
            source,
            handlers,
        }
    }

    pub fn host(&self) -> &str {
        self.source.host()
    }

    pub fn source(&self) -> &Arc<SourceContext> {
        &self.source
    }

    /// Register a handler for `event`.
    pub fn on<F>(&self, event: EventName, handler: F) -> Disposer
    where
        F: Fn(&TxUpdate) + Send + Sync + 'static,
    {
        self.handlers.on(event, Arc::new(handler))
    }

    /// Receive `event` through a bounded channel.
    pub fn subscribe_channel(&self, event: EventName, buffer: usize) -> SubscriptionHandle {
        self.handlers.subscribe_channel(event, buffer)
    }

    /// Invoke this instance's handlers for `event`. The bus calls this on every instance.
    pub fn emit(&self, event: EventName, update: &TxUpdate) {
        self.handlers.emit(event, update);
    }

    /// Matching transactions, optionally sorted, truncated to the last `limit`.
    pub async fn find(&self, query: &Query, options: FindOptions) -> Result<Vec<Transaction>> {
        self.find_now(query, &options)
    }

    fn find_now(&self, query: &Query, options: &FindOptions) -> Result<Vec<Transaction>> {
        let mut found = self
            .source
            .store()
            .find(query, options.sort.as_ref())
            .map_err(as_store_error)?;

        if let Some(limit) = options.limit.filter(|l| *l > 0) {
            if found.len() > limit {
                found.drain(..found.len() - limit);
            }
        }
        Ok(found)
    }

    /// Delete up to `limit` matching transactions.
    pub async fn remove(&self, query: &Query, options: RemoveOptions) -> Result<RemoveResult> {
        let limit = options.limit.filter(|l| *l > 0);
        let removed = self
            .source
            .store()
            .remove(query, limit)
            .map_err(as_store_error)?;
        debug!(host = %self.host(), removed, "removed transactions");
        Ok(RemoveResult { removed })
    }

    /// Up to `amount` most recent transactions, giving the bulk catch-up time to land.
    ///
    /// While fewer than the configured minimum are stored and the catch-up has
    /// not completed, the store is polled again after a short delay. Once the
    /// per-call retries run out the call fails with `BackfillTimeout` carrying
    /// what was found.
    pub async fn tx_history(&self, options: HistoryOptions) -> Result<Vec<Transaction>> {
        let backfill = &self.mirror.config().backfill;
        let find = FindOptions {
            limit: options.amount,
            sort: None,
        };
        let mut retries = backfill.retries;

        loop {
            let found = self.find_now(&Query::all(), &find)?;
            if found.len() >= backfill.min_results || self.source.history_loaded() {
                return Ok(found);
            }
            if retries == 0 {
                debug!(host = %self.host(), found = found.len(), "history backfill timed out");
                return Err(SyncError::BackfillTimeout { partial: found });
            }
            retries -= 1;
            tokio::time::sleep(backfill.poll_delay).await;
        }
    }
}

/// Everything a store throws surfaces as a query failure.
fn as_store_error(e: SyncError) -> SyncError {
    match e {
        SyncError::StoreQuery(_) => e,
        other => SyncError::StoreQuery(other.to_string()),
    }
}
