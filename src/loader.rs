//! Bulk catch-up of recent transaction history.

use crate::config::SourceEndpoint;
use crate::error::Result;
use crate::reconcile::Reconciler;
use crate::sources::SourceContext;
use crate::subscriptions::NotificationBus;
use crate::types::Transaction;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fetches a snapshot of the most recent transactions.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn fetch_recent(&self, endpoint: &SourceEndpoint, amount: usize) -> Result<Vec<Transaction>>;
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "txHistory", default)]
    tx_history: Option<Vec<Value>>,
}

/// Decode history entries one by one, dropping those without a usable hash.
fn decode_history(entries: Vec<Value>) -> Vec<Transaction> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Transaction>(entry) {
            Ok(tx) if !tx.hash.as_str().is_empty() => Some(tx),
            Ok(_) => {
                warn!(index, "skipping history entry without hash");
                None
            }
            Err(e) => {
                warn!(index, error = %e, "skipping malformed history entry");
                None
            }
        })
        .collect()
}

/// Fetches history from the REST endpoint, bypassing caches.
#[derive(Clone, Default)]
pub struct HttpHistoryFetcher {
    client: reqwest::Client,
}

impl HttpHistoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistoryFetcher {
    async fn fetch_recent(&self, endpoint: &SourceEndpoint, amount: usize) -> Result<Vec<Transaction>> {
        let response = self
            .client
            .get(endpoint.history_url(amount))
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?
            .error_for_status()?;

        let body: HistoryResponse = response.json().await?;
        Ok(decode_history(body.tx_history.unwrap_or_default()))
    }
}

/// Failed bulk fetches that may still be retried.
///
/// One budget is shared by every source of a coordinator; once spent,
/// no source retries again.
#[derive(Debug)]
pub struct RetryBudget {
    remaining: AtomicU32,
}

impl RetryBudget {
    pub fn new(retries: u32) -> Self {
        Self {
            remaining: AtomicU32::new(retries),
        }
    }

    /// Take one retry. Returns false once the budget is exhausted.
    pub fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

/// Loads a source's recent history once, retrying failed fetches on the shared budget.
#[derive(Clone)]
pub struct BulkLoader {
    fetcher: Arc<dyn HistoryFetcher>,
    budget: Arc<RetryBudget>,
    bus: Arc<NotificationBus>,
    retry_delay: Duration,
}

impl BulkLoader {
    pub fn new(
        fetcher: Arc<dyn HistoryFetcher>,
        budget: Arc<RetryBudget>,
        bus: Arc<NotificationBus>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            budget,
            bus,
            retry_delay,
        }
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// Run `load_history` in the background.
    pub fn spawn(&self, source: Arc<SourceContext>, amount: usize) -> JoinHandle<()> {
        let loader = self.clone();
        tokio::spawn(async move { loader.load_history(source, amount).await })
    }

    /// Fetch up to `amount` recent transactions into the source's store.
    ///
    /// Fetch or store failures are logged and retried after a fixed delay
    /// while the shared budget lasts and the source has not completed a load.
    /// Nothing is reported to the caller.
    pub async fn load_history(&self, source: Arc<SourceContext>, amount: usize) {
        let mut attempt: u32 = 1;
        loop {
            let loaded = match self.fetcher.fetch_recent(source.endpoint(), amount).await {
                Ok(batch) => {
                    let fetched = batch.len();
                    Reconciler::new(&source, &self.bus)
                        .apply_history(batch)
                        .map(|inserted| (fetched, inserted))
                }
                Err(e) => Err(e),
            };

            match loaded {
                Ok((fetched, inserted)) => {
                    source.mark_history_loaded();
                    info!(host = %source.host(), fetched, inserted, attempt, "history loaded");
                    return;
                }
                Err(e) => {
                    warn!(host = %source.host(), error = %e, attempt, "error loading history");
                    if source.history_loaded() || !self.budget.try_consume() {
                        warn!(host = %source.host(), "giving up on history fetch");
                        return;
                    }
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
