//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use txmirror::{
    Collection, Query, Result, Sort, SourceEndpoint, StreamConnection, StreamConnector,
    StreamMessage, SyncError, Transaction, TransactionStore, TxHash,
};

// --- History ---

/// Replays scripted fetch results; once exhausted either fails or never answers.
pub struct FakeFetcher {
    results: Mutex<VecDeque<Result<Vec<Transaction>>>>,
    hang_when_empty: bool,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn with(results: Vec<Result<Vec<Transaction>>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            hang_when_empty: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// A backend whose history endpoint never responds.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(VecDeque::new()),
            hang_when_empty: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl txmirror::HistoryFetcher for FakeFetcher {
    async fn fetch_recent(&self, _: &SourceEndpoint, _: usize) -> Result<Vec<Transaction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().pop_front();
        match next {
            Some(result) => result,
            None if self.hang_when_empty => std::future::pending().await,
            None => Err(SyncError::Transport("connection refused".into())),
        }
    }
}

// --- Live stream ---

pub enum Script {
    /// Handshake fails.
    Fail(&'static str),
    /// Handshake succeeds; messages come from the paired `Feed`.
    Open(mpsc::UnboundedReceiver<StreamMessage>),
}

/// Server side of a scripted connection.
pub struct Feed {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl Feed {
    pub fn event(&self, name: &str, data: Value) {
        let _ = self.tx.send(StreamMessage::Event {
            name: name.to_string(),
            data,
        });
    }

    /// Remote close.
    pub fn disconnect(&self, reason: &str) {
        let _ = self.tx.send(StreamMessage::Disconnected(reason.to_string()));
    }
}

pub fn feed() -> (Feed, Script) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Feed { tx }, Script::Open(rx))
}

/// Plays scripted handshakes in order; once exhausted, handshakes never complete.
pub struct FakeConnector {
    scripts: Mutex<VecDeque<Script>>,
    handshake_delay: Duration,
    in_flight: AtomicUsize,
    pub attempts: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Self::with_delay(scripts, Duration::ZERO)
    }

    pub fn with_delay(scripts: Vec<Script>, handshake_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            handshake_delay,
            in_flight: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, _: &SourceEndpoint) -> Result<Box<dyn StreamConnection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }

        let script = self.scripts.lock().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match script {
            Some(Script::Fail(reason)) => Err(SyncError::Transport(reason.to_string())),
            Some(Script::Open(rx)) => Ok(Box::new(FakeConnection {
                rx,
                closed: Arc::clone(&self.closed),
                is_closed: false,
            })),
            None => std::future::pending().await,
        }
    }
}

struct FakeConnection {
    rx: mpsc::UnboundedReceiver<StreamMessage>,
    closed: Arc<AtomicUsize>,
    is_closed: bool,
}

#[async_trait]
impl StreamConnection for FakeConnection {
    async fn next_message(&mut self) -> Result<StreamMessage> {
        match self.rx.recv().await {
            Some(message) => Ok(message),
            None => Ok(StreamMessage::Disconnected("transport close".into())),
        }
    }

    async fn close(&mut self) {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// --- Stores ---

/// Collection that counts `find` calls.
pub struct CountingStore {
    inner: Collection,
    pub finds: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Collection::new("counting"),
            finds: AtomicUsize::new(0),
        })
    }
}

impl TransactionStore for CountingStore {
    fn insert(&self, tx: Transaction) -> Result<()> {
        self.inner.insert(tx)
    }

    fn insert_many(&self, txs: Vec<Transaction>) -> Result<usize> {
        self.inner.insert_many(txs)
    }

    fn get(&self, hash: &TxHash) -> Result<Option<Transaction>> {
        self.inner.get(hash)
    }

    fn update(&self, tx: Transaction) -> Result<()> {
        self.inner.update(tx)
    }

    fn find(&self, query: &Query, sort: Option<&Sort>) -> Result<Vec<Transaction>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(query, sort)
    }

    fn remove(&self, query: &Query, limit: Option<usize>) -> Result<usize> {
        self.inner.remove(query, limit)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Collection whose first `failures` batch inserts throw.
pub struct FlakyStore {
    inner: Collection,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Collection::new("flaky"),
            failures: AtomicUsize::new(failures),
        })
    }
}

impl TransactionStore for FlakyStore {
    fn insert(&self, tx: Transaction) -> Result<()> {
        self.inner.insert(tx)
    }

    fn insert_many(&self, txs: Vec<Transaction>) -> Result<usize> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::StoreQuery("disk quota exceeded".into()));
        }
        self.inner.insert_many(txs)
    }

    fn get(&self, hash: &TxHash) -> Result<Option<Transaction>> {
        self.inner.get(hash)
    }

    fn update(&self, tx: Transaction) -> Result<()> {
        self.inner.update(tx)
    }

    fn find(&self, query: &Query, sort: Option<&Sort>) -> Result<Vec<Transaction>> {
        self.inner.find(query, sort)
    }

    fn remove(&self, query: &Query, limit: Option<usize>) -> Result<usize> {
        self.inner.remove(query, limit)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Store whose every query throws.
pub struct BrokenStore;

impl TransactionStore for BrokenStore {
    fn insert(&self, _: Transaction) -> Result<()> {
        Err(SyncError::StoreQuery("insert failed".into()))
    }

    fn insert_many(&self, _: Vec<Transaction>) -> Result<usize> {
        Err(SyncError::StoreQuery("insert failed".into()))
    }

    fn get(&self, _: &TxHash) -> Result<Option<Transaction>> {
        Err(SyncError::Payload("index corrupted".into()))
    }

    fn update(&self, _: Transaction) -> Result<()> {
        Err(SyncError::StoreQuery("update failed".into()))
    }

    fn find(&self, _: &Query, _: Option<&Sort>) -> Result<Vec<Transaction>> {
        Err(SyncError::Payload("index corrupted".into()))
    }

    fn remove(&self, _: &Query, _: Option<usize>) -> Result<usize> {
        Err(SyncError::StoreQuery("remove failed".into()))
    }

    fn len(&self) -> usize {
        0
    }
}

/// Let spawned tasks run. Timers shorter than `ms` fire too.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Route crate logs through the test harness's captured output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
