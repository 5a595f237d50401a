//! Coordinator owning the source registry, notification bus and background workers.

mod handle;

pub use handle::{FindOptions, HistoryOptions, MirrorHandle, RemoveOptions, RemoveResult};

use crate::config::{InstanceOptions, MirrorConfig, SourceEndpoint};
use crate::error::{Result, SyncError};
use crate::loader::{BulkLoader, HistoryFetcher, HttpHistoryFetcher, RetryBudget};
use crate::sources::{SourceContext, SourceRegistry, StoreFactory};
use crate::stream::{LiveChannel, SocketIoConnector, StreamConnector};
use crate::subscriptions::NotificationBus;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub(crate) struct MirrorInner {
    config: MirrorConfig,
    registry: SourceRegistry,
    bus: Arc<NotificationBus>,
    loader: BulkLoader,
    channel: LiveChannel,
    shutdown: watch::Sender<bool>,
}

/// Entry point: hands out instances and keeps one source context per host.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Mirror {
    inner: Arc<MirrorInner>,
}

/// Builder for swapping the transport or store implementations.
pub struct MirrorBuilder {
    config: MirrorConfig,
    fetcher: Option<Arc<dyn HistoryFetcher>>,
    connector: Option<Arc<dyn StreamConnector>>,
    store_factory: Option<StoreFactory>,
}

impl MirrorBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn HistoryFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn store_factory(mut self, factory: StoreFactory) -> Self {
        self.store_factory = Some(factory);
        self
    }

    pub fn build(self) -> Mirror {
        let config = self.config;
        let bus = Arc::new(NotificationBus::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpHistoryFetcher::new()));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(SocketIoConnector::new(config.connect_timeout)));
        let registry = match self.store_factory {
            Some(factory) => SourceRegistry::with_store_factory(factory),
            None => SourceRegistry::new(),
        };

        let loader = BulkLoader::new(
            fetcher,
            Arc::new(RetryBudget::new(config.history.retries)),
            Arc::clone(&bus),
            config.history.retry_delay,
        );
        let channel = LiveChannel::new(
            connector,
            Arc::clone(&bus),
            config.reconnect.clone(),
            shutdown_rx,
        );

        Mirror {
            inner: Arc::new(MirrorInner {
                config,
                registry,
                bus,
                loader,
                channel,
                shutdown,
            }),
        }
    }
}

impl Mirror {
    /// Coordinator using the HTTP history endpoint and socket.io stream.
    pub fn new(config: MirrorConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: MirrorConfig) -> MirrorBuilder {
        MirrorBuilder {
            config,
            fetcher: None,
            connector: None,
            store_factory: None,
        }
    }

    /// Create an instance pointed at `options.host`.
    ///
    /// The first instance for a host creates its source context and starts
    /// the bulk catch-up; every instance starts the live channel unless one
    /// is already active. Outside a tokio runtime this fails with
    /// [`SyncError::InvalidConfig`] and registers nothing.
    pub fn instance(&self, options: InstanceOptions) -> Result<MirrorHandle> {
        tokio::runtime::Handle::try_current()
            .map_err(|_| SyncError::InvalidConfig("instance requires a tokio runtime".into()))?;
        let endpoint = SourceEndpoint::resolve(&options, &self.inner.config)?;
        let handlers = self.inner.bus.register();
        let (source, created) = self.inner.registry.get_or_create(&endpoint);

        if created {
            self.inner
                .loader
                .spawn(Arc::clone(&source), self.inner.config.history.amount);
        }

        self.inner.channel.start(Arc::clone(&source));

        Ok(MirrorHandle::new(
            Arc::clone(&self.inner),
            source,
            handlers,
        ))
    }

    pub fn source(&self, host: &str) -> Option<Arc<SourceContext>> {
        self.inner.registry.get(host)
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.inner.bus
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.inner.config
    }

    /// Remaining bulk-load retries, shared by all sources.
    pub fn history_retries_left(&self) -> u32 {
        self.inner.loader.budget().remaining()
    }

    /// Close every open live connection and stop reconnecting.
    ///
    /// Pending bulk-load retries are not cancelled.
    pub fn shutdown(&self) {
        info!(sources = self.inner.registry.len(), "closing live channels");
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Call `shutdown` when the process receives Ctrl-C.
    pub fn install_exit_hook(&self) -> JoinHandle<()> {
        let mirror = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                mirror.shutdown();
            }
        })
    }
}

impl MirrorInner {
    pub(crate) fn config(&self) -> &MirrorConfig {
        &self.config
    }
}
