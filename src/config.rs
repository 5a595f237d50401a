//! Mirror configuration and source endpoint resolution.

use crate::error::{Result, SyncError};
use rand::Rng;
use std::fmt;
use std::ops::Range;
use std::time::Duration;

/// Environment variable naming the default host when an instance gives none.
pub const HOST_ENV: &str = "TXMIRROR_HOST";

/// Host used when neither the instance nor the environment names one.
pub const DEFAULT_HOST: &str = "localhost";

/// Coordinator-wide tuning.
#[derive(Clone, Debug)]
pub struct MirrorConfig {
    /// Port of the REST history endpoint.
    pub bulk_port: u16,

    /// Port of the live update stream.
    pub stream_port: u16,

    pub history: HistoryConfig,

    pub backfill: BackfillConfig,

    pub reconnect: ReconnectPolicy,

    /// Handshake deadline for the live stream.
    pub connect_timeout: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            bulk_port: 4433,
            stream_port: 4434,
            history: HistoryConfig::default(),
            backfill: BackfillConfig::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Bulk catch-up settings.
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    /// Transactions requested from the history endpoint.
    pub amount: usize,

    /// Failed fetches that may be retried, shared by every source.
    pub retries: u32,

    /// Pause before each retry.
    pub retry_delay: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            amount: 15_000,
            retries: 10,
            retry_delay: Duration::from_millis(2500),
        }
    }
}

/// How long `tx_history` waits for the bulk catch-up to land.
#[derive(Clone, Debug)]
pub struct BackfillConfig {
    /// Polls after the first one, per call.
    pub retries: u32,

    pub poll_delay: Duration,

    /// Fewer results than this (with no completed catch-up) keeps polling.
    pub min_results: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            retries: 20,
            poll_delay: Duration::from_millis(100),
            min_results: 6,
        }
    }
}

/// Randomized reconnection delays of the live stream. There is no cap on attempts.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Delay range (ms) after the remote closed an established connection.
    pub after_disconnect_ms: Range<u64>,

    /// Delay range (ms) after a failed handshake.
    pub after_error_ms: Range<u64>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            after_disconnect_ms: 100..1000,
            after_error_ms: 10..100,
        }
    }
}

impl ReconnectPolicy {
    pub fn disconnect_delay(&self) -> Duration {
        Self::pick(&self.after_disconnect_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Self::pick(&self.after_error_ms)
    }

    fn pick(range: &Range<u64>) -> Duration {
        if range.is_empty() {
            return Duration::from_millis(range.start);
        }
        Duration::from_millis(rand::thread_rng().gen_range(range.clone()))
    }
}

/// Per-instance options.
#[derive(Clone, Debug, Default)]
pub struct InstanceOptions {
    /// Backend host. Defaults to the process's own origin.
    pub host: Option<String>,

    /// Use TLS for both endpoints.
    pub ssl: bool,
}

impl InstanceOptions {
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ssl: false,
        }
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Protocol with trailing colon, as in `http:`.
    pub fn protocol(&self) -> &'static str {
        match self {
            Scheme::Http => "http:",
            Scheme::Https => "https:",
        }
    }

    pub fn socket_protocol(&self) -> &'static str {
        match self {
            Scheme::Http => "ws:",
            Scheme::Https => "wss:",
        }
    }
}

/// Resolved addresses of one backend host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceEndpoint {
    pub scheme: Scheme,
    pub host: String,
    pub bulk_port: u16,
    pub stream_port: u16,
}

impl SourceEndpoint {
    /// Resolve instance options against the coordinator config.
    pub fn resolve(options: &InstanceOptions, config: &MirrorConfig) -> Result<Self> {
        let (host, scheme) = match options.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => {
                let scheme = if options.ssl { Scheme::Https } else { Scheme::Http };
                (host.to_string(), scheme)
            }
            Some(_) => return Err(SyncError::InvalidConfig("empty host".into())),
            None => {
                let host = std::env::var(HOST_ENV)
                    .ok()
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_HOST.to_string());
                (host, Scheme::Http)
            }
        };

        if host.contains('/') || host.contains(' ') {
            return Err(SyncError::InvalidConfig(format!("invalid host: {}", host)));
        }

        Ok(Self {
            scheme,
            host,
            bulk_port: config.bulk_port,
            stream_port: config.stream_port,
        })
    }

    /// Source registry key.
    pub fn key(&self) -> &str {
        &self.host
    }

    /// `{scheme}//{host}`
    pub fn origin(&self) -> String {
        format!("{}//{}", self.scheme.protocol(), self.host)
    }

    pub fn history_url(&self, amount: usize) -> String {
        format!(
            "{}:{}/api/v1/getRecentTransactions?amount={}",
            self.origin(),
            self.bulk_port,
            amount
        )
    }

    pub fn stream_url(&self) -> String {
        format!("{}:{}", self.origin(), self.stream_port)
    }

    /// Websocket URL of the socket.io endpoint.
    pub fn socket_url(&self) -> String {
        format!(
            "{}//{}:{}/socket.io/?EIO=3&transport=websocket",
            self.scheme.socket_protocol(),
            self.host,
            self.stream_port
        )
    }
}

impl fmt::Display for SourceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.origin())
    }
}
