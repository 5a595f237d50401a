//! Live update channel: one self-healing connection per source.
//!
//! ```text
//! Idle -> Connecting -> Connected -> Disconnected -> Connecting -> ...
//!              |
//!              +-> Error -> Connecting -> ...
//! ```
//!
//! Reconnects are scheduled after a randomized delay and never give up.
//! The source's stream flag is claimed before the handshake starts, so a
//! reconnect that fires while another attempt is in flight does nothing.

use super::transport::{StreamConnection, StreamConnector, StreamMessage};
use crate::config::ReconnectPolicy;
use crate::reconcile::Reconciler;
use crate::sources::SourceContext;
use crate::subscriptions::NotificationBus;
use crate::types::TxUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connection state of a source's live channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Starts and restarts live connections, feeding their updates to the reconciler.
#[derive(Clone)]
pub struct LiveChannel {
    connector: Arc<dyn StreamConnector>,
    bus: Arc<NotificationBus>,
    policy: ReconnectPolicy,
    shutdown: watch::Receiver<bool>,
}

impl LiveChannel {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        bus: Arc<NotificationBus>,
        policy: ReconnectPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            connector,
            bus,
            policy,
            shutdown,
        }
    }

    /// Shut down explicitly, or the coordinator is gone.
    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Start a connection for `source` unless one is already active.
    ///
    /// Returns false when this call was a no-op.
    pub fn start(&self, source: Arc<SourceContext>) -> bool {
        if self.is_shut_down() {
            return false;
        }
        if !source.try_activate_stream() {
            debug!(host = %source.host(), "live channel already initialized");
            return false;
        }

        source.set_channel_state(ChannelState::Connecting);
        let channel = self.clone();
        tokio::spawn(async move { channel.run(source).await });
        true
    }

    async fn run(self, source: Arc<SourceContext>) {
        let mut conn = match self.connector.connect(source.endpoint()).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(host = %source.host(), error = %e, "live channel connect error");
                source.set_channel_state(ChannelState::Error);
                source.release_stream();
                self.schedule_reconnect(source, self.policy.error_delay());
                return;
            }
        };

        source.set_channel_state(ChannelState::Connected);
        info!(host = %source.host(), "connected to live channel");

        let reason = self.pump(&source, conn.as_mut()).await;

        info!(host = %source.host(), %reason, "live channel disconnect");
        source.set_channel_state(ChannelState::Disconnected);
        source.release_stream();
        conn.close().await;
        self.schedule_reconnect(source, self.policy.disconnect_delay());
    }

    /// Apply messages until the connection ends. Returns the close reason.
    async fn pump(&self, source: &SourceContext, conn: &mut dyn StreamConnection) -> String {
        let mut shutdown = self.shutdown.clone();
        let reconciler = Reconciler::new(source, &self.bus);

        loop {
            if *shutdown.borrow() {
                return "io client disconnect".to_string();
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return "io client disconnect".to_string();
                    }
                }
                message = conn.next_message() => match message {
                    Ok(StreamMessage::Event { name, data }) => match TxUpdate::from_wire(&name, data) {
                        Ok(Some(update)) => {
                            reconciler.apply_update(update);
                        }
                        Ok(None) => debug!(host = %source.host(), event = %name, "ignoring unknown event"),
                        Err(e) => warn!(host = %source.host(), event = %name, error = %e, "malformed update"),
                    },
                    Ok(StreamMessage::Disconnected(reason)) => return reason,
                    Err(e) => return e.to_string(),
                },
            }
        }
    }

    fn schedule_reconnect(&self, source: Arc<SourceContext>, delay: Duration) {
        if self.is_shut_down() {
            source.set_channel_state(ChannelState::Idle);
            return;
        }

        let channel = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(host = %source.host(), delay_ms = delay.as_millis() as u64, "live channel reconnecting");
            channel.start(source);
        });
    }
}
