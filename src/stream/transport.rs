//! Live stream transport.

use super::codec::{self, OpenInfo, Packet, SocketPacket};
use crate::config::SourceEndpoint;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Something the open connection delivered.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    /// A named event with its JSON payload.
    Event {
        name: String,
        data: serde_json::Value,
    },
    /// The remote side closed the connection.
    Disconnected(String),
}

/// Opens live connections to a source.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Complete the handshake or fail (connect error, timeout).
    async fn connect(&self, endpoint: &SourceEndpoint) -> Result<Box<dyn StreamConnection>>;
}

/// An established live connection.
#[async_trait]
pub trait StreamConnection: Send {
    /// Next message, in delivery order. Errors mean the connection is unusable.
    async fn next_message(&mut self) -> Result<StreamMessage>;

    /// Close proactively. Idempotent.
    async fn close(&mut self);
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// socket.io client over websocket.
#[derive(Clone, Debug)]
pub struct SocketIoConnector {
    connect_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn handshake(&self, url: &str) -> Result<SocketIoConnection> {
        let (mut socket, _response) = connect_async(url).await?;

        let mut open: Option<OpenInfo> = None;
        loop {
            let Some(frame) = socket.next().await else {
                return Err(SyncError::Transport("closed during handshake".into()));
            };
            let text = match frame? {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(SyncError::Transport("closed during handshake".into()))
                }
                _ => continue,
            };

            match codec::decode(&text)? {
                Packet::Open(info) => open = Some(info),
                Packet::Message(SocketPacket::Connect) => break,
                Packet::Message(SocketPacket::Error(e)) => {
                    return Err(SyncError::Transport(format!("connect refused: {}", e)))
                }
                Packet::Ping(data) => socket.send(Message::Text(codec::encode_pong(&data))).await?,
                other => debug!(?other, "ignoring packet during handshake"),
            }
        }

        let (ping_interval, ping_timeout) = open
            .map(|o| (o.ping_interval(), o.ping_timeout()))
            .unwrap_or((Duration::from_secs(25), Duration::from_secs(5)));
        let now = Instant::now();
        Ok(SocketIoConnection {
            socket,
            ping_interval,
            ping_timeout,
            next_ping: now + ping_interval,
            alive_until: now + ping_interval + ping_timeout,
            closed: false,
        })
    }
}

impl Default for SocketIoConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

#[async_trait]
impl StreamConnector for SocketIoConnector {
    async fn connect(&self, endpoint: &SourceEndpoint) -> Result<Box<dyn StreamConnection>> {
        let url = endpoint.socket_url();
        match timeout(self.connect_timeout, self.handshake(&url)).await {
            Ok(Ok(conn)) => Ok(Box::new(conn)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SyncError::Transport(format!(
                "connect timeout after {:?}",
                self.connect_timeout
            ))),
        }
    }
}

/// Open socket.io connection. Sends client pings on the server's interval.
///
/// A server silent for longer than one ping interval plus the ping timeout
/// counts as disconnected.
pub struct SocketIoConnection {
    socket: Socket,
    ping_interval: Duration,
    ping_timeout: Duration,
    next_ping: Instant,
    /// Any server frame pushes this forward.
    alive_until: Instant,
    closed: bool,
}

#[async_trait]
impl StreamConnection for SocketIoConnection {
    async fn next_message(&mut self) -> Result<StreamMessage> {
        if self.closed {
            return Ok(StreamMessage::Disconnected("io client disconnect".into()));
        }

        loop {
            tokio::select! {
                frame = self.socket.next() => {
                    let Some(frame) = frame else {
                        return Ok(StreamMessage::Disconnected("transport close".into()));
                    };
                    self.alive_until = Instant::now() + self.ping_interval + self.ping_timeout;
                    let text = match frame? {
                        Message::Text(text) => text,
                        Message::Ping(payload) => {
                            self.socket.send(Message::Pong(payload)).await?;
                            continue;
                        }
                        Message::Close(_) => {
                            return Ok(StreamMessage::Disconnected("transport close".into()))
                        }
                        _ => continue,
                    };

                    match codec::decode(&text) {
                        Ok(Packet::Message(SocketPacket::Event { name, data })) => {
                            return Ok(StreamMessage::Event { name, data })
                        }
                        Ok(Packet::Message(SocketPacket::Disconnect)) => {
                            return Ok(StreamMessage::Disconnected("io server disconnect".into()))
                        }
                        Ok(Packet::Close) => {
                            return Ok(StreamMessage::Disconnected("transport close".into()))
                        }
                        Ok(Packet::Ping(data)) => {
                            self.socket.send(Message::Text(codec::encode_pong(&data))).await?;
                        }
                        Ok(Packet::Message(SocketPacket::Error(e))) => {
                            warn!(error = %e, "socket.io error packet");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "dropping undecodable frame"),
                    }
                }
                _ = sleep_until(self.next_ping) => {
                    self.socket.send(Message::Text(codec::encode_ping())).await?;
                    self.next_ping = Instant::now() + self.ping_interval;
                }
                _ = sleep_until(self.alive_until) => {
                    warn!(timeout_ms = self.ping_timeout.as_millis() as u64, "no frames from server");
                    return Ok(StreamMessage::Disconnected("ping timeout".into()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.socket.send(Message::Text(codec::encode_disconnect())).await;
        if let Err(e) = self.socket.close(None).await {
            debug!(error = %e, "socket close");
        }
    }
}
