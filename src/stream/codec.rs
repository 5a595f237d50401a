//! socket.io (Engine.IO v3) text frame codec.
//!
//! A frame is one Engine.IO packet: a type digit followed by data. Message
//! packets (`4`) carry a socket.io packet: another type digit, an optional
//! `/namespace,`, an optional ack id, then a JSON array `[name, data]`.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::time::Duration;

/// Handshake data sent by the server in the open packet.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    #[serde(default)]
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    5_000
}

impl OpenInfo {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout.max(1))
    }
}

/// Engine.IO packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// socket.io packet carried in an Engine.IO message.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event {
        name: String,
        data: serde_json::Value,
    },
    Error(String),
    /// Acks and binary packets, which this client never requests.
    Unsupported(char),
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| SyncError::Payload("empty frame".into()))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(rest.to_string())),
        '3' => Ok(Packet::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(Packet::Message),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(SyncError::Payload(format!("unknown packet type {:?}", other))),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| SyncError::Payload("empty message packet".into()))?;
    let rest = skip_namespace(chars.as_str());

    match kind {
        '0' => Ok(SocketPacket::Connect),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut parts: Vec<serde_json::Value> = serde_json::from_str(payload)?;
            if parts.is_empty() {
                return Err(SyncError::Payload("event without name".into()));
            }
            let data = if parts.len() > 1 {
                parts.swap_remove(1)
            } else {
                serde_json::Value::Null
            };
            let name = match parts.swap_remove(0) {
                serde_json::Value::String(name) => name,
                other => return Err(SyncError::Payload(format!("event name is not a string: {}", other))),
            };
            Ok(SocketPacket::Event { name, data })
        }
        '4' => Ok(SocketPacket::Error(rest.to_string())),
        other => Ok(SocketPacket::Unsupported(other)),
    }
}

/// Strip a leading `/namespace,`.
fn skip_namespace(s: &str) -> &str {
    if s.starts_with('/') {
        match s.find(',') {
            Some(i) => &s[i + 1..],
            None => "",
        }
    } else {
        s
    }
}

pub fn encode_ping() -> String {
    "2".to_string()
}

pub fn encode_pong(data: &str) -> String {
    format!("3{}", data)
}

/// Namespace disconnect followed by transport close is how clients hang up.
pub fn encode_disconnect() -> String {
    "41".to_string()
}
