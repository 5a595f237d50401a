//! Core types for the transaction mirror.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Globally unique transaction hash, the store's uniqueness key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        TxHash(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TxHash {
    fn from(s: &str) -> Self {
        TxHash(s.to_string())
    }
}

impl From<String> for TxHash {
    fn from(s: String) -> Self {
        TxHash(s)
    }
}

impl Borrow<str> for TxHash {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Milestone designator as sent by the backend.
///
/// Older nodes send the milestone index, newer ones a short marker string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Milestone {
    Index(u64),
    Marker(String),
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Milestone::Index(i) => write!(f, "{}", i),
            Milestone::Marker(m) => write!(f, "{}", m),
        }
    }
}

/// A single transaction as held in the local store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier (immutable).
    pub hash: TxHash,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,

    /// When the backend saw the transaction (milliseconds since epoch).
    #[serde(rename = "receivedAt", default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<i64>,

    /// Confirmation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<i64>,

    #[serde(default)]
    pub confirmed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,

    #[serde(default)]
    pub reattached: bool,

    /// Backend fields this crate does not interpret (value, tag, trunk...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Transaction {
    /// Unconfirmed transaction with only a hash set.
    pub fn new(hash: impl Into<TxHash>) -> Self {
        Self {
            hash: hash.into(),
            address: None,
            bundle: None,
            received_at: None,
            ctime: None,
            confirmed: false,
            milestone: None,
            reattached: false,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    pub fn with_received_at(mut self, received_at: i64) -> Self {
        self.received_at = Some(received_at);
        self
    }
}

/// Status change for an existing transaction (confirmation, milestone, reattachment).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub hash: TxHash,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StatusUpdate {
    pub fn new(hash: impl Into<TxHash>) -> Self {
        Self {
            hash: hash.into(),
            ctime: None,
            milestone: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_ctime(mut self, ctime: i64) -> Self {
        self.ctime = Some(ctime);
        self
    }

    pub fn with_milestone(mut self, milestone: Milestone) -> Self {
        self.milestone = Some(milestone);
        self
    }
}

/// How an incoming update mutates the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    NewTransaction,
    Confirmed,
    Milestone,
    Reattach,
}

impl UpdateKind {
    /// Event name used on the live stream.
    pub fn wire_name(&self) -> &'static str {
        match self {
            UpdateKind::NewTransaction => "newTX",
            UpdateKind::Confirmed => "update",
            UpdateKind::Milestone => "updateMilestone",
            UpdateKind::Reattach => "updateReattach",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "newTX" => Some(UpdateKind::NewTransaction),
            "update" => Some(UpdateKind::Confirmed),
            "updateMilestone" => Some(UpdateKind::Milestone),
            "updateReattach" => Some(UpdateKind::Reattach),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateKind::NewTransaction => "NewTransaction",
            UpdateKind::Confirmed => "Confirmed",
            UpdateKind::Milestone => "Milestone",
            UpdateKind::Reattach => "Reattach",
        };
        f.write_str(name)
    }
}

/// An update delivered by the live stream, also the payload handed to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum TxUpdate {
    NewTransaction(Transaction),
    Confirmed(StatusUpdate),
    Milestone(StatusUpdate),
    Reattach(StatusUpdate),
}

impl TxUpdate {
    pub fn kind(&self) -> UpdateKind {
        match self {
            TxUpdate::NewTransaction(_) => UpdateKind::NewTransaction,
            TxUpdate::Confirmed(_) => UpdateKind::Confirmed,
            TxUpdate::Milestone(_) => UpdateKind::Milestone,
            TxUpdate::Reattach(_) => UpdateKind::Reattach,
        }
    }

    pub fn hash(&self) -> &TxHash {
        match self {
            TxUpdate::NewTransaction(tx) => &tx.hash,
            TxUpdate::Confirmed(u) | TxUpdate::Milestone(u) | TxUpdate::Reattach(u) => &u.hash,
        }
    }

    /// The new transaction, if this is one.
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            TxUpdate::NewTransaction(tx) => Some(tx),
            _ => None,
        }
    }

    /// The status change, if this is one.
    pub fn status(&self) -> Option<&StatusUpdate> {
        match self {
            TxUpdate::NewTransaction(_) => None,
            TxUpdate::Confirmed(u) | TxUpdate::Milestone(u) | TxUpdate::Reattach(u) => Some(u),
        }
    }

    /// Decode a named stream event.
    ///
    /// Returns `Ok(None)` for event names this crate does not handle.
    pub fn from_wire(event: &str, data: serde_json::Value) -> Result<Option<Self>> {
        let Some(kind) = UpdateKind::from_wire_name(event) else {
            return Ok(None);
        };

        let update = match kind {
            UpdateKind::NewTransaction => TxUpdate::NewTransaction(serde_json::from_value(data)?),
            UpdateKind::Confirmed => TxUpdate::Confirmed(serde_json::from_value(data)?),
            UpdateKind::Milestone => TxUpdate::Milestone(serde_json::from_value(data)?),
            UpdateKind::Reattach => TxUpdate::Reattach(serde_json::from_value(data)?),
        };

        if update.hash().as_str().is_empty() {
            return Err(SyncError::Payload(format!("{} event without hash", event)));
        }

        Ok(Some(update))
    }
}
