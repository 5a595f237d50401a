//! Error types for the transaction mirror.

use crate::types::{Transaction, TxHash};
use thiserror::Error;

/// Main error type for mirror operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetch or socket failure. Background tasks retry these and never
    /// surface them to handle owners.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response body or stream frame could not be decoded.
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// The local record store rejected an operation.
    #[error("Store query failed: {0}")]
    StoreQuery(String),

    #[error("Transaction not found: {0}")]
    RecordNotFound(TxHash),

    /// `tx_history` ran out of polls before the backfill landed.
    /// Carries whatever was found on the last poll.
    #[error("Backfill timed out with {} of the requested records", partial.len())]
    BackfillTimeout { partial: Vec<Transaction> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Payload(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Payload(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

/// Result type for mirror operations.
pub type Result<T> = std::result::Result<T, SyncError>;
