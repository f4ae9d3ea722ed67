//! Error types for the synchronizer pipeline.

use thiserror::Error;

/// Errors that can occur while synchronizing the event log.
///
/// Every error that reaches a queue worker is fatal to that queue.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Subscription '{kind}' ended: {reason}")]
    SubscriptionClosed { kind: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed state file {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("Event {block_hash}:{log_index} is already stored")]
    DuplicateEvent { block_hash: String, log_index: u32 },

    #[error("Cannot decode log in tx {tx_hash}: {reason}")]
    Decode { tx_hash: String, reason: String },

    #[error("Publisher failed: {0}")]
    Publish(String),

    #[error("Queue '{queue}' is halted")]
    QueueHalted { queue: String },

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` if the persisted state cannot be trusted and an operator
    /// has to repair or delete it.
    pub fn is_fatal_state(&self) -> bool {
        matches!(self, Self::CorruptState { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
