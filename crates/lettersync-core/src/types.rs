//! Shared types for the synchronizer pipeline.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

// ─── Event ────────────────────────────────────────────────────────────────────

/// One observed `LetterTransfer` event.
///
/// Serialized with the same field names as the persisted state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Hash of that block (`0x…`).
    pub block_hash: String,
    /// Hash of the emitting transaction (`0x…`).
    pub transaction_hash: String,
    /// Position of the log within its block.
    pub log_index: u32,
    /// Index of the token that changed hands.
    pub token_index: u64,
    /// Subject identifier carried by the transfer (32-byte hex, `0x…`).
    #[serde(rename = "subjectID")]
    pub subject_id: String,
    /// Set on reorg retraction notices.
    #[serde(default)]
    pub removed: bool,
}

impl Event {
    /// Identity used for deduplication and removal.
    pub fn key(&self) -> EventKey {
        EventKey {
            block_hash: self.block_hash.clone(),
            log_index: self.log_index,
        }
    }

    /// Ordering key `(blockNumber, logIndex)`.
    pub fn position(&self) -> Position {
        Position {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    /// Returns `true` if `self` strictly follows `other` by ordering key.
    pub fn is_later_than(&self, other: &Event) -> bool {
        self.position() > other.position()
    }
}

// ─── EventKey ─────────────────────────────────────────────────────────────────

/// Identity of a stored event: `(blockHash, logIndex)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub block_hash: String,
    pub log_index: u32,
}

impl EventKey {
    pub fn matches(&self, event: &Event) -> bool {
        event.log_index == self.log_index && event.block_hash == self.block_hash
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_hash, self.log_index)
    }
}

// ─── Position ─────────────────────────────────────────────────────────────────

/// Ordering key `(blockNumber, logIndex)`, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub block_number: u64,
    pub log_index: u32,
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block_number
            .cmp(&other.block_number)
            .then(self.log_index.cmp(&other.log_index))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.block_number, self.log_index)
    }
}

// ─── QueueItem ────────────────────────────────────────────────────────────────

/// A unit of work for a sequential queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// An observed event or removal notice.
    Event(Event),
    /// A new chain head was observed.
    BlockNumber(u64),
}

impl From<Event> for QueueItem {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
