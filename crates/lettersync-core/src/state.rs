//! The synchronizer's owned state: the confirmed event log and the checkpoint.
//!
//! `SyncState` is exactly what gets persisted:
//!
//! ```json
//! { "events": [ ... ], "syncedUntil": 1234 }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::types::{Event, EventKey};

// ─── EventLog ─────────────────────────────────────────────────────────────────

/// Ordered log of confirmed events.
///
/// Events are strictly increasing by `(blockNumber, logIndex)` and no two
/// share `(blockHash, logIndex)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog(Vec<Event>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently appended event.
    pub fn last(&self) -> Option<&Event> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.0.iter()
    }

    /// Returns `true` if an event with this identity is stored.
    pub fn contains(&self, key: &EventKey) -> bool {
        self.0.iter().any(|e| key.matches(e))
    }

    /// Append `event` to the tail and return the updated log.
    ///
    /// Fails if an event with the same `(blockHash, logIndex)` is already
    /// stored. The `removed` flag is cleared on the stored copy.
    pub fn append(&mut self, mut event: Event) -> Result<&[Event], SyncError> {
        if self.contains(&event.key()) {
            return Err(SyncError::DuplicateEvent {
                block_hash: event.block_hash,
                log_index: event.log_index,
            });
        }
        event.removed = false;
        self.0.push(event);
        Ok(&self.0)
    }

    /// Delete every entry matching `key` and return how many were removed.
    pub fn remove(&mut self, key: &EventKey) -> usize {
        let before = self.0.len();
        self.0.retain(|e| !key.matches(e));
        before - self.0.len()
    }

    /// Check the ordering and identity invariants.
    pub fn validate(&self) -> Result<(), String> {
        for (i, pair) in self.0.windows(2).enumerate() {
            if !pair[1].is_later_than(&pair[0]) {
                return Err(format!(
                    "event {} at {} does not follow event {} at {}",
                    i + 1,
                    pair[1].position(),
                    i,
                    pair[0].position()
                ));
            }
        }
        let mut seen = HashSet::with_capacity(self.0.len());
        for (i, event) in self.0.iter().enumerate() {
            if !seen.insert(event.key()) {
                return Err(format!("event {} ({}) is stored twice", i, event.key()));
            }
            if event.removed {
                return Err(format!("event {} ({}) is a removal notice", i, event.key()));
            }
        }
        Ok(())
    }
}

impl From<Vec<Event>> for EventLog {
    fn from(events: Vec<Event>) -> Self {
        Self(events)
    }
}

// ─── Checkpoint ───────────────────────────────────────────────────────────────

/// Highest block below which all events are considered durably synced.
///
/// `None` until the first block-number notification has been processed.
/// Never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(Option<u64>);

impl Checkpoint {
    pub fn at(block: u64) -> Self {
        Self(Some(block))
    }

    pub fn get(&self) -> Option<u64> {
        self.0
    }

    /// Move the checkpoint to `block` if that is an advance.
    ///
    /// Returns `true` if the checkpoint changed.
    pub fn advance_to(&mut self, block: u64) -> bool {
        match self.0 {
            Some(current) if block <= current => false,
            _ => {
                self.0 = Some(block);
                true
            }
        }
    }
}

// ─── SyncState ────────────────────────────────────────────────────────────────

/// The durable mirror: confirmed events plus the checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub events: EventLog,
    #[serde(rename = "syncedUntil")]
    pub synced_until: Checkpoint,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// First block the historic fetch has to cover: `max(deployBlock, syncedUntil)`.
    pub fn resume_block(&self, deploy_block: u64) -> u64 {
        deploy_block.max(self.synced_until.get().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(block: u64, log_index: u32, hash: &str) -> Event {
        Event {
            block_number: block,
            block_hash: hash.into(),
            transaction_hash: format!("0xtx{block}"),
            log_index,
            token_index: block,
            subject_id: "0x01".into(),
            removed: false,
        }
    }

    #[test]
    fn append_rejects_same_identity() {
        let mut log = EventLog::new();
        log.append(ev(100, 0, "0xa")).unwrap();
        let err = log.append(ev(100, 0, "0xa")).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateEvent { log_index: 0, .. }));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn append_returns_updated_log() {
        let mut log = EventLog::new();
        log.append(ev(100, 0, "0xa")).unwrap();
        let events = log.append(ev(101, 0, "0xb")).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].block_hash, "0xb");
    }

    #[test]
    fn remove_is_keyed_not_positional() {
        let mut log = EventLog::new();
        log.append(ev(100, 0, "0xa")).unwrap();
        log.append(ev(101, 0, "0xb")).unwrap();
        log.append(ev(102, 0, "0xc")).unwrap();

        let removed = log.remove(&EventKey {
            block_hash: "0xb".into(),
            log_index: 0,
        });
        assert_eq!(removed, 1);
        let hashes: Vec<_> = log.iter().map(|e| e.block_hash.as_str()).collect();
        assert_eq!(hashes, ["0xa", "0xc"]);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut log = EventLog::new();
        log.append(ev(100, 0, "0xa")).unwrap();
        let removed = log.remove(&EventKey {
            block_hash: "0xa".into(),
            log_index: 1,
        });
        assert_eq!(removed, 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn checkpoint_never_decreases() {
        let mut cp = Checkpoint::default();
        assert!(cp.advance_to(90));
        assert!(!cp.advance_to(70));
        assert!(!cp.advance_to(90));
        assert_eq!(cp.get(), Some(90));
        assert!(cp.advance_to(140));
        assert_eq!(cp.get(), Some(140));
    }

    #[test]
    fn resume_block_is_max_of_deploy_and_checkpoint() {
        let mut state = SyncState::new();
        assert_eq!(state.resume_block(1000), 1000);
        state.synced_until = Checkpoint::at(900);
        assert_eq!(state.resume_block(1000), 1000);
        state.synced_until = Checkpoint::at(1500);
        assert_eq!(state.resume_block(1000), 1500);
    }

    #[test]
    fn validate_detects_out_of_order_log() {
        let log = EventLog::from(vec![ev(101, 0, "0xb"), ev(100, 0, "0xa")]);
        assert!(log.validate().is_err());
        let log = EventLog::from(vec![ev(100, 0, "0xa"), ev(100, 1, "0xa")]);
        assert!(log.validate().is_ok());
    }

    #[test]
    fn validate_detects_repeated_identity() {
        let log = EventLog::from(vec![ev(100, 0, "0xa"), ev(101, 0, "0xb"), ev(102, 0, "0xa")]);
        let err = log.validate().unwrap_err();
        assert!(err.contains("stored twice"), "{err}");
    }

    #[test]
    fn validate_handles_long_logs() {
        let events: Vec<_> = (0..50_000u64)
            .map(|i| ev(1_000 + i, 0, &format!("0x{i:x}")))
            .collect();
        assert!(EventLog::from(events).validate().is_ok());
    }

    #[test]
    fn state_json_shape() {
        let mut state = SyncState::new();
        state.events.append(ev(100, 0, "0xa")).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert!(json["syncedUntil"].is_null());
        assert_eq!(json["events"].as_array().unwrap().len(), 1);

        state.synced_until.advance_to(90);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["syncedUntil"], 90);
        let back: SyncState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
