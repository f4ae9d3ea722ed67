//! Reorg reconciliation.
//!
//! Decides what a freshly observed queue item means for the stored log:
//! 1. **New event**: strictly follows the last stored event → append
//! 2. **Duplicate / stale**: not strictly later → discard
//! 3. **Retraction**: `removed` notice for a stored `(blockHash, logIndex)` → remove
//! 4. **Unknown retraction**: `removed` notice for nothing stored → ignore
//!
//! Block-number items move the checkpoint to `block - reorg_safety_margin`.

use crate::state::SyncState;
use crate::types::{Event, EventKey, QueueItem};

/// What the engine should do with one queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Append the event to the tail of the log.
    Append(Event),
    /// Drop the event without touching state.
    Discard { event: Event, reason: DiscardReason },
    /// Delete the stored event with this identity.
    Remove(EventKey),
    /// Retraction for an event that is not stored.
    IgnoreRemoval(EventKey),
    /// Move the checkpoint forward.
    AdvanceCheckpoint(u64),
    /// Block number does not move the checkpoint.
    KeepCheckpoint { block: u64 },
}

/// Why an event was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Same identity as an already stored event.
    Duplicate,
    /// Not strictly later than the last stored event.
    Stale,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Classifies queue items against the current state.
#[derive(Debug, Clone, Copy)]
pub struct ReorgReconciler {
    /// Blocks to lag behind the observed head before checkpointing.
    reorg_safety_margin: u64,
}

impl ReorgReconciler {
    pub fn new(reorg_safety_margin: u64) -> Self {
        Self {
            reorg_safety_margin,
        }
    }

    pub fn reorg_safety_margin(&self) -> u64 {
        self.reorg_safety_margin
    }

    /// Classify `item` against `state`. Pure: never mutates.
    pub fn reconcile(&self, state: &SyncState, item: QueueItem) -> Reconciliation {
        match item {
            QueueItem::BlockNumber(block) => self.reconcile_block(state, block),
            QueueItem::Event(event) if event.removed => {
                let key = event.key();
                if state.events.contains(&key) {
                    tracing::warn!(
                        block = event.block_number,
                        key = %key,
                        "Reorg retraction for stored event"
                    );
                    Reconciliation::Remove(key)
                } else {
                    Reconciliation::IgnoreRemoval(key)
                }
            }
            QueueItem::Event(event) => match state.events.last() {
                None => Reconciliation::Append(event),
                Some(prev) if event.is_later_than(prev) => Reconciliation::Append(event),
                Some(_) => {
                    let reason = if state.events.contains(&event.key()) {
                        DiscardReason::Duplicate
                    } else {
                        DiscardReason::Stale
                    };
                    Reconciliation::Discard { event, reason }
                }
            },
        }
    }

    fn reconcile_block(&self, state: &SyncState, block: u64) -> Reconciliation {
        let Some(candidate) = block.checked_sub(self.reorg_safety_margin) else {
            return Reconciliation::KeepCheckpoint { block };
        };
        match state.synced_until.get() {
            Some(current) if candidate <= current => Reconciliation::KeepCheckpoint { block },
            _ => Reconciliation::AdvanceCheckpoint(candidate),
        }
    }
}

/// Historic admission rule: forward an event if it is a retraction or it
/// strictly follows the most recently stored event.
pub fn admit_historic(last_stored: Option<&Event>, event: &Event) -> bool {
    event.removed
        || match last_stored {
            None => true,
            Some(prev) => event.is_later_than(prev),
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Checkpoint;

    fn ev(block: u64, log_index: u32, hash: &str) -> Event {
        Event {
            block_number: block,
            block_hash: hash.into(),
            transaction_hash: "0xtx".into(),
            log_index,
            token_index: 0,
            subject_id: "0x01".into(),
            removed: false,
        }
    }

    fn removal(e: &Event) -> Event {
        Event {
            removed: true,
            ..e.clone()
        }
    }

    fn state_with(events: &[Event]) -> SyncState {
        let mut state = SyncState::new();
        for e in events {
            state.events.append(e.clone()).unwrap();
        }
        state
    }

    #[test]
    fn first_event_is_appended() {
        let rec = ReorgReconciler::new(10);
        let e = ev(100, 0, "0xa");
        let out = rec.reconcile(&SyncState::new(), e.clone().into());
        assert_eq!(out, Reconciliation::Append(e));
    }

    #[test]
    fn redelivered_event_is_duplicate() {
        let rec = ReorgReconciler::new(10);
        let a = ev(100, 0, "0xa");
        let state = state_with(&[a.clone()]);
        match rec.reconcile(&state, a.into()) {
            Reconciliation::Discard { reason, .. } => assert_eq!(reason, DiscardReason::Duplicate),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn earlier_unknown_event_is_stale() {
        let rec = ReorgReconciler::new(10);
        let state = state_with(&[ev(100, 5, "0xa")]);
        match rec.reconcile(&state, ev(100, 2, "0xa").into()) {
            Reconciliation::Discard { reason, .. } => assert_eq!(reason, DiscardReason::Stale),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retraction_of_stored_event_removes() {
        let rec = ReorgReconciler::new(10);
        let (a, b, c) = (ev(100, 0, "0xa"), ev(101, 0, "0xb"), ev(102, 0, "0xc"));
        let state = state_with(&[a, b.clone(), c]);
        assert_eq!(
            rec.reconcile(&state, removal(&b).into()),
            Reconciliation::Remove(b.key())
        );
    }

    #[test]
    fn retraction_of_unknown_event_is_ignored() {
        let rec = ReorgReconciler::new(10);
        let state = state_with(&[ev(100, 0, "0xa")]);
        let ghost = ev(100, 0, "0xfork");
        assert_eq!(
            rec.reconcile(&state, removal(&ghost).into()),
            Reconciliation::IgnoreRemoval(ghost.key())
        );
    }

    #[test]
    fn checkpoint_sequence_is_monotonic() {
        let rec = ReorgReconciler::new(10);
        let mut state = SyncState::new();
        let mut seen = vec![];
        for block in [100, 80, 150] {
            if let Reconciliation::AdvanceCheckpoint(b) =
                rec.reconcile(&state, QueueItem::BlockNumber(block))
            {
                state.synced_until.advance_to(b);
            }
            seen.push(state.synced_until.get());
        }
        assert_eq!(seen, [Some(90), Some(90), Some(140)]);
    }

    #[test]
    fn block_below_margin_keeps_checkpoint() {
        let rec = ReorgReconciler::new(10);
        let state = SyncState {
            synced_until: Checkpoint::default(),
            ..SyncState::new()
        };
        assert_eq!(
            rec.reconcile(&state, QueueItem::BlockNumber(7)),
            Reconciliation::KeepCheckpoint { block: 7 }
        );
    }

    #[test]
    fn historic_admission() {
        let last = ev(100, 3, "0xa");
        assert!(admit_historic(None, &ev(1, 0, "0x1")));
        assert!(admit_historic(Some(&last), &ev(100, 4, "0xa")));
        assert!(!admit_historic(Some(&last), &ev(100, 3, "0xa")));
        assert!(!admit_historic(Some(&last), &ev(99, 0, "0x9")));
        assert!(admit_historic(Some(&last), &removal(&ev(50, 0, "0x5"))));
    }
}
