//! `SyncEngine` owns the `SyncState` and applies queue items to it.
//!
//! Every mutation is staged on a copy, persisted, and only then committed and
//! handed to the publisher. A failed persist leaves the in-memory state
//! untouched; a crash between persist and publish is repaired by the startup
//! republish.

use std::sync::Arc;

use crate::error::SyncError;
use crate::publisher::MetadataPublisher;
use crate::reorg::{Reconciliation, ReorgReconciler};
use crate::state::SyncState;
use crate::store::EventLogStore;
use crate::types::QueueItem;

/// Result of applying one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Event appended; log now has `len` entries.
    Appended { len: usize },
    /// Stored event retracted; log now has `len` entries.
    Removed { len: usize },
    /// Duplicate or stale event dropped.
    Discarded,
    /// Retraction for an event that was never stored.
    RemovalIgnored,
    /// Checkpoint moved to `synced_until`.
    CheckpointAdvanced { synced_until: u64 },
    /// Block number left the checkpoint unchanged.
    CheckpointUnchanged,
}

/// The single writer of the synchronizer state.
pub struct SyncEngine {
    state: SyncState,
    store: Arc<dyn EventLogStore>,
    publisher: Arc<dyn MetadataPublisher>,
    reconciler: ReorgReconciler,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Load the persisted state (or start empty) and republish it once if it
    /// holds any events.
    pub async fn open(
        store: Arc<dyn EventLogStore>,
        publisher: Arc<dyn MetadataPublisher>,
        reconciler: ReorgReconciler,
    ) -> Result<Self, SyncError> {
        let state = store.load().await?.unwrap_or_default();
        let engine = Self {
            state,
            store,
            publisher,
            reconciler,
        };
        if !engine.state.events.is_empty() {
            tracing::info!(
                events = engine.state.events.len(),
                "Republishing persisted event log"
            );
            engine.publisher.publish(engine.state.events.as_slice()).await?;
        }
        Ok(engine)
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Apply one item: reconcile, persist, commit, publish.
    pub async fn apply(&mut self, item: QueueItem) -> Result<Applied, SyncError> {
        match self.reconciler.reconcile(&self.state, item) {
            Reconciliation::Append(event) => {
                tracing::info!(
                    block = event.block_number,
                    log_index = event.log_index,
                    tx = %event.transaction_hash,
                    "Received transfer event"
                );
                let mut next = self.state.clone();
                next.events.append(event)?;
                self.commit(next).await?;
                self.publish().await?;
                Ok(Applied::Appended {
                    len: self.state.events.len(),
                })
            }
            Reconciliation::Discard { event, reason } => {
                tracing::debug!(
                    block = event.block_number,
                    log_index = event.log_index,
                    %reason,
                    "Discarding event"
                );
                Ok(Applied::Discarded)
            }
            Reconciliation::Remove(key) => {
                let mut next = self.state.clone();
                let removed = next.events.remove(&key);
                tracing::info!(%key, removed, "Removing retracted event");
                self.commit(next).await?;
                self.publish().await?;
                Ok(Applied::Removed {
                    len: self.state.events.len(),
                })
            }
            Reconciliation::IgnoreRemoval(key) => {
                tracing::debug!(%key, "Removal notice for unknown event");
                Ok(Applied::RemovalIgnored)
            }
            Reconciliation::AdvanceCheckpoint(block) => {
                let mut next = self.state.clone();
                next.synced_until.advance_to(block);
                self.commit(next).await?;
                tracing::debug!(synced_until = block, "Checkpoint advanced");
                Ok(Applied::CheckpointAdvanced {
                    synced_until: block,
                })
            }
            Reconciliation::KeepCheckpoint { block } => {
                tracing::trace!(block, "Checkpoint unchanged");
                Ok(Applied::CheckpointUnchanged)
            }
        }
    }

    async fn commit(&mut self, next: SyncState) -> Result<(), SyncError> {
        self.store.persist(&next).await?;
        self.state = next;
        Ok(())
    }

    async fn publish(&self) -> Result<(), SyncError> {
        self.publisher.publish(self.state.events.as_slice()).await
    }
}
