//! `SequentialProcessor` drives the historic and live queues through the
//! single `SyncEngine`.
//!
//! # Phase 1: BACKFILLING
//! The historic queue is drained while the backfill future fills it. The live
//! queue accepts and buffers items but nothing is dequeued from it.
//!
//! # Phase 2: LIVE
//! Entered exactly once, after the backfill future finished and the historic
//! queue is empty. The live queue is drained in arrival order until its
//! producers go away.
//!
//! Only one item is ever in flight across both queues. Any error moves the
//! processor to `Halted`, which is terminal.

use std::future::Future;

use tokio::sync::watch;

use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::queue::WorkQueue;

/// Current phase of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Catching up on historic events; the live queue is paused.
    Backfilling,
    /// Following the chain tip.
    Live,
    /// A queue failed; no further items are processed.
    Halted,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

pub struct SequentialProcessor {
    engine: SyncEngine,
    historic: WorkQueue,
    live: WorkQueue,
    phase: watch::Sender<SyncPhase>,
}

impl SequentialProcessor {
    pub fn new(engine: SyncEngine, historic: WorkQueue, live: WorkQueue) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Backfilling);
        Self {
            engine,
            historic,
            live,
            phase,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Run both phases and return the engine once the live queue closes.
    ///
    /// `backfill` must own the last sender of the historic queue so the
    /// queue closes when it finishes.
    pub async fn run<F>(self, backfill: F) -> Result<SyncEngine, SyncError>
    where
        F: Future<Output = Result<(), SyncError>>,
    {
        let Self {
            mut engine,
            mut historic,
            mut live,
            phase,
        } = self;

        match tokio::try_join!(backfill, historic.drain(&mut engine)) {
            Ok(((), processed)) => {
                tracing::info!(
                    processed,
                    events = engine.state().events.len(),
                    "Historic events synced, now watching for live events"
                );
            }
            Err(e) => {
                phase.send_replace(SyncPhase::Halted);
                return Err(e);
            }
        }

        phase.send_replace(SyncPhase::Live);

        match live.drain(&mut engine).await {
            Ok(processed) => {
                tracing::info!(processed, "Live queue closed");
                Ok(engine)
            }
            Err(e) => {
                phase.send_replace(SyncPhase::Halted);
                Err(e)
            }
        }
    }
}
