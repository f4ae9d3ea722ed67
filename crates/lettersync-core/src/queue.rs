//! Single-worker FIFO work queues.
//!
//! Producers only enqueue; the one worker that owns the `WorkQueue` dequeues
//! one item at a time and hands it to the `SyncEngine`. A handler error halts
//! the queue for good.

use tokio::sync::mpsc;

use crate::engine::{Applied, SyncEngine};
use crate::error::SyncError;
use crate::types::QueueItem;

/// Worker state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Waiting for the next item (or for the worker to start).
    Idle,
    /// An item is being handled.
    Processing,
    /// A handler failed. Terminal: nothing is dequeued any more.
    Halted,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Create a named queue: a cloneable producer handle and the worker side.
pub fn work_queue(name: &'static str) -> (QueueSender, WorkQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueSender { name, tx },
        WorkQueue {
            name,
            rx,
            state: QueueState::Idle,
            processed: 0,
        },
    )
}

/// Producer handle. Dropping every sender closes the queue.
#[derive(Debug, Clone)]
pub struct QueueSender {
    name: &'static str,
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl QueueSender {
    /// Enqueue an item. Fails once the worker side is gone.
    pub fn push(&self, item: impl Into<QueueItem>) -> Result<(), SyncError> {
        self.tx.send(item.into()).map_err(|_| SyncError::QueueHalted {
            queue: self.name.to_string(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Worker side of a queue. Items stay buffered until `drain` is called.
#[derive(Debug)]
pub struct WorkQueue {
    name: &'static str,
    rx: mpsc::UnboundedReceiver<QueueItem>,
    state: QueueState,
    processed: u64,
}

impl WorkQueue {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Number of items handled successfully.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Process items strictly one at a time until every sender is dropped
    /// and the buffer is empty. Returns the number of items handled.
    ///
    /// The first handler error halts the queue and is returned.
    pub async fn drain(&mut self, engine: &mut SyncEngine) -> Result<u64, SyncError> {
        if self.state == QueueState::Halted {
            return Err(SyncError::QueueHalted {
                queue: self.name.to_string(),
            });
        }
        let start = self.processed;
        while let Some(item) = self.rx.recv().await {
            self.state = QueueState::Processing;
            match engine.apply(item).await {
                Ok(applied) => {
                    self.processed += 1;
                    self.state = QueueState::Idle;
                    if let Applied::Appended { len } | Applied::Removed { len } = applied {
                        tracing::debug!(queue = self.name, len, "Event log updated");
                    }
                }
                Err(e) => {
                    self.state = QueueState::Halted;
                    self.rx.close();
                    tracing::error!(queue = self.name, error = %e, "Queue halted");
                    return Err(e);
                }
            }
        }
        Ok(self.processed - start)
    }
}
