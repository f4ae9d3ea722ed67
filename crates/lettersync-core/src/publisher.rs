//! Downstream publisher boundary.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::Event;

/// Consumes the full confirmed event list after every mutation.
///
/// Implementations must be idempotent: publishing an unchanged list again has
/// to produce identical output, since delivery is at-least-once across
/// restarts.
#[async_trait]
pub trait MetadataPublisher: Send + Sync {
    async fn publish(&self, events: &[Event]) -> Result<(), SyncError>;
}

/// Records every published list. Used in tests and dry runs.
#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<Vec<Event>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every list passed to `publish`, oldest first.
    pub fn calls(&self) -> Vec<Vec<Event>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MetadataPublisher for RecordingPublisher {
    async fn publish(&self, events: &[Event]) -> Result<(), SyncError> {
        self.calls.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}
