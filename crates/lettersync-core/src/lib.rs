//! lettersync-core — the reorg-safe, append-only event synchronizer.
//!
//! # Architecture
//!
//! ```text
//! HistoricFetcher ──► historic WorkQueue ─┐
//!                                         ├─► SequentialProcessor ─► SyncEngine
//! LiveSubscriber ───► live WorkQueue ─────┘        (Backfilling → Live)  ├── ReorgReconciler
//!                     (paused until backfill)                          ├── EventLogStore
//!                                                                      └── MetadataPublisher
//! ```
//!
//! The fetch and subscription sides live in `lettersync-evm`.

pub mod config;
pub mod engine;
pub mod error;
pub mod processor;
pub mod publisher;
pub mod queue;
pub mod reorg;
pub mod state;
pub mod store;
pub mod types;

pub use config::SyncConfig;
pub use engine::{Applied, SyncEngine};
pub use error::SyncError;
pub use processor::{SequentialProcessor, SyncPhase};
pub use publisher::{MetadataPublisher, RecordingPublisher};
pub use queue::{work_queue, QueueSender, QueueState, WorkQueue};
pub use reorg::{admit_historic, DiscardReason, Reconciliation, ReorgReconciler};
pub use state::{Checkpoint, EventLog, SyncState};
pub use store::{EventLogStore, JsonFileStore, MemoryStore};
pub use types::{Event, EventKey, Position, QueueItem};
