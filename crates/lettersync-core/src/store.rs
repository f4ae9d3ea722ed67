//! Durable storage for `SyncState`.
//!
//! The state is written wholesale after every mutation. On restart the
//! synchronizer resumes from whatever was last persisted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::SyncError;
use crate::state::SyncState;

/// Trait for loading and persisting the synchronizer state.
///
/// Implementations include `JsonFileStore` and `MemoryStore`.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Read the prior state. `Ok(None)` means a fresh start.
    async fn load(&self) -> Result<Option<SyncState>, SyncError>;

    /// Overwrite the stored state with `state`.
    async fn persist(&self, state: &SyncState) -> Result<(), SyncError>;
}

// ─── JSON file store ──────────────────────────────────────────────────────────

/// Stores the state as pretty-printed JSON in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> SyncError {
        SyncError::CorruptState {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl EventLogStore for JsonFileStore {
    async fn load(&self) -> Result<Option<SyncState>, SyncError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No state file found, syncing from scratch");
                return Ok(None);
            }
            Err(e) => {
                return Err(SyncError::Storage(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let state: SyncState =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        state.events.validate().map_err(|reason| self.corrupt(reason))?;

        tracing::info!(
            path = %self.path.display(),
            events = state.events.len(),
            synced_until = ?state.synced_until.get(),
            "Continuing sync from state file"
        );
        Ok(Some(state))
    }

    async fn persist(&self, state: &SyncState) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &json).await
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SyncError> {
    let io_err = |op: &str, e: std::io::Error| {
        SyncError::Storage(format!("{op} {}: {e}", path.display()))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err("create dir for", e))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| SyncError::Storage(format!("{} has no file name", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| io_err("create", e))?;
    file.write_all(contents).await.map_err(|e| io_err("write", e))?;
    file.sync_all().await.map_err(|e| io_err("sync", e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err("rename into", e))
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<SyncState>>,
    persists: AtomicUsize,
    fail_persist: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, as if it had been persisted earlier.
    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// The last persisted state.
    pub fn snapshot(&self) -> Option<SyncState> {
        self.state.lock().unwrap().clone()
    }

    /// Number of successful `persist` calls.
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::Relaxed)
    }

    /// Make every following `persist` fail (or succeed again).
    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl EventLogStore for MemoryStore {
    async fn load(&self) -> Result<Option<SyncState>, SyncError> {
        Ok(self.snapshot())
    }

    async fn persist(&self, state: &SyncState) -> Result<(), SyncError> {
        if self.fail_persist.load(Ordering::Relaxed) {
            return Err(SyncError::Storage("persist disabled".into()));
        }
        *self.state.lock().unwrap() = Some(state.clone());
        self.persists.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Event;

    fn ev(block: u64, hash: &str) -> Event {
        Event {
            block_number: block,
            block_hash: hash.into(),
            transaction_hash: "0xtx".into(),
            log_index: 0,
            token_index: 1,
            subject_id: "0x02".into(),
            removed: false,
        }
    }

    #[tokio::test]
    async fn missing_file_is_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("events.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/events.json"));

        let mut state = SyncState::new();
        state.events.append(ev(1001, "0xa")).unwrap();
        state.events.append(ev(1003, "0xb")).unwrap();
        state.synced_until.advance_to(90);
        store.persist(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!dir.path().join("nested/events.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_uses_persisted_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let store = JsonFileStore::new(&path);
        store.persist(&SyncState::new()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["events"], serde_json::json!([]));
        assert!(v["syncedUntil"].is_null());
    }

    #[tokio::test]
    async fn malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, b"{\"events\": [").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(err.is_fatal_state(), "got {err}");
    }

    #[tokio::test]
    async fn out_of_order_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let json = serde_json::json!({
            "events": [ev(1003, "0xb"), ev(1001, "0xa")],
            "syncedUntil": null,
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(err.is_fatal_state(), "got {err}");
    }

    #[tokio::test]
    async fn memory_store_counts_persists() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.persist(&SyncState::new()).await.unwrap();
        store.persist(&SyncState::new()).await.unwrap();
        assert_eq!(store.persist_count(), 2);

        store.set_fail_persist(true);
        assert!(store.persist(&SyncState::new()).await.is_err());
        assert_eq!(store.persist_count(), 2);
    }
}
