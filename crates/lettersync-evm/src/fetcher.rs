//! Historic backfill.
//!
//! Walks `[start, end]` in fixed, non-overlapping page windows, ascending,
//! and pushes every admissible event into the historic queue. The fetcher
//! owns the queue's sender and drops it when done, which is what lets the
//! processor leave the backfilling phase.

use std::sync::Arc;

use lettersync_core::{admit_historic, Event, QueueSender, SyncError};

use crate::client::ChainClient;
use crate::log::LogFilter;

/// Totals for one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: u64,
    pub logs: u64,
    pub admitted: u64,
}

/// Inclusive page windows covering `[start, end]`.
pub fn pages(start: u64, end: u64, page_size: u64) -> impl Iterator<Item = (u64, u64)> {
    let page_size = page_size.max(1);
    let mut next = (start <= end).then_some(start);
    std::iter::from_fn(move || {
        let from = next?;
        let to = from.saturating_add(page_size - 1).min(end);
        next = if to < end { Some(to + 1) } else { None };
        Some((from, to))
    })
}

pub struct HistoricFetcher {
    client: Arc<dyn ChainClient>,
    filter: LogFilter,
    page_size: u64,
}

impl HistoricFetcher {
    pub fn new(client: Arc<dyn ChainClient>, filter: LogFilter, page_size: u64) -> Self {
        Self {
            client,
            filter,
            page_size,
        }
    }

    /// Backfill `[start, end]`.
    ///
    /// `last_stored` is the tail of the log when backfill began; admission
    /// compares against it and then against the last admitted event.
    pub async fn run(
        self,
        start: u64,
        end: u64,
        last_stored: Option<Event>,
        queue: QueueSender,
    ) -> Result<FetchStats, SyncError> {
        tracing::info!(start, end, page_size = self.page_size, "fetching historic events");

        let mut stats = FetchStats::default();
        let mut last = last_stored;

        for (from, to) in pages(start, end, self.page_size) {
            let logs = self.client.get_logs(&self.filter, from, to).await?;
            stats.pages += 1;
            stats.logs += logs.len() as u64;

            for raw in &logs {
                let event = raw.decode()?;
                if !admit_historic(last.as_ref(), &event) {
                    tracing::debug!(
                        block = event.block_number,
                        log_index = event.log_index,
                        "skipping historic event already covered by the log"
                    );
                    continue;
                }
                if !event.removed {
                    last = Some(event.clone());
                }
                queue.push(event)?;
                stats.admitted += 1;
            }

            tracing::debug!(from, to, logs = logs.len(), "historic page fetched");
        }

        drop(queue);
        tracing::info!(
            pages = stats.pages,
            logs = stats.logs,
            admitted = stats.admitted,
            "historic fetch complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use lettersync_core::{
        work_queue, EventLog, MemoryStore, RecordingPublisher, ReorgReconciler, SyncEngine, SyncState,
        WorkQueue,
    };

    use crate::log::{parse_hex_u64, RawLog};

    fn raw(block: u64, log_index: u32, removed: bool) -> RawLog {
        RawLog {
            address: "0xabc".into(),
            topics: vec![
                "0xtopic".into(),
                format!("0x{:064x}", 1),
                format!("0x{:064x}", 0),
                format!("0x{:064x}", block),
            ],
            data: "0x".into(),
            block_number: Some(format!("0x{block:x}")),
            block_hash: Some(format!("0xhash{block}")),
            transaction_hash: Some("0xtx".into()),
            log_index: Some(format!("0x{log_index:x}")),
            removed,
        }
    }

    struct Paged {
        logs: Vec<RawLog>,
        ranges: Mutex<Vec<(u64, u64)>>,
    }

    impl Paged {
        fn new(logs: Vec<RawLog>) -> Arc<Self> {
            Arc::new(Self {
                logs,
                ranges: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl ChainClient for Paged {
        async fn head_block_number(&self) -> Result<u64, SyncError> {
            Ok(0)
        }

        async fn get_logs(&self, _: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError> {
            self.ranges.lock().unwrap().push((from, to));
            Ok(self
                .logs
                .iter()
                .filter(|l| {
                    let block = l.block_number.as_deref().and_then(parse_hex_u64).unwrap();
                    (from..=to).contains(&block)
                })
                .cloned()
                .collect())
        }
    }

    /// Apply everything the fetcher queued on top of `initial`.
    async fn apply_all(mut queue: WorkQueue, initial: SyncState) -> SyncState {
        let store = Arc::new(MemoryStore::with_state(initial));
        let mut engine = SyncEngine::open(store, Arc::new(RecordingPublisher::new()), ReorgReconciler::new(10))
            .await
            .unwrap();
        queue.drain(&mut engine).await.unwrap();
        engine.state().clone()
    }

    fn filter() -> LogFilter {
        LogFilter::new("0xabc", "0xtopic")
    }

    #[test]
    fn pages_are_non_overlapping() {
        let p: Vec<_> = pages(1000, 3500, 1000).collect();
        assert_eq!(p, [(1000, 1999), (2000, 2999), (3000, 3500)]);
        assert_eq!(pages(5, 5, 1000).collect::<Vec<_>>(), [(5, 5)]);
        assert_eq!(pages(6, 5, 1000).count(), 0);
        assert_eq!(pages(u64::MAX - 1, u64::MAX, 10).count(), 1);
    }

    #[tokio::test]
    async fn pages_ascending_and_admits_later_events() {
        let client = Paged::new(vec![raw(1001, 0, false), raw(1003, 1, false), raw(2500, 0, false)]);
        let (tx, rx) = work_queue("historic");
        let fetcher = HistoricFetcher::new(client.clone(), filter(), 1000);

        let stats = fetcher.run(1000, 2600, None, tx).await.unwrap();
        assert_eq!(stats, FetchStats { pages: 2, logs: 3, admitted: 3 });
        assert_eq!(*client.ranges.lock().unwrap(), [(1000, 1999), (2000, 2600)]);

        let state = apply_all(rx, SyncState::new()).await;
        let blocks: Vec<_> = state.events.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, [1001, 1003, 2500]);
    }

    #[tokio::test]
    async fn already_stored_events_are_not_admitted() {
        let stored = raw(100, 0, false).decode().unwrap();
        let client = Paged::new(vec![
            raw(95, 0, false),
            raw(100, 0, false),
            raw(100, 0, true),
            raw(120, 0, false),
        ]);
        let (tx, rx) = work_queue("historic");
        let fetcher = HistoricFetcher::new(client, filter(), 1000);

        let stats = fetcher.run(90, 130, Some(stored.clone()), tx).await.unwrap();
        assert_eq!(stats.logs, 4);
        assert_eq!(stats.admitted, 2, "retraction and the later event only");

        let initial = SyncState {
            events: EventLog::from(vec![stored]),
            ..SyncState::new()
        };
        let state = apply_all(rx, initial).await;
        let blocks: Vec<_> = state.events.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, [120]);
    }

    #[tokio::test]
    async fn undecodable_log_fails_the_backfill() {
        let mut bad = raw(1001, 0, false);
        bad.topics.truncate(1);
        let (tx, _rx) = work_queue("historic");
        let fetcher = HistoricFetcher::new(Paged::new(vec![bad]), filter(), 1000);
        assert!(matches!(
            fetcher.run(1000, 1005, None, tx).await,
            Err(SyncError::Decode { .. })
        ));
    }
}
