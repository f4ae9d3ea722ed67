//! Live tip-following.
//!
//! Subscriptions are opened before backfill starts so nothing at the tip is
//! missed. Both streams land in the one live queue in arrival order; overlap
//! with the backfill is discarded by the reconciler when the item is applied.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use lettersync_core::{QueueItem, QueueSender, SyncError};

use crate::client::LiveFeed;
use crate::log::{LogFilter, RawLog};

/// Open subscriptions, buffering until [`LiveSubscriber::forward`] runs.
pub struct LiveStreams {
    logs: BoxStream<'static, Result<RawLog, SyncError>>,
    heads: BoxStream<'static, Result<u64, SyncError>>,
}

#[derive(Clone)]
pub struct LiveSubscriber {
    feed: Arc<dyn LiveFeed>,
    filter: LogFilter,
}

impl LiveSubscriber {
    pub fn new(feed: Arc<dyn LiveFeed>, filter: LogFilter) -> Self {
        Self { feed, filter }
    }

    /// Subscribe to matching logs and new heads.
    pub async fn subscribe(&self) -> Result<LiveStreams, SyncError> {
        let logs = self.feed.subscribe_logs(&self.filter).await?;
        let heads = self.feed.subscribe_heads().await?;
        tracing::info!(address = %self.filter.address, "subscribed to live logs and heads");
        Ok(LiveStreams { logs, heads })
    }

    /// Push every live item into `queue` until a stream ends or fails.
    ///
    /// Never returns `Ok`: the end of either stream is reported as
    /// [`SyncError::SubscriptionClosed`].
    pub async fn forward(streams: LiveStreams, queue: QueueSender) -> Result<(), SyncError> {
        let LiveStreams { mut logs, mut heads } = streams;
        loop {
            tokio::select! {
                biased;

                head = heads.next() => {
                    let Some(head) = head else {
                        return Err(closed("newHeads"));
                    };
                    let block = head?;
                    tracing::trace!(block, "new head");
                    queue.push(QueueItem::BlockNumber(block))?;
                }
                log = logs.next() => {
                    let Some(log) = log else {
                        return Err(closed("logs"));
                    };
                    let event = log?.decode()?;
                    tracing::info!(
                        block = event.block_number,
                        tx = %event.transaction_hash,
                        removed = event.removed,
                        "received live event"
                    );
                    queue.push(event)?;
                }
            }
        }
    }
}

fn closed(kind: &str) -> SyncError {
    SyncError::SubscriptionClosed {
        kind: kind.to_string(),
        reason: "stream ended".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;
    use lettersync_core::{work_queue, MemoryStore, RecordingPublisher, ReorgReconciler, SyncEngine};

    fn raw(block: u64, removed: bool) -> RawLog {
        RawLog {
            address: "0xabc".into(),
            topics: vec![
                "0xtopic".into(),
                format!("0x{:064x}", 0),
                format!("0x{:064x}", 0),
                format!("0x{:064x}", block),
            ],
            data: "0x".into(),
            block_number: Some(format!("0x{block:x}")),
            block_hash: Some(format!("0xhash{block}")),
            transaction_hash: Some("0xtx".into()),
            log_index: Some("0x0".into()),
            removed,
        }
    }

    /// Replays fixed items. Only the log stream ends.
    struct Fixed {
        logs: Mutex<Option<Vec<RawLog>>>,
        heads: Mutex<Option<Vec<u64>>>,
    }

    #[async_trait]
    impl LiveFeed for Fixed {
        async fn subscribe_logs(&self, _: &LogFilter) -> Result<BoxStream<'static, Result<RawLog, SyncError>>, SyncError> {
            let logs = self.logs.lock().unwrap().take().unwrap_or_default();
            Ok(stream::iter(logs.into_iter().map(Ok)).boxed())
        }

        async fn subscribe_heads(&self) -> Result<BoxStream<'static, Result<u64, SyncError>>, SyncError> {
            let heads = self.heads.lock().unwrap().take().unwrap_or_default();
            Ok(stream::iter(heads.into_iter().map(Ok)).chain(stream::pending()).boxed())
        }
    }

    #[tokio::test]
    async fn forwards_every_item_and_reports_closure() {
        let feed = Arc::new(Fixed {
            logs: Mutex::new(Some(vec![raw(1003, false), raw(1003, true), raw(1010, false)])),
            heads: Mutex::new(Some(vec![1011])),
        });
        let sub = LiveSubscriber::new(feed, LogFilter::new("0xabc", "0xtopic"));
        let streams = sub.subscribe().await.unwrap();
        let (tx, mut queue) = work_queue("live");

        let err = LiveSubscriber::forward(streams, tx).await.unwrap_err();
        assert!(matches!(err, SyncError::SubscriptionClosed { ref kind, .. } if kind == "logs"));

        // Head, append 1003, retract it, append 1010.
        let store = Arc::new(MemoryStore::new());
        let mut engine = SyncEngine::open(store, Arc::new(RecordingPublisher::new()), ReorgReconciler::new(10))
            .await
            .unwrap();
        assert_eq!(queue.drain(&mut engine).await.unwrap(), 4);
        let blocks: Vec<_> = engine.state().events.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, [1010]);
        assert_eq!(engine.state().synced_until.get(), Some(1001));
    }

    #[tokio::test]
    async fn stream_error_is_fatal() {
        struct Failing;
        #[async_trait]
        impl LiveFeed for Failing {
            async fn subscribe_logs(&self, _: &LogFilter) -> Result<BoxStream<'static, Result<RawLog, SyncError>>, SyncError> {
                Ok(stream::pending().boxed())
            }
            async fn subscribe_heads(&self) -> Result<BoxStream<'static, Result<u64, SyncError>>, SyncError> {
                Ok(stream::iter([Err(SyncError::Rpc("bad head".into()))]).boxed())
            }
        }

        let sub = LiveSubscriber::new(Arc::new(Failing), LogFilter::new("0xabc", "0xtopic"));
        let streams = sub.subscribe().await.unwrap();
        let (tx, _queue) = work_queue("live");
        assert!(matches!(
            LiveSubscriber::forward(streams, tx).await,
            Err(SyncError::Rpc(_))
        ));
    }
}
