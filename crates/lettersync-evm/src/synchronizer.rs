//! The synchronizer: wires fetcher, subscriber, queues and engine together.
//!
//! # Startup
//! 1. Load persisted state (republishing a non-empty log once)
//! 2. Subscribe to live logs and heads; notifications buffer from here on
//! 3. Read the chain head; backfill covers `[max(deploy, syncedUntil), head]`
//!
//! # Run
//! Backfill feeds the historic queue while live items wait in the paused
//! live queue. Once the historic queue is drained the processor goes live.
//! A failed queue, a failed fetch, or a closed subscription ends the run
//! with an error; the process is expected to restart and resume from the
//! persisted state.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinError;

use lettersync_core::{
    work_queue, EventLogStore, MetadataPublisher, ReorgReconciler, SequentialProcessor, SyncConfig,
    SyncEngine, SyncError, SyncState,
};

use crate::client::{ChainClient, LiveFeed};
use crate::fetcher::HistoricFetcher;
use crate::live::LiveSubscriber;
use crate::log::LogFilter;

pub struct Synchronizer {
    pub(crate) config: SyncConfig,
    pub(crate) client: Arc<dyn ChainClient>,
    pub(crate) feed: Arc<dyn LiveFeed>,
    pub(crate) store: Arc<dyn EventLogStore>,
    pub(crate) publisher: Arc<dyn MetadataPublisher>,
}

impl Synchronizer {
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run until a fatal error.
    pub async fn run(self) -> Result<SyncState, SyncError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until a fatal error or until `shutdown` resolves.
    ///
    /// On shutdown the live feed is detached, the backfill (if still running)
    /// completes, every queued item is applied, and the final state is
    /// returned.
    pub async fn run_until<S>(self, shutdown: S) -> Result<SyncState, SyncError>
    where
        S: Future<Output = ()>,
    {
        let Self {
            config,
            client,
            feed,
            store,
            publisher,
        } = self;

        let reconciler = ReorgReconciler::new(config.reorg_safety_margin);
        let engine = SyncEngine::open(store, publisher, reconciler).await?;

        let filter = LogFilter::new(&config.contract_address, &config.event_topic);
        let subscriber = LiveSubscriber::new(feed, filter.clone());
        let streams = subscriber.subscribe().await?;

        let head = client.head_block_number().await?;
        let start = engine.state().resume_block(config.deploy_block);
        let last_stored = engine.state().events.last().cloned();
        tracing::info!(
            start,
            head,
            events = engine.state().events.len(),
            synced_until = ?engine.state().synced_until.get(),
            "starting sync"
        );

        let (historic_tx, historic) = work_queue("historic");
        let (live_tx, live) = work_queue("live");

        let fetcher = HistoricFetcher::new(client, filter, config.page_size);
        let backfill = async move {
            fetcher.run(start, head, last_stored, historic_tx).await.map(|_| ())
        };
        let mut forwarder = tokio::spawn(LiveSubscriber::forward(streams, live_tx));

        let processing = SequentialProcessor::new(engine, historic, live).run(backfill);
        tokio::pin!(processing);
        tokio::pin!(shutdown);

        let engine = tokio::select! {
            result = &mut processing => {
                if let Err(e) = result {
                    forwarder.abort();
                    return Err(e);
                }
                // The live queue only closes once the forwarder has stopped.
                return Err(live_feed_lost((&mut forwarder).await));
            }
            joined = &mut forwarder => return Err(live_feed_lost(joined)),
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, draining queues");
                forwarder.abort();
                let _ = (&mut forwarder).await;
                processing.await?
            }
        };

        Ok(engine.state().clone())
    }
}

fn live_feed_lost(joined: Result<Result<(), SyncError>, JoinError>) -> SyncError {
    let err = match joined {
        Ok(Err(e)) => e,
        Ok(Ok(())) => SyncError::SubscriptionClosed {
            kind: "live".into(),
            reason: "forwarder stopped".into(),
        },
        Err(e) => SyncError::Other(format!("live forwarder task failed: {e}")),
    };
    tracing::error!(error = %err, "live feed lost");
    err
}
