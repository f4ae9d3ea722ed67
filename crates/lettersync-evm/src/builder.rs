//! Fluent builder for [`Synchronizer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use lettersync_evm::SynchronizerBuilder;
//!
//! let config = SynchronizerBuilder::new()
//!     .contract_address("0x2b2e1b07b1b1f02ef13e4d1f4d3c2a1a5c3e8f10")
//!     .event_signature("LetterTransfer(uint256,address,bytes32)")
//!     .deploy_block(14_000_000)
//!     .page_size(1000)
//!     .reorg_safety_margin(10)
//!     .build_config();
//! ```

use std::sync::Arc;

use lettersync_core::{EventLogStore, MetadataPublisher, SyncConfig, SyncError};

use crate::client::{ChainClient, LiveFeed};
use crate::log::{event_topic, LETTER_TRANSFER_SIGNATURE};
use crate::synchronizer::Synchronizer;

pub struct SynchronizerBuilder {
    config: SyncConfig,
    client: Option<Arc<dyn ChainClient>>,
    feed: Option<Arc<dyn LiveFeed>>,
    store: Option<Arc<dyn EventLogStore>>,
    publisher: Option<Arc<dyn MetadataPublisher>>,
}

impl Default for SynchronizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SynchronizerBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig {
                event_topic: event_topic(LETTER_TRANSFER_SIGNATURE),
                ..SyncConfig::default()
            },
            client: None,
            feed: None,
            store: None,
            publisher: None,
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: SyncConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.config.contract_address = address.into();
        self
    }

    /// Track the event with this signature (topic is derived via keccak-256).
    pub fn event_signature(mut self, signature: &str) -> Self {
        self.config.event_topic = event_topic(signature);
        self
    }

    /// Track the event with this precomputed topic.
    pub fn event_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.event_topic = topic.into();
        self
    }

    pub fn deploy_block(mut self, block: u64) -> Self {
        self.config.deploy_block = block;
        self
    }

    /// Blocks per `eth_getLogs` page during backfill.
    pub fn page_size(mut self, blocks: u64) -> Self {
        self.config.page_size = blocks;
        self
    }

    pub fn reorg_safety_margin(mut self, blocks: u64) -> Self {
        self.config.reorg_safety_margin = blocks;
        self
    }

    pub fn client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn live_feed(mut self, feed: Arc<dyn LiveFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn store(mut self, store: Arc<dyn EventLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn MetadataPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// The configuration as currently set.
    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    pub fn build(self) -> Result<Synchronizer, SyncError> {
        if self.config.contract_address.is_empty() {
            return Err(SyncError::Other("contract address is not set".into()));
        }
        if self.config.page_size == 0 {
            return Err(SyncError::Other("page size must be at least 1".into()));
        }
        let missing = |what: &str| SyncError::Other(format!("{what} is not set"));
        Ok(Synchronizer {
            client: self.client.ok_or_else(|| missing("chain client"))?,
            feed: self.feed.ok_or_else(|| missing("live feed"))?,
            store: self.store.ok_or_else(|| missing("event log store"))?,
            publisher: self.publisher.ok_or_else(|| missing("metadata publisher"))?,
            config: self.config,
        })
    }
}
