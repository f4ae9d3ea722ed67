//! lettersync-evm — EVM side of the synchronizer.
//!
//! - [`HistoricFetcher`]: paged `eth_getLogs` backfill into the historic queue
//! - [`LiveSubscriber`]: `logs` + `newHeads` subscriptions into the live queue
//! - [`Synchronizer`]: runs both against one `SyncEngine`
//!
//! Chain access goes through [`ChainClient`] and [`LiveFeed`], implemented
//! over `lettersync-rpc` transports by [`RpcChainClient`] and [`WsLiveFeed`].

pub mod builder;
pub mod client;
pub mod fetcher;
pub mod live;
pub mod log;
pub mod synchronizer;

pub use builder::SynchronizerBuilder;
pub use client::{ChainClient, LiveFeed, RpcChainClient, WsLiveFeed};
pub use fetcher::{FetchStats, HistoricFetcher};
pub use live::{LiveStreams, LiveSubscriber};
pub use log::{event_topic, LogFilter, RawLog, LETTER_TRANSFER_SIGNATURE};
pub use synchronizer::Synchronizer;
