//! Chain access: bounded log queries and the live feed.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use lettersync_core::SyncError;
use lettersync_rpc::{call, RpcTransport, TransportError, WsTransport};

use crate::log::{parse_hex_u64, LogFilter, RawLog};

/// Request/response access to the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn head_block_number(&self) -> Result<u64, SyncError>;

    /// All logs matching `filter` in the inclusive range `[from, to]`,
    /// ascending.
    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError>;
}

/// Push access to the chain tip.
///
/// Streams end when the underlying connection goes away.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// New matching logs, including `removed` retraction notices.
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<BoxStream<'static, Result<RawLog, SyncError>>, SyncError>;

    /// Numbers of newly arrived block heads.
    async fn subscribe_heads(&self) -> Result<BoxStream<'static, Result<u64, SyncError>>, SyncError>;
}

pub(crate) fn rpc_error(e: TransportError) -> SyncError {
    SyncError::Rpc(e.to_string())
}

/// [`ChainClient`] over any JSON-RPC transport.
pub struct RpcChainClient<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: RpcTransport + ?Sized> RpcChainClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: RpcTransport + ?Sized> ChainClient for RpcChainClient<T> {
    async fn head_block_number(&self) -> Result<u64, SyncError> {
        let hex: String = call(&*self.transport, "eth_blockNumber", vec![])
            .await
            .map_err(rpc_error)?;
        parse_hex_u64(&hex).ok_or_else(|| SyncError::Rpc(format!("invalid block number {hex:?}")))
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError> {
        call(&*self.transport, "eth_getLogs", vec![filter.range_params(from, to)])
            .await
            .map_err(rpc_error)
    }
}

/// [`LiveFeed`] over `eth_subscribe`.
pub struct WsLiveFeed {
    transport: Arc<WsTransport>,
}

impl WsLiveFeed {
    pub fn new(transport: Arc<WsTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl LiveFeed for WsLiveFeed {
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<BoxStream<'static, Result<RawLog, SyncError>>, SyncError> {
        let sub = self
            .transport
            .subscribe("logs", vec![filter.subscription_params()])
            .await
            .map_err(rpc_error)?;
        Ok(sub
            .map(|value| serde_json::from_value::<RawLog>(value).map_err(|e| SyncError::Decode {
                tx_hash: String::new(),
                reason: format!("log notification: {e}"),
            }))
            .boxed())
    }

    async fn subscribe_heads(&self) -> Result<BoxStream<'static, Result<u64, SyncError>>, SyncError> {
        let sub = self
            .transport
            .subscribe("newHeads", vec![])
            .await
            .map_err(rpc_error)?;
        Ok(sub.map(|value| head_number(&value)).boxed())
    }
}

fn head_number(head: &Value) -> Result<u64, SyncError> {
    head.get("number")
        .and_then(Value::as_str)
        .and_then(parse_hex_u64)
        .ok_or_else(|| SyncError::Rpc(format!("newHeads notification without number: {head}")))
}
