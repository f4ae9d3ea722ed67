//! The `RpcTransport` trait shared by the HTTP and WebSocket clients.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A JSON-RPC endpoint.
///
/// Implementations must be `Send + Sync`; the synchronizer shares one
/// transport between the historic fetcher and the live subscriber.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single request and wait for its response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Allocate a request id unique on this transport.
    fn next_id(&self) -> u64;

    /// Endpoint URL, for logging.
    fn url(&self) -> &str;
}

/// Call `method` and deserialize its result.
pub async fn call<T, R>(transport: &R, method: &str, params: Vec<Value>) -> Result<T, TransportError>
where
    T: DeserializeOwned,
    R: RpcTransport + ?Sized,
{
    let req = JsonRpcRequest::new(transport.next_id(), method, params);
    let resp = transport.send(req).await?;
    let result = resp.into_result().map_err(TransportError::Rpc)?;
    serde_json::from_value(result).map_err(TransportError::Deserialization)
}
