//! lettersync-rpc — JSON-RPC transports for the synchronizer.
//!
//! - [`HttpTransport`]: request/response over HTTP with bounded retry
//! - [`WsTransport`]: request/response plus `eth_subscribe` over one socket
//!
//! Both implement [`RpcTransport`]; [`call`] wraps request building and
//! result decoding.

pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod subscriptions;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use http::{HttpConfig, HttpTransport};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use subscriptions::{Subscription, SubscriptionId, SubscriptionRegistry};
pub use transport::{call, RpcTransport};
pub use ws::{WsConfig, WsTransport};
