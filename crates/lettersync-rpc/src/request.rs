//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value, or the node's error object.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Server push for an `eth_subscribe` subscription.
///
/// ```json
/// {"jsonrpc":"2.0","method":"eth_subscription",
///  "params":{"subscription":"0x9ce5…","result":{…}}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionNotification {
    pub method: String,
    pub params: SubscriptionParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: String,
    pub result: Value,
}

/// Any message a node can send over a WebSocket.
#[derive(Debug, Clone)]
pub enum Incoming {
    Response(JsonRpcResponse),
    Notification(SubscriptionNotification),
}

impl Incoming {
    /// Classify a raw text frame. Returns `None` for anything unrecognized.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        if value.get("method").and_then(Value::as_str) == Some("eth_subscription") {
            return serde_json::from_value(value).ok().map(Self::Notification);
        }
        serde_json::from_value(value).ok().map(Self::Response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(7, "eth_blockNumber", vec![]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "eth_blockNumber");
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn response_error_wins() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: RpcId::Number(1),
            result: None,
            error: Some(JsonRpcError {
                code: -32000,
                message: "header not found".into(),
                data: None,
            }),
        };
        assert_eq!(resp.into_result().unwrap_err().code, -32000);
    }

    #[test]
    fn parse_notification() {
        let text = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {"subscription": "0xabc", "result": {"number": "0x10"}}
        })
        .to_string();
        match Incoming::parse(&text) {
            Some(Incoming::Notification(n)) => {
                assert_eq!(n.params.subscription, "0xabc");
                assert_eq!(n.params.result["number"], "0x10");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_response() {
        let text = r#"{"jsonrpc":"2.0","id":3,"result":"0x1f"}"#;
        match Incoming::parse(text) {
            Some(Incoming::Response(r)) => {
                assert_eq!(r.id, RpcId::Number(3));
                assert_eq!(r.into_result().unwrap(), json!("0x1f"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Incoming::parse("not json").is_none());
    }
}
