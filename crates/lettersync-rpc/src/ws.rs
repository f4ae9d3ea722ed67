//! WebSocket JSON-RPC transport with `eth_subscribe` support.
//!
//! One background task owns the socket. Callers talk to it over a command
//! channel; responses are matched to requests by id and notifications are
//! routed through the [`SubscriptionRegistry`].
//!
//! There is no reconnect. When the socket goes away every pending request
//! fails and every subscription stream ends, leaving recovery to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::request::{Incoming, JsonRpcRequest, JsonRpcResponse, RpcId};
use crate::subscriptions::{Subscription, SubscriptionId, SubscriptionRegistry};
use crate::transport::{call, RpcTransport};

type Reply = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// In-flight requests awaiting a response, keyed by request id.
#[derive(Default)]
struct Pending(HashMap<u64, Reply>);

impl Pending {
    /// Track `reply`, first dropping entries whose caller already gave up
    /// (timed out or cancelled).
    fn insert(&mut self, id: u64, reply: Reply) {
        self.0.retain(|_, r| !r.is_closed());
        self.0.insert(id, reply);
    }

    fn take(&mut self, id: u64) -> Option<Reply> {
        self.0.remove(&id)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn fail_all(&mut self, reason: &str) {
        for (_, reply) in self.0.drain() {
            let _ = reply.send(Err(TransportError::WebSocket(format!("connection lost: {reason}"))));
        }
    }
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    /// How long to wait for the response to a single request.
    pub request_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

enum Command {
    Send { req: JsonRpcRequest, reply: Reply },
    Close,
}

pub struct WsTransport {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    registry: SubscriptionRegistry,
    ids: AtomicU64,
    request_timeout: Duration,
}

impl WsTransport {
    /// Open the socket and start the background task.
    pub async fn connect(url: impl Into<String>, config: WsConfig) -> Result<Self, TransportError> {
        let url = url.into();
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(format!("connect {url}: {e}")))?;
        tracing::info!(url = %url, "WebSocket connected");

        let (commands, command_rx) = mpsc::unbounded_channel();
        let registry = SubscriptionRegistry::new();
        tokio::spawn(socket_task(url.clone(), socket, command_rx, registry.clone()));

        Ok(Self {
            url,
            commands,
            registry,
            ids: AtomicU64::new(1),
            request_timeout: config.request_timeout,
        })
    }

    /// `eth_subscribe` to `kind` (`"logs"`, `"newHeads"`, ...).
    pub async fn subscribe(&self, kind: &str, params: Vec<Value>) -> Result<Subscription, TransportError> {
        let args = std::iter::once(Value::String(kind.to_string()))
            .chain(params)
            .collect();
        let id: String = call(self, "eth_subscribe", args).await?;
        tracing::debug!(kind, subscription = %id, "subscribed");
        Ok(self.registry.register(SubscriptionId(id)))
    }

    /// `false` once the background task has exited.
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Close);
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { req, reply })
            .map_err(|_| TransportError::WebSocket("connection closed".into()))?;

        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::WebSocket("connection closed".into())),
            Err(_) => Err(TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

async fn socket_task(
    url: String,
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<Command>,
    registry: SubscriptionRegistry,
) {
    let (mut sink, mut stream) = socket.split();
    let mut pending = Pending::default();

    let reason = loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                None | Some(Command::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break "closed by client".to_string();
                }
                Some(Command::Send { req, reply }) => {
                    let RpcId::Number(id) = &req.id else {
                        let _ = reply.send(Err(TransportError::Other("request id must be numeric".into())));
                        continue;
                    };
                    let text = match serde_json::to_string(&req) {
                        Ok(text) => text,
                        Err(e) => {
                            let _ = reply.send(Err(e.into()));
                            continue;
                        }
                    };
                    pending.insert(*id, reply);
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break format!("send failed: {e}");
                    }
                }
            },
            msg = stream.next() => match msg {
                None => break "stream ended".to_string(),
                Some(Err(e)) => break format!("receive failed: {e}"),
                Some(Ok(Message::Close(frame))) => break format!("closed by server: {frame:?}"),
                Some(Ok(Message::Text(text))) => route(text.as_str(), &mut pending, &registry),
                Some(Ok(_)) => {}
            },
        }
    };

    tracing::warn!(url = %url, reason = %reason, pending = pending.len(), "WebSocket disconnected");
    pending.fail_all(&reason);
    registry.close_all();
}

fn route(text: &str, pending: &mut Pending, registry: &SubscriptionRegistry) {
    match Incoming::parse(text) {
        Some(Incoming::Notification(n)) => {
            registry.dispatch(SubscriptionId(n.params.subscription), n.params.result);
        }
        Some(Incoming::Response(resp)) => {
            let RpcId::Number(id) = resp.id.clone() else {
                tracing::debug!(id = %resp.id, "response with non-numeric id");
                return;
            };
            match pending.take(id) {
                Some(reply) => {
                    let _ = reply.send(Ok(resp));
                }
                None => tracing::debug!(id, "response for unknown request"),
            }
        }
        None => tracing::debug!("unrecognized WebSocket frame"),
    }
}
