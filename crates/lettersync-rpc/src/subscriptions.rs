//! `eth_subscribe` bookkeeping for the WebSocket transport.
//!
//! A node may push the first notification for a subscription before the
//! caller has seen the `eth_subscribe` response and registered a receiver.
//! Such notifications are parked per subscription id and handed over on
//! registration, so nothing between subscribe and register is lost.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

/// Upper bound on notifications parked for a single unknown subscription id.
const MAX_PARKED: usize = 4096;

/// A subscription id returned by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Slot {
    Parked(Vec<Value>),
    Active(mpsc::UnboundedSender<Value>),
}

#[derive(Default)]
struct Inner {
    slots: HashMap<SubscriptionId, Slot>,
    closed: bool,
}

/// Routes notifications to subscribers. Cheap to clone.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a receiver to `id`, replaying anything parked for it.
    ///
    /// If the registry is already closed the returned subscription ends
    /// immediately after the parked items.
    pub fn register(&self, id: SubscriptionId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if let Some(Slot::Parked(parked)) = inner.slots.remove(&id) {
            for value in parked {
                let _ = tx.send(value);
            }
        }
        if !inner.closed {
            inner.slots.insert(id.clone(), Slot::Active(tx));
        }
        Subscription { id, rx }
    }

    /// Forward a notification, parking it if nobody registered `id` yet.
    pub fn dispatch(&self, id: SubscriptionId, message: Value) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        let slots = &mut inner.slots;
        let receiver_gone = match slots.get_mut(&id) {
            Some(Slot::Active(tx)) => tx.send(message).is_err(),
            Some(Slot::Parked(parked)) => {
                if parked.len() < MAX_PARKED {
                    parked.push(message);
                } else {
                    tracing::warn!(subscription = %id, "dropping notification for unregistered subscription");
                }
                false
            }
            None => {
                slots.insert(id, Slot::Parked(vec![message]));
                return;
            }
        };
        if receiver_gone {
            slots.remove(&id);
        }
    }

    /// End every subscription. Later registrations end immediately.
    pub fn close_all(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.slots.clear();
    }

    /// Number of registered subscriptions.
    pub fn active(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Active(_)))
            .count()
    }
}

/// A stream of notification payloads for one subscription.
///
/// Ends when the connection closes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}
