//! Logical channel: one (local, remote, namespace) pipe over a shared link.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::broadcast;

use castlink_core::error::{CastError, Result};
use castlink_core::protocol::Message;

use super::registry::ChannelKey;
use super::LinkInner;

/// Handle returned by the subscribe family, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Listener {
    id: SubscriptionId,
    handler: Handler,
}

/// Cheap to clone; every clone refers to the same registered channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    key: ChannelKey,
    link: Weak<LinkInner>,
    listeners: Mutex<Vec<Listener>>,
    next_listener: AtomicU64,
    // Taken on close so open streams end.
    stream_tx: Mutex<Option<broadcast::Sender<Arc<Message>>>>,
    closed: AtomicBool,
}

impl Channel {
    pub(crate) fn new(key: ChannelKey, link: Weak<LinkInner>, capacity: usize) -> Self {
        let (stream_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(ChannelInner {
                key,
                link,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                stream_tx: Mutex::new(Some(stream_tx)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.inner.key
    }

    /// Local endpoint (our side).
    pub fn source(&self) -> &str {
        &self.inner.key.local
    }

    /// Remote endpoint (receiver or application transport id).
    pub fn destination(&self) -> &str {
        &self.inner.key.remote
    }

    pub fn namespace(&self) -> &str {
        &self.inner.key.namespace
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Same registered channel (not just the same key).
    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn link(&self) -> Result<Arc<LinkInner>> {
        if self.is_closed() {
            return Err(CastError::Closed);
        }
        self.inner.link.upgrade().ok_or(CastError::Closed)
    }

    /// Fire-and-forget. Returns the request id stamped on the message.
    pub fn send(&self, msg_type: &str, data: Value) -> Result<u64> {
        let k = &self.inner.key;
        self.link()?
            .send(&k.local, &k.remote, &k.namespace, msg_type, data)
    }

    /// Send and wait for the reply carrying the same request id.
    pub async fn send_and_await(&self, msg_type: &str, data: Value) -> Result<Arc<Message>> {
        let link = self.link()?;
        let k = &self.inner.key;
        link.send_and_await(&k.local, &k.remote, &k.namespace, msg_type, data)
            .await
    }

    /// Register a handler for every message delivered to this channel.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push(Listener {
                id,
                handler: Arc::new(handler),
            });
        }
        id
    }

    /// Register a handler for messages the `guard` narrows to `T`.
    pub fn subscribe_filtered<T, G, F>(&self, guard: G, handler: F) -> SubscriptionId
    where
        T: 'static,
        G: Fn(&Message) -> Option<&T> + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_validated(guard, |_: &T| true, handler)
    }

    /// Like `subscribe_filtered`, plus a semantic `validator` run after the
    /// guard. The handler only sees messages passing both.
    pub fn subscribe_validated<T, G, V, F>(&self, guard: G, validator: V, handler: F) -> SubscriptionId
    where
        T: 'static,
        G: Fn(&Message) -> Option<&T> + Send + Sync + 'static,
        V: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let ns = self.inner.key.namespace.clone();
        self.subscribe(move |msg| {
            let Some(typed) = guard(msg) else { return };
            if !validator(typed) {
                tracing::debug!(namespace = %ns, msg_type = msg.msg_type(), "message failed validation; dropped");
                return;
            }
            handler(typed);
        })
    }

    /// Returns `false` if the id was not registered (or already removed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut listeners) = self.inner.listeners.lock() else { return false };
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Pull-style view of incoming messages.
    ///
    /// Backed by a bounded queue: when a consumer falls behind, the oldest
    /// messages are dropped and the stream resumes from the oldest retained one.
    /// The stream ends when the channel closes.
    pub fn stream(&self) -> impl Stream<Item = Arc<Message>> + Send + 'static {
        let rx = self
            .inner
            .stream_tx
            .lock()
            .ok()
            .and_then(|tx| tx.as_ref().map(|tx| tx.subscribe()));
        let ns = self.inner.key.namespace.clone();

        futures_util::stream::unfold((rx, ns), |(rx, ns)| async move {
            let mut rx = rx?;
            loop {
                match rx.recv().await {
                    Ok(msg) => return Some((msg, (Some(rx), ns))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(namespace = %ns, skipped, "channel stream lagging; oldest messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Unregister from the link. Idempotent.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        match self.inner.link.upgrade() {
            Some(link) => link.close_channel(&self.inner.key),
            None => self.mark_closed(),
        }
    }

    /// Hand one message to every subscriber, in registration order.
    pub(crate) fn consume(&self, msg: Arc<Message>) {
        if self.is_closed() {
            return;
        }

        // Snapshot so handlers may (un)subscribe or open channels re-entrantly.
        let handlers: Vec<Handler> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|l| Arc::clone(&l.handler)).collect(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(&msg);
        }

        if let Ok(tx) = self.inner.stream_tx.lock() {
            if let Some(tx) = tx.as_ref() {
                // Err only means nobody is streaming.
                let _ = tx.send(msg);
            }
        }
    }

    pub(crate) fn mark_closed(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.clear();
        }
        if let Ok(mut tx) = self.inner.stream_tx.lock() {
            tx.take();
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.inner.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
