//! Link: one multiplexed Cast V2 connection.
//!
//! Owns the request-id counter, the heartbeat, the channel registry and the
//! pending-reply table. Decoded envelopes enter through [`Link::deliver`] in
//! wire order and are demultiplexed to channels by (source, destination,
//! namespace); a `*` destination fans out to every channel of that source.

mod channel;
mod pending;
mod registry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use castlink_core::error::{CastError, Result};
use castlink_core::protocol::message::{encode_request, kind};
use castlink_core::protocol::{namespace, Envelope, Heartbeat, Inbound, Message, Payload};

use crate::config::{ClientConfig, LinkSection};
use crate::transport;

pub use channel::{Channel, SubscriptionId};
pub use pending::{PendingRequests, Waiting};
pub use registry::{ChannelKey, ChannelRegistry};

/// Why a link ended. Reported once through [`Link::closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called.
    Local,
    /// The receiver closed the socket.
    RemoteClosed,
    /// Read or write failed.
    Socket(String),
    /// The byte stream could not be deframed.
    Frame(String),
}

impl CloseReason {
    pub fn into_error(self) -> CastError {
        match self {
            CloseReason::Local => CastError::Closed,
            CloseReason::RemoteClosed => CastError::RemoteClosed,
            CloseReason::Socket(e) => CastError::Socket(e),
            CloseReason::Frame(e) => CastError::Frame(e),
        }
    }
}

/// Shared handle to one connection. Clones refer to the same link.
#[derive(Clone)]
pub struct Link {
    inner: Arc<LinkInner>,
}

pub(crate) struct LinkInner {
    cfg: LinkSection,
    sender_id: String,
    out_tx: mpsc::UnboundedSender<Envelope>,
    next_request_id: AtomicU64,
    registry: ChannelRegistry,
    pending: PendingRequests,
    closed: watch::Sender<Option<CloseReason>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // Not aborted on a local close: it flushes what was already queued.
    writer: Mutex<Option<JoinHandle<()>>>,
    last_request: Mutex<Option<(u64, Instant)>>,
}

impl Link {
    /// TLS-connect to the configured device and start the link over it.
    pub async fn connect(cfg: &ClientConfig) -> Result<Self> {
        let stream = transport::tls::connect(&cfg.device).await?;
        tracing::info!(host = %cfg.device.host, port = cfg.device.port, "link up");
        Ok(Self::over_stream(stream, cfg))
    }

    /// Start the link over an already established byte stream.
    pub fn over_stream<S>(stream: S, cfg: &ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (link, out_rx) = Self::new(cfg);
        let (reader, writer) = transport::io::spawn(
            stream,
            link.downgrade(),
            link.inner.closed.subscribe(),
            out_rx,
            cfg.link.max_frame_bytes,
        );
        link.inner.track(reader);
        if let Ok(mut slot) = link.inner.writer.lock() {
            *slot = Some(writer);
        }
        link
    }

    /// Start a link without a transport: outbound envelopes go to the returned
    /// receiver and inbound ones are handed to [`Link::deliver`] by the caller.
    ///
    /// Spawns the heartbeat, so it must run inside a tokio runtime.
    pub fn new(cfg: &ClientConfig) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(None);
        let inner = Arc::new(LinkInner {
            cfg: cfg.link.clone(),
            sender_id: cfg.sender.id.clone(),
            out_tx,
            next_request_id: AtomicU64::new(cfg.link.initial_request_id),
            registry: ChannelRegistry::new(),
            pending: PendingRequests::new(),
            closed,
            tasks: Mutex::new(Vec::new()),
            writer: Mutex::new(None),
            last_request: Mutex::new(None),
        });

        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::downgrade(&inner),
            Duration::from_millis(cfg.link.heartbeat_interval_ms),
        ));
        inner.track(heartbeat);

        (Self { inner }, out_rx)
    }

    pub(crate) fn downgrade(&self) -> Weak<LinkInner> {
        Arc::downgrade(&self.inner)
    }

    /// Root sender endpoint of this link.
    pub fn sender_id(&self) -> &str {
        &self.inner.sender_id
    }

    /// Open (or return the already open) channel for this triple.
    ///
    /// A newly created channel immediately sends CONNECT on the connection
    /// namespace before any other traffic.
    pub fn open_channel(&self, source: &str, destination: &str, ns: &str) -> Result<Channel> {
        self.inner.open_channel(source, destination, ns)
    }

    /// Fire-and-forget. Returns the request id stamped on the message.
    pub fn send(&self, source: &str, destination: &str, ns: &str, msg_type: &str, data: Value) -> Result<u64> {
        self.inner.send(source, destination, ns, msg_type, data)
    }

    /// Send, then wait for the reply with the same request id.
    ///
    /// Fails with `Timeout` after `link.request_timeout_ms`, with `Rejected` on
    /// a receiver error reply, and with `Closed` if the link goes down first.
    pub async fn send_and_await(
        &self,
        source: &str,
        destination: &str,
        ns: &str,
        msg_type: &str,
        data: Value,
    ) -> Result<Arc<Message>> {
        self.inner
            .send_and_await(source, destination, ns, msg_type, data)
            .await
    }

    /// Feed one decoded envelope into the demultiplexer.
    pub fn deliver(&self, env: Envelope) {
        self.inner.deliver(env)
    }

    /// Close the link: stops heartbeat and reads, closes every channel and
    /// fails outstanding requests with `Closed`. Frames queued before the call
    /// are still written before the socket is shut down. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown(CloseReason::Local)
    }

    /// Close every channel (CLOSE goes out once per endpoint pair), then
    /// [`Link::close`], then wait until the queued frames were written and the
    /// stream was shut down.
    pub async fn close_and_flush(&self) {
        for key in self.inner.registry.keys() {
            self.inner.close_channel(&key);
        }
        self.close();
        let writer = self.inner.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            let _ = writer.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Resolves with the terminal reason once the link is down.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.inner.closed.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(CloseReason::Local),
            Err(_) => CloseReason::Local,
        };
        reason
    }

    pub fn channel_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

impl LinkInner {
    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.borrow().is_some()
    }

    fn abort_tasks(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn open_channel(self: &Arc<Self>, source: &str, destination: &str, ns: &str) -> Result<Channel> {
        if self.is_closed() {
            return Err(CastError::Closed);
        }

        let key = ChannelKey::new(source, destination, ns);
        let weak = Arc::downgrade(self);
        let capacity = self.cfg.subscriber_capacity;
        let (channel, created) = self
            .registry
            .get_or_insert_with(key, || Channel::new(ChannelKey::new(source, destination, ns), weak, capacity));

        if created {
            tracing::info!(source, destination, namespace = ns, "[{source}] <-> [{destination}]");
            self.send(source, destination, namespace::CONNECTION, kind::CONNECT, Value::Null)?;
        }
        Ok(channel)
    }

    fn close_channel(&self, key: &ChannelKey) {
        let Some(channel) = self.registry.remove(key) else { return };
        channel.mark_closed();
        tracing::debug!(source = %key.local, destination = %key.remote, namespace = %key.namespace, "channel closed");

        // The virtual connection is shared by every namespace on the pair.
        if !self.is_closed() && self.registry.on_pair(&key.local, &key.remote).is_empty() {
            let _ = self.send(&key.local, &key.remote, namespace::CONNECTION, kind::CLOSE, Value::Null);
        }
    }

    fn send_envelope(&self, env: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(CastError::Closed);
        }
        self.out_tx.send(env).map_err(|_| CastError::Closed)
    }

    fn send(&self, source: &str, destination: &str, ns: &str, msg_type: &str, data: Value) -> Result<u64> {
        let request_id = self.next_request_id();
        self.send_with_id(request_id, source, destination, ns, msg_type, data)?;
        Ok(request_id)
    }

    fn send_with_id(
        &self,
        request_id: u64,
        source: &str,
        destination: &str,
        ns: &str,
        msg_type: &str,
        data: Value,
    ) -> Result<()> {
        let payload = encode_request(msg_type, Some(request_id), data)?;
        self.send_envelope(Envelope::utf8(source, destination, ns, payload))?;

        tracing::info!(source, destination, namespace = ns, msg_type, request_id, "[{source}] -> [{destination}] ({ns} {msg_type})");
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some((request_id, Instant::now()));
        }
        Ok(())
    }

    async fn send_and_await(
        &self,
        source: &str,
        destination: &str,
        ns: &str,
        msg_type: &str,
        data: Value,
    ) -> Result<Arc<Message>> {
        let request_id = self.next_request_id();
        // Register before sending so a fast reply cannot slip past. The guard
        // unregisters on every exit, including the caller dropping this future.
        let (rx, _waiting) = self.pending.register(request_id);
        self.send_with_id(request_id, source, destination, ns, msg_type, data)?;

        let timeout_ms = self.cfg.request_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CastError::Closed),
            Err(_) => {
                tracing::warn!(request_id, msg_type, timeout_ms, "no reply");
                Err(CastError::Timeout(timeout_ms))
            }
        }
    }

    fn send_heartbeat(&self, hb: Heartbeat, destination: &str) -> Result<()> {
        tracing::trace!(destination, msg_type = hb.msg_type(), "heartbeat");
        self.send_envelope(Envelope::utf8(
            self.sender_id.as_str(),
            destination,
            namespace::HEARTBEAT,
            hb.body(),
        ))
    }

    fn deliver(&self, env: Envelope) {
        if self.is_closed() {
            return;
        }

        let Payload::Utf8(text) = &env.payload else {
            tracing::debug!(source = %env.source_id, namespace = %env.namespace, bytes = env.payload.len(), "binary payload dropped");
            return;
        };

        let msg = match Inbound::classify(&env.namespace, text) {
            Ok(Inbound::Heartbeat(hb)) => {
                tracing::trace!(source = %env.source_id, msg_type = hb.msg_type(), "heartbeat");
                if hb == Heartbeat::Ping {
                    let _ = self.send_heartbeat(Heartbeat::Pong, &env.source_id);
                }
                return;
            }
            Ok(Inbound::Message(msg)) => Arc::new(msg),
            Err(e) => {
                tracing::debug!(source = %env.source_id, namespace = %env.namespace, error = %e, "message dropped");
                return;
            }
        };

        let (source, destination, ns) = (&env.source_id, &env.destination_id, &env.namespace);
        let msg_type = msg.msg_type();
        tracing::info!(source = %source, destination = %destination, namespace = %ns, msg_type, "[{destination}] <- [{source}] ({ns} {msg_type})");
        self.log_round_trip(&msg);

        let is_close = ns == namespace::CONNECTION && msg_type == kind::CLOSE;
        let wildcard = destination == namespace::WILDCARD_ID;
        let targets = match (is_close, wildcard) {
            // CLOSE tears down the virtual connection: every namespace on it.
            (true, true) => self.registry.from_remote(source, None),
            (true, false) => self.registry.on_pair(destination, source),
            (false, true) => self.registry.from_remote(source, Some(ns)),
            (false, false) => self
                .registry
                .get(&ChannelKey::new(destination.as_str(), source.as_str(), ns.as_str()))
                .into_iter()
                .collect(),
        };

        if targets.is_empty() {
            tracing::debug!(source = %source, destination = %destination, namespace = %ns, msg_type, "no channel; dropped");
        }
        for channel in &targets {
            channel.consume(Arc::clone(&msg));
        }

        if is_close {
            for channel in &targets {
                if let Some(closed) = self.registry.remove(channel.key()) {
                    closed.mark_closed();
                }
            }
        }

        self.pending.resolve(&msg);
    }

    fn log_round_trip(&self, msg: &Message) {
        let Some(id) = msg.request_id() else { return };
        if let Ok(last) = self.last_request.lock() {
            if let Some((last_id, at)) = *last {
                if last_id == id {
                    tracing::debug!(request_id = id, rtt_ms = at.elapsed().as_secs_f64() * 1000.0, "round trip");
                }
            }
        }
    }

    fn shutdown(&self, reason: CloseReason) {
        let first = self.closed.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if !first {
            return;
        }

        match &reason {
            CloseReason::Local => tracing::info!("link closed"),
            other => tracing::warn!(reason = ?other, "link terminated"),
        }

        self.abort_tasks();
        // After a socket or frame error nothing more can be written.
        if reason != CloseReason::Local {
            if let Some(writer) = self.writer.lock().ok().and_then(|mut w| w.take()) {
                writer.abort();
            }
        }
        for channel in self.registry.drain() {
            channel.mark_closed();
        }
        self.pending.fail_all();
    }
}

impl Drop for LinkInner {
    // The writer ends by itself once `out_tx` is gone and the queue is empty.
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn heartbeat_loop(link: Weak<LinkInner>, period: Duration) {
    let mut tick = tokio::time::interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        let Some(link) = link.upgrade() else { break };
        if link.send_heartbeat(Heartbeat::Ping, namespace::RECEIVER_ID).is_err() {
            break;
        }
    }
}

/// Terminal notification from the IO tasks.
pub(crate) fn terminate(link: &Weak<LinkInner>, reason: CloseReason) {
    if let Some(link) = link.upgrade() {
        link.shutdown(reason);
    }
}

/// Inbound path used by the reader task.
pub(crate) fn deliver(link: &Weak<LinkInner>, env: Envelope) -> bool {
    match link.upgrade() {
        Some(link) => {
            link.deliver(env);
            true
        }
        None => false,
    }
}
