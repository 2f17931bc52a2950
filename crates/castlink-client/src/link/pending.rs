use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use castlink_core::error::{CastError, Result};
use castlink_core::protocol::Message;

type Reply = Result<Arc<Message>>;

/// Outstanding `send_and_await` calls, keyed by request id.
///
/// Matching is ID-exclusive: a message resolves a pending request only when
/// its `requestId` equals that request's id, whatever triple it arrived on.
#[derive(Default)]
pub struct PendingRequests {
    waiting: DashMap<u64, oneshot::Sender<Reply>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            waiting: DashMap::new(),
        }
    }

    /// Start waiting for `request_id`. The entry lives as long as the
    /// returned [`Waiting`] guard, so an abandoned wait cannot leak.
    pub fn register(&self, request_id: u64) -> (oneshot::Receiver<Reply>, Waiting<'_>) {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(request_id, tx);
        (
            rx,
            Waiting {
                pending: self,
                request_id,
            },
        )
    }

    pub fn forget(&self, request_id: u64) {
        self.waiting.remove(&request_id);
    }

    /// Complete the request `msg` answers, if one is waiting.
    /// Error replies complete it with `Rejected`.
    pub fn resolve(&self, msg: &Arc<Message>) -> bool {
        let Some(id) = msg.request_id() else { return false };
        let Some((_, tx)) = self.waiting.remove(&id) else { return false };

        let reply = if msg.is_error_reply() {
            Err(CastError::Rejected {
                msg_type: msg.msg_type().to_owned(),
                reason: msg.reason().map(str::to_owned),
            })
        } else {
            Ok(Arc::clone(msg))
        };
        // Receiver gone means the caller timed out or was dropped.
        let _ = tx.send(reply);
        true
    }

    /// Fail every waiter with `Closed`.
    pub fn fail_all(&self) {
        let ids: Vec<u64> = self.waiting.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.waiting.remove(&id) {
                let _ = tx.send(Err(CastError::Closed));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Unregisters its request id on drop. A no-op once the request was resolved
/// or failed, since ids are never reused.
pub struct Waiting<'a> {
    pending: &'a PendingRequests,
    request_id: u64,
}

impl Waiting<'_> {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.request_id);
    }
}
