//! Outbound channel: notifications and server-initiated requests.
//!
//! Every server→client request gets a fresh numeric correlation id and a
//! oneshot reply slot in `pending`. The slot is written by the inbound reader
//! when the client replies, by the timeout path, or by teardown. Removing the
//! entry from the map is what claims the right to complete it, so each slot
//! is completed at most once.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::transport::TransportHandle;
use crate::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, LogLevel, McpError, McpResult, RequestId,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Outbound {
    transport: OnceLock<TransportHandle>,
    pending: DashMap<i64, oneshot::Sender<McpResult<Value>>>,
    next_id: AtomicI64,
    /// Write-locked to close; frames that must not outlive the session are
    /// sent under the read lock.
    closed: RwLock<bool>,
    min_log_level: AtomicU8,
    request_timeout: Duration,
}

impl Outbound {
    pub(crate) fn new(request_timeout: Duration) -> Self {
        Self {
            transport: OnceLock::new(),
            pending: DashMap::new(),
            next_id: AtomicI64::new(1),
            closed: RwLock::new(false),
            min_log_level: AtomicU8::new(LogLevel::Debug.as_u8()),
            request_timeout,
        }
    }

    pub(crate) fn attach(&self, transport: TransportHandle) -> McpResult<()> {
        self.transport.set(transport).map_err(|_| {
            McpError::Configuration("session is already attached to a transport".to_string())
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `step` with the channel locked and close it if `step` returns
    /// true. A frame sent through [`Outbound::send_open`] either goes out
    /// before `step` runs or not at all.
    pub(crate) fn close_if(&self, step: impl FnOnce() -> bool) -> bool {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        let done = step();
        if done {
            *closed = true;
        }
        done
    }

    /// Queue a frame unless the channel has been closed.
    pub fn send_open(&self, message: JsonRpcMessage) -> bool {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        !*closed && self.send(message)
    }

    /// Queue a frame. Returns `false` when there is no live transport.
    pub fn send(&self, message: JsonRpcMessage) -> bool {
        match self.transport.get() {
            Some(transport) => transport.send(message),
            None => false,
        }
    }

    /// Fire-and-forget notification. Delivery failures are logged, never returned.
    pub fn notify(&self, method: &str, params: Option<Value>) {
        let notification = JsonRpcNotification::new(method, params);
        if !self.send_open(JsonRpcMessage::Notification(notification)) {
            tracing::debug!("Dropping {method}: session closed or transport unavailable");
        }
    }

    /// Send a request to the client and wait for its reply, bounded by the
    /// session request timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        if self.is_closed() {
            return Err(McpError::SessionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            id,
        };

        // Teardown may have drained the table between the check and the insert.
        if self.is_closed() {
            return Err(McpError::SessionClosed);
        }

        let request = JsonRpcRequest::new(RequestId::Number(id), method, params);
        if !self.send_open(JsonRpcMessage::Request(request)) {
            return Err(McpError::SessionClosed);
        }
        tracing::debug!("Sent {method} (id {id}) to client");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => {
                tracing::warn!("Client did not answer {method} (id {id}) within {timeout:?}");
                Err(McpError::PeerTimeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Deliver a client reply. Returns `false` for unknown or non-numeric ids.
    pub fn complete(&self, id: &RequestId, reply: McpResult<Value>) -> bool {
        let RequestId::Number(n) = id else {
            tracing::warn!("Reply with non-numeric id {id} matches no server request");
            return false;
        };
        match self.pending.remove(n) {
            Some((_, slot)) => slot.send(reply).is_ok(),
            None => {
                tracing::warn!("Reply for unknown or expired request id {n}");
                false
            }
        }
    }

    /// Close the channel and fail every pending request with `SessionClosed`.
    pub fn fail_all(&self) -> usize {
        self.close_if(|| true);
        let ids: Vec<i64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, slot)) = self.pending.remove(&id) {
                let _ = slot.send(Err(McpError::SessionClosed));
                failed += 1;
            }
        }
        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn min_log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_log_level.load(Ordering::Relaxed))
    }

    pub(crate) fn set_min_log_level(&self, level: LogLevel) {
        self.min_log_level.store(level.as_u8(), Ordering::Relaxed);
    }
}

/// Removes the pending entry when the waiting future goes away, whether it
/// finished, timed out, or was dropped by a cancelled caller.
struct PendingSlot<'a> {
    pending: &'a DashMap<i64, oneshot::Sender<McpResult<Value>>>,
    id: i64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
