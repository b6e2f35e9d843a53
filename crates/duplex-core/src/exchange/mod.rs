//! Per-invocation handle for talking back to the client.
//!
//! An [`Exchange`] is handed to every handler call. It carries the negotiated
//! capabilities and a reference to the session's outbound channel, so a
//! handler can log, report progress, ask the client for a model completion or
//! list the client's roots while its own call is still in flight.

pub mod outbound;

pub use outbound::{Outbound, DEFAULT_REQUEST_TIMEOUT};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::protocol::negotiation::PeerInfo;
use crate::types::{
    methods, CapabilitySet, ClientCapabilities, CreateMessageRequest, CreateMessageResult,
    Implementation, ListRootsResult, LogLevel, LoggingMessage, McpError, McpResult,
    ProgressParams, ProgressToken, RequestId,
};

const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
const ROOTS_LIST: &str = "roots/list";

#[derive(Clone)]
pub struct Exchange {
    session_id: Uuid,
    request_id: Option<RequestId>,
    capabilities: CapabilitySet,
    peer: Option<Arc<PeerInfo>>,
    outbound: Arc<Outbound>,
    live: Arc<AtomicBool>,
    cancel: watch::Receiver<bool>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("session_id", &self.session_id)
            .field("request_id", &self.request_id)
            .field("live", &self.is_live())
            .finish()
    }
}

impl Exchange {
    pub(crate) fn new(
        session_id: Uuid,
        request_id: Option<RequestId>,
        capabilities: CapabilitySet,
        peer: Option<Arc<PeerInfo>>,
        outbound: Arc<Outbound>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session_id,
            request_id,
            capabilities,
            peer,
            outbound,
            live: Arc::new(AtomicBool::new(true)),
            cancel,
        }
    }

    /// An exchange bound to no transport, for exercising handlers in isolation.
    /// Notifications go nowhere and requests fail with `SessionClosed`.
    pub fn detached() -> Self {
        let (_, cancel) = watch::channel(false);
        Self::new(
            Uuid::new_v4(),
            None,
            CapabilitySet::default(),
            None,
            Arc::new(Outbound::new(DEFAULT_REQUEST_TIMEOUT)),
            cancel,
        )
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Id of the client request being served, if the call came off the wire.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// The server capability set in force for this session.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Capabilities the client declared in `initialize`. Empty before negotiation.
    pub fn client_capabilities(&self) -> ClientCapabilities {
        self.peer
            .as_ref()
            .map(|peer| peer.capabilities.clone())
            .unwrap_or_default()
    }

    pub fn client_info(&self) -> Option<&Implementation> {
        self.peer.as_ref().map(|peer| &peer.client_info)
    }

    /// False once the call this exchange was created for has settled.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Send `notifications/message`. Never fails observably.
    pub fn send_logging_notification(&self, message: LoggingMessage) {
        if !self.capabilities.logging {
            tracing::debug!("Logging capability disabled; dropping log notification");
            return;
        }
        if !self.is_live() {
            tracing::debug!("Exchange expired; dropping log notification");
            return;
        }
        if message.level < self.outbound.min_log_level() {
            return;
        }
        match serde_json::to_value(&message) {
            Ok(params) => self.outbound.notify(methods::MESSAGE, Some(params)),
            Err(e) => tracing::warn!("Could not encode log notification: {e}"),
        }
    }

    /// Shorthand for [`Exchange::send_logging_notification`].
    pub fn log(&self, level: LogLevel, logger: Option<&str>, data: impl Into<Value>) {
        self.send_logging_notification(LoggingMessage::new(level, logger, data));
    }

    pub fn send_progress(&self, token: ProgressToken, progress: f64, total: Option<f64>) {
        if !self.is_live() {
            tracing::debug!("Exchange expired; dropping progress notification");
            return;
        }
        let params = ProgressParams {
            progress_token: token,
            progress,
            total,
        };
        match serde_json::to_value(&params) {
            Ok(params) => self.outbound.notify(methods::PROGRESS, Some(params)),
            Err(e) => tracing::warn!("Could not encode progress notification: {e}"),
        }
    }

    /// Ask the client to sample a model.
    ///
    /// The request is sent even if the client never declared `sampling`;
    /// check [`Exchange::client_capabilities`] first. Bounded by the session
    /// request timeout.
    pub async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> McpResult<CreateMessageResult> {
        let params = serde_json::to_value(&request)
            .map_err(|e| McpError::InternalError(e.to_string()))?;
        let reply = self.request(SAMPLING_CREATE_MESSAGE, Some(params)).await?;
        serde_json::from_value(reply).map_err(|e| {
            McpError::InternalError(format!("malformed {SAMPLING_CREATE_MESSAGE} reply: {e}"))
        })
    }

    pub async fn list_roots(&self) -> McpResult<ListRootsResult> {
        let reply = self.request(ROOTS_LIST, None).await?;
        serde_json::from_value(reply)
            .map_err(|e| McpError::InternalError(format!("malformed {ROOTS_LIST} reply: {e}")))
    }

    /// Whether the client (or session teardown) asked this call to stop.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the call is cancelled. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        wait_cancelled(&mut cancel).await;
    }

    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        if !self.is_live() {
            return Err(McpError::InvalidRequest(format!(
                "{method} issued through an exchange whose call has completed"
            )));
        }
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            reply = self.outbound.request(method, params) => reply,
            _ = wait_cancelled(&mut cancel) => Err(McpError::RequestCancelled),
        }
    }

    /// Keeps the exchange live until the returned guard is dropped.
    pub(crate) fn scope(&self) -> ExchangeScope {
        ExchangeScope {
            live: Arc::clone(&self.live),
        }
    }
}

/// Expires the exchange (and every clone of it) on drop.
pub(crate) struct ExchangeScope {
    live: Arc<AtomicBool>,
}

impl Drop for ExchangeScope {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender gone without cancelling: the call can no longer be cancelled.
        std::future::pending::<()>().await;
    }
}
