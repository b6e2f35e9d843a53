//! In-process MCP client.
//!
//! [`LocalClient`] drives a session directly through
//! [`Session::handle_message`] instead of a wire. It plays the client half of
//! the protocol: performs the handshake, matches replies to its own requests,
//! answers `sampling/createMessage` and `roots/list` from the server, and
//! queues every notification it receives.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use duplex_core::transport::{self, OutboundFrames};
use duplex_core::types::{
    methods, CallToolResult, CancelledParams, ClientCapabilities, CreateMessageRequest,
    CreateMessageResult, GetPromptResult, Implementation, InitializeResult, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListRootsResult,
    LogLevel, McpError, McpResult, Prompt, PromptListResult, ReadResourceResult, RequestId,
    Resource, ResourceListResult, ResourceTemplate, ResourceTemplateListResult, Root,
    RootsCapability, SamplingCapability, Tool, ToolListResult, MCP_VERSION,
};
use duplex_core::{Session, SessionBuilder};

pub const CLIENT_NAME: &str = "duplex-local-client";

/// Answers `sampling/createMessage` on behalf of the client.
pub type Sampler =
    Arc<dyn Fn(CreateMessageRequest) -> McpResult<CreateMessageResult> + Send + Sync>;

type Waiters = Arc<DashMap<RequestId, oneshot::Sender<McpResult<Value>>>>;

#[derive(Clone)]
pub struct ClientOptions {
    /// Declares the `sampling` capability when set.
    pub sampler: Option<Sampler>,
    /// Declares the `roots` capability when non-empty.
    pub roots: Vec<Root>,
    /// How long to wait for the reply to an async call.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sampler: None,
            roots: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ClientOptions {
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            experimental: None,
            sampling: self.sampler.as_ref().map(|_| SamplingCapability {}),
            roots: (!self.roots.is_empty()).then(RootsCapability::default),
        }
    }
}

pub struct LocalClient {
    session: Session,
    waiters: Waiters,
    next_id: AtomicI64,
    timeout: Duration,
    server: InitializeResult,
    notifications: mpsc::UnboundedReceiver<JsonRpcNotification>,
    pump: JoinHandle<()>,
}

impl LocalClient {
    /// Start a session from `builder` and complete the initialize handshake.
    pub async fn connect(builder: &SessionBuilder, options: ClientOptions) -> McpResult<Self> {
        let (handle, frames) = transport::channel();
        let session = builder.start(handle)?;
        let waiters: Waiters = Arc::default();
        let (notify_tx, notifications) = mpsc::unbounded_channel();
        let capabilities = options.capabilities();
        let timeout = options.timeout;

        let pump = tokio::spawn(pump(
            session.clone(),
            frames,
            waiters.clone(),
            notify_tx,
            options,
        ));

        let params = json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": capabilities,
            "clientInfo": Implementation::new(CLIENT_NAME, env!("CARGO_PKG_VERSION")),
        });
        let next_id = AtomicI64::new(1);
        let server = match handshake(&session, &waiters, &next_id, params, timeout).await {
            Ok(server) => server,
            Err(e) => {
                pump.abort();
                return Err(e);
            }
        };

        let client = Self {
            session,
            waiters,
            next_id,
            timeout,
            server,
            notifications,
            pump,
        };
        client.notify(methods::INITIALIZED, None).await;
        Ok(client)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// What the server answered to `initialize`.
    pub fn server(&self) -> &InitializeResult {
        &self.server
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.send_request(method, params).await?.wait().await
    }

    /// Send a request without waiting, so it can be cancelled or awaited later.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> McpResult<PendingReply> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        start_request(&self.session, &self.waiters, id, method, params, self.timeout).await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) {
        let msg = JsonRpcMessage::Notification(JsonRpcNotification::new(method, params));
        self.session.handle_message(msg).await;
    }

    /// Ask the server to stop working on `id`.
    pub async fn cancel(&self, id: &RequestId, reason: &str) -> McpResult<()> {
        let params = CancelledParams {
            request_id: id.clone(),
            reason: Some(reason.to_string()),
        };
        self.notify(methods::CANCELLED, Some(serde_json::to_value(params)?))
            .await;
        Ok(())
    }

    /// Next notification from the server, waiting for one to arrive.
    pub async fn next_notification(&mut self) -> Option<JsonRpcNotification> {
        self.notifications.recv().await
    }

    /// Next already-delivered notification, if any.
    pub fn try_notification(&mut self) -> Option<JsonRpcNotification> {
        self.notifications.try_recv().ok()
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.request("ping", None).await.map(|_| ())
    }

    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let result: ToolListResult = decode(self.request("tools/list", None).await?)?;
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        decode(self.request("tools/call", Some(params)).await?)
    }

    pub async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        let result: ResourceListResult = decode(self.request("resources/list", None).await?)?;
        Ok(result.resources)
    }

    pub async fn list_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        let result: ResourceTemplateListResult =
            decode(self.request("resources/templates/list", None).await?)?;
        Ok(result.resource_templates)
    }

    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        decode(self.request("resources/read", Some(json!({ "uri": uri }))).await?)
    }

    pub async fn subscribe(&self, uri: &str) -> McpResult<()> {
        self.request("resources/subscribe", Some(json!({ "uri": uri })))
            .await
            .map(|_| ())
    }

    pub async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        let result: PromptListResult = decode(self.request("prompts/list", None).await?)?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<GetPromptResult> {
        let params = json!({ "name": name, "arguments": arguments });
        decode(self.request("prompts/get", Some(params)).await?)
    }

    pub async fn set_level(&self, level: LogLevel) -> McpResult<()> {
        self.request("logging/setLevel", Some(json!({ "level": level })))
            .await
            .map(|_| ())
    }

    /// Shut the session down and stop answering server requests.
    pub async fn close(self) {
        self.session.shutdown().await;
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// A request that has been sent but whose reply may still be outstanding.
pub struct PendingReply {
    id: RequestId,
    method: String,
    timeout: Duration,
    waiters: Waiters,
    state: ReplyState,
}

enum ReplyState {
    Settled(McpResult<Value>),
    Waiting(oneshot::Receiver<McpResult<Value>>),
}

impl PendingReply {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Whether the server answered on the accept flow.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, ReplyState::Settled(_))
    }

    pub async fn wait(self) -> McpResult<Value> {
        let rx = match self.state {
            ReplyState::Settled(result) => return result,
            ReplyState::Waiting(rx) => rx,
        };
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => {
                self.waiters.remove(&self.id);
                Err(McpError::PeerTimeout {
                    method: self.method,
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn handshake(
    session: &Session,
    waiters: &Waiters,
    next_id: &AtomicI64,
    params: Value,
    timeout: Duration,
) -> McpResult<InitializeResult> {
    let id = RequestId::Number(next_id.fetch_add(1, Ordering::Relaxed));
    let reply = start_request(session, waiters, id, "initialize", Some(params), timeout)
        .await?
        .wait()
        .await?;
    decode(reply)
}

async fn start_request(
    session: &Session,
    waiters: &Waiters,
    id: RequestId,
    method: &str,
    params: Option<Value>,
    timeout: Duration,
) -> McpResult<PendingReply> {
    let (tx, rx) = oneshot::channel();
    waiters.insert(id.clone(), tx);

    let msg = JsonRpcMessage::Request(JsonRpcRequest::new(id.clone(), method, params));
    let state = match session.handle_message(msg).await {
        Some(reply) => {
            waiters.remove(&id);
            ReplyState::Settled(reply_result(reply)?)
        }
        None => ReplyState::Waiting(rx),
    };

    Ok(PendingReply {
        id,
        method: method.to_string(),
        timeout,
        waiters: Arc::clone(waiters),
        state,
    })
}

/// Reads the session's outbound frames, like a client reading its socket.
async fn pump(
    session: Session,
    mut frames: OutboundFrames,
    waiters: Waiters,
    notifications: mpsc::UnboundedSender<JsonRpcNotification>,
    options: ClientOptions,
) {
    while let Some(frame) = frames.recv().await {
        match frame {
            JsonRpcMessage::Notification(notification) => {
                let _ = notifications.send(notification);
            }
            JsonRpcMessage::Request(request) => {
                let reply = answer(&options, request);
                session.handle_message(reply).await;
            }
            reply => {
                let Some(id) = reply.id().cloned() else {
                    continue;
                };
                match waiters.remove(&id) {
                    Some((_, waiter)) => {
                        if let Ok(result) = reply_result(reply) {
                            let _ = waiter.send(result);
                        }
                    }
                    None => tracing::debug!("Reply for unknown request {id}"),
                }
            }
        }
    }
}

/// Result of a reply frame, or `Err` if the frame is not a reply at all.
fn reply_result(reply: JsonRpcMessage) -> McpResult<McpResult<Value>> {
    match reply {
        JsonRpcMessage::Response(response) => Ok(Ok(response.result)),
        JsonRpcMessage::Error(error) => Ok(Err(McpError::Peer {
            code: error.error.code,
            message: error.error.message,
        })),
        other => Err(McpError::InternalError(format!(
            "expected a reply frame, got {:?}",
            other.method()
        ))),
    }
}

fn answer(options: &ClientOptions, request: JsonRpcRequest) -> JsonRpcMessage {
    let JsonRpcRequest { id, method, params, .. } = request;
    let result = match method.as_str() {
        "sampling/createMessage" => match &options.sampler {
            Some(sampler) => params
                .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))
                .and_then(decode::<CreateMessageRequest>)
                .and_then(|req| sampler(req))
                .and_then(|res| serde_json::to_value(res).map_err(McpError::Json)),
            None => Err(McpError::MethodNotFound(method)),
        },
        "roots/list" => serde_json::to_value(ListRootsResult {
            roots: options.roots.clone(),
        })
        .map_err(McpError::Json),
        "ping" => Ok(json!({})),
        _ => Err(McpError::MethodNotFound(method)),
    };

    match result {
        Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(id, value)),
        Err(e) => JsonRpcMessage::Error(e.to_json_rpc_error(id)),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> McpResult<T> {
    serde_json::from_value(value).map_err(|e| McpError::InternalError(format!("malformed reply: {e}")))
}
