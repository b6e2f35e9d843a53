//! Session lifecycle: handshake, registries, outbound channel and teardown.

pub mod builder;
pub mod lifecycle;

pub use builder::{SessionBuilder, DEFAULT_DRAIN_TIMEOUT};
pub use lifecycle::SessionState;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::exchange::{Exchange, Outbound};
use crate::protocol::{Dispatcher, Negotiation, PeerInfo};
use crate::registry::{
    Outcome, PromptHandler, Registration, Registries, ResourceHandler, ToolHandler,
};
use crate::transport::TransportHandle;
use crate::types::{
    methods, CallToolRequest, CallToolResult, Capability, CapabilitySet, GetPromptRequest,
    GetPromptResult, Implementation, McpError, McpResult, Prompt, ReadResourceResult, RequestId,
    Resource, ResourceTemplate, ResourceUpdatedParams, ServerEvent, Tool,
};

/// An async call the session is still driving.
pub(crate) struct InFlight {
    pub(crate) cancel: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) struct SessionInner {
    pub(crate) id: Uuid,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) server_info: Implementation,
    pub(crate) instructions: Option<String>,
    pub(crate) capabilities: RwLock<CapabilitySet>,
    pub(crate) registries: Registries,
    pub(crate) negotiation: Negotiation,
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) outbound: Arc<Outbound>,
    pub(crate) inflight: DashMap<RequestId, InFlight>,
    pub(crate) subscriptions: DashSet<String>,
    pub(crate) drain_timeout: Duration,
}

/// One client connection. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        server_info: Implementation,
        capabilities: CapabilitySet,
        instructions: Option<String>,
        request_timeout: Duration,
        drain_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                started_at: Utc::now(),
                server_info,
                instructions,
                capabilities: RwLock::new(capabilities),
                registries: Registries::default(),
                negotiation: Negotiation::default(),
                state,
                outbound: Arc::new(Outbound::new(request_timeout)),
                inflight: DashMap::new(),
                subscriptions: DashSet::new(),
                drain_timeout,
            }),
        }
    }

    pub(crate) fn attach(&self, transport: TransportHandle) -> McpResult<()> {
        self.inner.outbound.attach(transport)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn server_info(&self) -> &Implementation {
        &self.inner.server_info
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        match self.inner.capabilities.read() {
            Ok(caps) => *caps,
            Err(poisoned) => **poisoned.get_ref(),
        }
    }

    /// Replace the capability set. Only allowed before `initialize`.
    pub fn set_capabilities(&self, capabilities: CapabilitySet) -> McpResult<()> {
        if self.state() != SessionState::Uninitialized {
            return Err(McpError::Configuration(format!(
                "capabilities are fixed once negotiated (session is {})",
                self.state()
            )));
        }
        let registries = &self.inner.registries;
        let orphaned = [
            (Capability::Tools, !registries.tools.is_empty()),
            (
                Capability::Resources,
                !registries.resources.resources.is_empty()
                    || !registries.resources.templates.is_empty(),
            ),
            (Capability::Prompts, !registries.prompts.is_empty()),
        ]
        .into_iter()
        .find(|(capability, populated)| *populated && !capabilities.is_enabled(*capability));
        if let Some((capability, _)) = orphaned {
            return Err(McpError::Configuration(format!(
                "cannot disable {capability}: operations are still registered"
            )));
        }

        let mut current = self
            .inner
            .capabilities
            .write()
            .map_err(|_| McpError::SessionCorrupted("capability lock poisoned".to_string()))?;
        *current = capabilities;
        Ok(())
    }

    pub fn peer(&self) -> Option<Arc<PeerInfo>> {
        self.inner.negotiation.peer()
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.peer().map(|peer| peer.client_info.clone())
    }

    /// Async calls still running.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Server→client requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.outbound.pending_count()
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.inner.subscriptions.contains(uri)
    }

    // -- registries -------------------------------------------------------

    pub fn add_tool(&self, tool: Tool, handler: ToolHandler) -> McpResult<Registration> {
        self.check_registrable(Capability::Tools, &tool.name)?;
        let registration = self
            .inner
            .registries
            .tools
            .register(tool, handler)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Tools);
        Ok(registration)
    }

    pub fn remove_tool(&self, name: &str) -> McpResult<Tool> {
        let removed = self
            .inner
            .registries
            .tools
            .unregister(name)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Tools);
        Ok(removed)
    }

    pub fn add_resource(
        &self,
        resource: Resource,
        handler: ResourceHandler,
    ) -> McpResult<Registration> {
        self.check_registrable(Capability::Resources, &resource.uri)?;
        let registration = self
            .inner
            .registries
            .resources
            .resources
            .register(resource, handler)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Resources);
        Ok(registration)
    }

    pub fn remove_resource(&self, uri: &str) -> McpResult<Resource> {
        let removed = self
            .inner
            .registries
            .resources
            .resources
            .unregister(uri)
            .map_err(|e| self.escalate(e))?;
        self.inner.subscriptions.remove(uri);
        self.list_changed(Capability::Resources);
        Ok(removed)
    }

    pub fn add_resource_template(
        &self,
        template: ResourceTemplate,
        handler: ResourceHandler,
    ) -> McpResult<Registration> {
        self.check_registrable(Capability::Resources, &template.uri_template)?;
        let registration = self
            .inner
            .registries
            .resources
            .templates
            .register(template, handler)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Resources);
        Ok(registration)
    }

    pub fn remove_resource_template(&self, uri_template: &str) -> McpResult<ResourceTemplate> {
        let removed = self
            .inner
            .registries
            .resources
            .templates
            .unregister(uri_template)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Resources);
        Ok(removed)
    }

    pub fn add_prompt(&self, prompt: Prompt, handler: PromptHandler) -> McpResult<Registration> {
        self.check_registrable(Capability::Prompts, &prompt.name)?;
        let registration = self
            .inner
            .registries
            .prompts
            .register(prompt, handler)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Prompts);
        Ok(registration)
    }

    pub fn remove_prompt(&self, name: &str) -> McpResult<Prompt> {
        let removed = self
            .inner
            .registries
            .prompts
            .unregister(name)
            .map_err(|e| self.escalate(e))?;
        self.list_changed(Capability::Prompts);
        Ok(removed)
    }

    pub fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.inner.registries.tools.list()
    }

    pub fn list_resources(&self) -> McpResult<Vec<Resource>> {
        self.inner.registries.resources.resources.list()
    }

    pub fn list_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        self.inner.registries.resources.templates.list()
    }

    pub fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        self.inner.registries.prompts.list()
    }

    fn check_registrable(&self, capability: Capability, key: &str) -> McpResult<()> {
        self.capabilities().require(capability).map_err(|_| {
            McpError::Configuration(format!(
                "cannot register '{key}': {capability} capability is disabled"
            ))
        })
    }

    fn list_changed(&self, capability: Capability) {
        if self.state() != SessionState::Active
            || !self.capabilities().notifies_list_changed(capability)
        {
            return;
        }
        let method = match capability {
            Capability::Tools => methods::TOOLS_LIST_CHANGED,
            Capability::Resources => methods::RESOURCES_LIST_CHANGED,
            Capability::Prompts => methods::PROMPTS_LIST_CHANGED,
            Capability::ResourceSubscriptions | Capability::Logging => return,
        };
        self.inner.outbound.notify(method, None);
    }

    // -- host-initiated traffic ---------------------------------------------

    /// Push an event to the client. Best-effort: events the negotiated
    /// capabilities do not cover, or that arrive outside `Active`, are dropped.
    pub fn notify(&self, event: ServerEvent) {
        if self.state() != SessionState::Active {
            tracing::debug!("Dropping {event:?}: session is {}", self.state());
            return;
        }
        let caps = self.capabilities();
        match event {
            ServerEvent::ToolsListChanged => self.list_changed(Capability::Tools),
            ServerEvent::ResourcesListChanged => self.list_changed(Capability::Resources),
            ServerEvent::PromptsListChanged => self.list_changed(Capability::Prompts),
            ServerEvent::ResourceUpdated { uri } => {
                if !caps.is_enabled(Capability::ResourceSubscriptions) || !self.is_subscribed(&uri)
                {
                    tracing::debug!("No subscription for {uri}; update not sent");
                    return;
                }
                match serde_json::to_value(ResourceUpdatedParams { uri }) {
                    Ok(params) => self.inner.outbound.notify(methods::RESOURCE_UPDATED, Some(params)),
                    Err(e) => tracing::warn!("Could not encode resource update: {e}"),
                }
            }
            ServerEvent::Log(message) => {
                if !caps.logging || message.level < self.inner.outbound.min_log_level() {
                    return;
                }
                match serde_json::to_value(&message) {
                    Ok(params) => self.inner.outbound.notify(methods::MESSAGE, Some(params)),
                    Err(e) => tracing::warn!("Could not encode log notification: {e}"),
                }
            }
        }
    }

    // -- typed calls ---------------------------------------------------------

    /// Call a tool without going through JSON-RPC.
    ///
    /// Disabled capability and unknown names are `Err`; handler failures
    /// arrive as an `isError` result, the same as on the wire. Async handlers
    /// are tracked like wire calls: teardown offers them cancellation and the
    /// call fails with `SessionClosed`.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        self.state().guard()?;
        let (cancel, exchange) = self.host_exchange();
        let outcome = self
            .dispatcher()
            .call_tool(exchange, CallToolRequest::new(name, arguments))?;
        self.settle_typed(outcome, cancel).await
    }

    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.state().guard()?;
        let (cancel, exchange) = self.host_exchange();
        let outcome = self.dispatcher().read_resource(exchange, uri)?;
        self.settle_typed(outcome, cancel).await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<GetPromptResult> {
        self.state().guard()?;
        let (cancel, exchange) = self.host_exchange();
        let outcome = self
            .dispatcher()
            .get_prompt(exchange, GetPromptRequest::new(name, arguments))?;
        self.settle_typed(outcome, cancel).await
    }

    fn host_exchange(&self) -> (watch::Sender<bool>, Exchange) {
        let (cancel, cancelled) = watch::channel(false);
        (cancel, self.exchange(None, cancelled))
    }

    async fn settle_typed<T: Send + 'static>(
        &self,
        outcome: Outcome<T>,
        cancel: watch::Sender<bool>,
    ) -> McpResult<T> {
        let future = match outcome {
            Outcome::Ready(result) => return result.map_err(|e| self.escalate(e)),
            Outcome::Deferred(future) => future,
        };

        let (tx, rx) = oneshot::channel();
        let key = RequestId::String(format!("host-{}", Uuid::new_v4()));
        let tracked = self.track(key, cancel, future, move |result| {
            let _ = tx.send(result);
        });
        if !tracked {
            return Err(McpError::InternalError("host call id already in flight".to_string()));
        }

        match rx.await {
            Ok(result) if self.state() == SessionState::Active => {
                result.map_err(|e| self.escalate(e))
            }
            // Settled during teardown, or aborted by it.
            _ => Err(McpError::SessionClosed),
        }
    }

    /// Spawn an async call into the in-flight table, where teardown can reach
    /// it. `finish` gets the result once the entry is gone. Returns `false`,
    /// dropping the call, when `id` is already in flight.
    pub(crate) fn track<T, F>(
        &self,
        id: RequestId,
        cancel: watch::Sender<bool>,
        future: BoxFuture<'static, McpResult<T>>,
        finish: F,
    ) -> bool
    where
        T: Send + 'static,
        F: FnOnce(McpResult<T>) + Send + 'static,
    {
        // Holding the vacant entry across the spawn keeps the task from
        // removing itself before it has been recorded.
        let Entry::Vacant(slot) = self.inner.inflight.entry(id.clone()) else {
            return false;
        };
        if self.state().is_shutting_down() {
            // Teardown has already collected its calls.
            let _ = cancel.send(true);
        }
        let session = self.clone();
        let task = tokio::spawn(async move {
            let result = future.await;
            session.inner.inflight.remove(&id);
            finish(result);
        });
        slot.insert(InFlight { cancel, task });
        true
    }

    pub(crate) fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.inner.registries, self.capabilities())
    }

    pub(crate) fn exchange(
        &self,
        request_id: Option<RequestId>,
        cancel: watch::Receiver<bool>,
    ) -> Exchange {
        Exchange::new(
            self.inner.id,
            request_id,
            self.capabilities(),
            self.peer(),
            Arc::clone(&self.inner.outbound),
            cancel,
        )
    }

    // -- lifecycle -----------------------------------------------------------

    /// Move to `next` if the state machine allows it.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut from = None;
        let moved = self.inner.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        if let (true, Some(from)) = (moved, from) {
            tracing::debug!("Session {}: {from} -> {next}", self.inner.id);
        }
        moved
    }

    /// Start a detached teardown when `err` is fatal. Returns `err` unchanged.
    pub(crate) fn escalate(&self, err: McpError) -> McpError {
        if err.is_fatal() && !self.state().is_shutting_down() {
            tracing::error!("Session {} corrupted: {err}", self.inner.id);
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let session = self.clone();
                    runtime.spawn(async move { session.shutdown().await });
                }
                // Without a runtime nothing can be in flight; close on the spot.
                Err(_) => {
                    self.transition(SessionState::Terminating);
                    self.inner.outbound.fail_all();
                    self.inner.subscriptions.clear();
                    self.transition(SessionState::Closed);
                }
            }
        }
        err
    }

    /// Tear the session down.
    ///
    /// Fails every pending server→client request with `SessionClosed`, offers
    /// cancellation to in-flight async calls, waits up to the drain timeout
    /// for them and aborts the rest. Their results are discarded. Calling it
    /// again (or concurrently) just waits for the first teardown to finish.
    pub async fn shutdown(&self) {
        // Closing the outbound channel together with the transition keeps
        // late results from reaching the wire once teardown has begun.
        if !self
            .inner
            .outbound
            .close_if(|| self.transition(SessionState::Terminating))
        {
            self.closed().await;
            return;
        }
        let failed = self.inner.outbound.fail_all();

        let ids: Vec<RequestId> = self
            .inner
            .inflight
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let calls: Vec<InFlight> = ids
            .iter()
            .filter_map(|id| self.inner.inflight.remove(id).map(|(_, call)| call))
            .collect();
        let running = calls.len();

        for call in &calls {
            let _ = call.cancel.send(true);
        }
        let aborts: Vec<_> = calls.iter().map(|call| call.task.abort_handle()).collect();
        let drain = futures::future::join_all(calls.into_iter().map(|call| call.task));
        if tokio::time::timeout(self.inner.drain_timeout, drain)
            .await
            .is_err()
        {
            tracing::warn!(
                "Session {}: in-flight calls did not finish within {:?}; aborting",
                self.inner.id,
                self.inner.drain_timeout
            );
            for abort in aborts {
                abort.abort();
            }
        }

        self.inner.subscriptions.clear();
        self.transition(SessionState::Closed);
        tracing::info!(
            "Session {} closed ({failed} pending request(s) failed, {running} call(s) drained)",
            self.inner.id
        );
    }

    /// Resolves once the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Handler;
    use crate::transport;
    use crate::types::{JsonRpcMessage, JsonRpcRequest, LogLevel, LoggingMessage};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn session(capabilities: CapabilitySet) -> (Session, transport::OutboundFrames) {
        let (handle, frames) = transport::channel();
        let session = SessionBuilder::new("test-server", "0.1.0")
            .capabilities(capabilities)
            .start(handle)
            .unwrap();
        (session, frames)
    }

    fn activate(session: &Session) {
        assert!(session.transition(SessionState::Negotiating));
        assert!(session.transition(SessionState::Active));
    }

    fn tool(name: &str) -> Tool {
        Tool::new(name, "test tool", json!({"type": "object"}))
    }

    fn ok_handler() -> ToolHandler {
        Handler::sync(|_, _| Ok(CallToolResult::text("ok")))
    }

    #[tokio::test]
    async fn test_typed_call_before_initialize_is_rejected() {
        let (session, _frames) = session(CapabilitySet::builder().tools(false).build());
        session.add_tool(tool("a"), ok_handler()).unwrap();
        let err = session.invoke_tool("a", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::NotInitialized));
    }

    #[tokio::test]
    async fn test_list_changed_only_when_enabled_and_active() {
        let (session, mut frames) = session(CapabilitySet::builder().tools(true).build());
        session.add_tool(tool("early"), ok_handler()).unwrap();
        assert!(frames.try_recv().is_err());

        activate(&session);
        session.add_tool(tool("late"), ok_handler()).unwrap();
        let JsonRpcMessage::Notification(n) = frames.recv().await.unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.method, "notifications/tools/list_changed");

        session.remove_tool("late").unwrap();
        assert!(frames.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_silent_registry_without_list_changed() {
        let (session, mut frames) = session(CapabilitySet::builder().prompts(false).build());
        activate(&session);
        session
            .add_prompt(
                Prompt::new("p", "", vec![]),
                Handler::sync(|_, _| {
                    Ok(GetPromptResult {
                        description: None,
                        messages: vec![],
                    })
                }),
            )
            .unwrap();
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_capabilities_fixed_after_negotiation() {
        let (session, _frames) = session(CapabilitySet::default());
        session
            .set_capabilities(CapabilitySet::builder().tools(false).build())
            .unwrap();
        session.add_tool(tool("a"), ok_handler()).unwrap();

        let err = session.set_capabilities(CapabilitySet::default()).unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));

        activate(&session);
        let err = session
            .set_capabilities(CapabilitySet::builder().tools(true).build())
            .unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_log_event_filtered_by_level() {
        let (session, mut frames) = session(CapabilitySet::builder().logging().build());
        activate(&session);
        session.inner.outbound.set_min_log_level(LogLevel::Error);

        session.notify(ServerEvent::Log(LoggingMessage::new(LogLevel::Info, None, "quiet")));
        session.notify(ServerEvent::Log(LoggingMessage::new(LogLevel::Alert, None, "loud")));

        let JsonRpcMessage::Notification(n) = frames.recv().await.unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.params.unwrap()["data"], "loud");
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resource_update_requires_subscription() {
        let (session, mut frames) =
            session(CapabilitySet::builder().resources(true, false).build());
        activate(&session);

        session.notify(ServerEvent::ResourceUpdated {
            uri: "custom://resource".into(),
        });
        assert!(frames.try_recv().is_err());

        session.inner.subscriptions.insert("custom://resource".into());
        session.notify(ServerEvent::ResourceUpdated {
            uri: "custom://resource".into(),
        });
        let JsonRpcMessage::Notification(n) = frames.recv().await.unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.method, "notifications/resources/updated");
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (session, _frames) = session(CapabilitySet::default());
        activate(&session);
        session.shutdown().await;
        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Closed);
        let err = session.invoke_tool("a", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::SessionClosed));
    }

    #[tokio::test]
    async fn test_shutdown_before_handshake_closes() {
        let (session, _frames) = session(CapabilitySet::default());
        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    fn waiting_tool(cancelled: Arc<AtomicBool>) -> ToolHandler {
        Handler::asynchronous(move |exchange: Exchange, _: CallToolRequest| {
            let cancelled = cancelled.clone();
            async move {
                tokio::select! {
                    _ = exchange.cancelled() => {
                        cancelled.store(true, Ordering::SeqCst);
                        Err(McpError::RequestCancelled)
                    }
                    _ = tokio::time::sleep(Duration::from_millis(300)) => {
                        Ok(CallToolResult::text("ran to completion"))
                    }
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_async_call_is_drained_by_shutdown() {
        let (session, _frames) = session(CapabilitySet::builder().tools(false).build());
        let cancelled = Arc::new(AtomicBool::new(false));
        session
            .add_tool(tool("wait"), waiting_tool(cancelled.clone()))
            .unwrap();
        activate(&session);

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.invoke_tool("wait", json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.in_flight(), 1);

        session.shutdown().await;
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(session.in_flight(), 0);
        assert!(matches!(call.await.unwrap(), Err(McpError::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_async_call_completes_while_active() {
        let (session, _frames) = session(CapabilitySet::builder().tools(false).build());
        session
            .add_tool(tool("wait"), waiting_tool(Arc::new(AtomicBool::new(false))))
            .unwrap();
        activate(&session);

        let result = session.invoke_tool("wait", json!({})).await.unwrap();
        assert_eq!(result.text_content(), "ran to completion");
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_result_settling_during_teardown_is_not_sent() {
        let (session, mut frames) = session(CapabilitySet::builder().tools(false).build());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(std::sync::Mutex::new(Some(release_rx)));
        session
            .add_tool(
                tool("stubborn"),
                Handler::asynchronous(move |_, _: CallToolRequest| {
                    let release = release_rx.lock().unwrap().take();
                    async move {
                        if let Some(release) = release {
                            let _ = release.await;
                        }
                        Ok(CallToolResult::text("late"))
                    }
                }),
            )
            .unwrap();
        activate(&session);

        let call = JsonRpcMessage::Request(JsonRpcRequest::new(
            RequestId::Number(1),
            "tools/call",
            Some(json!({"name": "stubborn", "arguments": {}})),
        ));
        assert!(session.handle_message(call).await.is_none());
        assert_eq!(session.in_flight(), 1);

        let teardown = {
            let session = session.clone();
            tokio::spawn(async move { session.shutdown().await })
        };
        let mut state = session.inner.state.subscribe();
        state
            .wait_for(|s| *s == SessionState::Terminating)
            .await
            .unwrap();
        release_tx.send(()).unwrap();
        teardown.await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(frames.try_recv().is_err());
    }
}
