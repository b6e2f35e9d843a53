//! JSON-RPC routing: turns inbound frames into dispatcher calls and replies.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::registry::Outcome;
use crate::session::{Session, SessionState};
use crate::types::*;

use super::validator::{parse_params, validate_request};

/// A routed request: answered already, or still running.
type Routed = McpResult<Outcome<Value>>;

impl Session {
    /// Handle one decoded inbound frame.
    ///
    /// Returns the reply for requests answered on the accept flow. Replies to
    /// async calls are sent through the session's outbound channel when they
    /// settle, so `None` does not mean the request was ignored.
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match msg {
            JsonRpcMessage::Request(req) => self.handle_request(req),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif);
                None
            }
            JsonRpcMessage::Response(resp) => {
                self.inner.outbound.complete(&resp.id, Ok(resp.result));
                None
            }
            JsonRpcMessage::Error(err) => {
                let reply = Err(McpError::Peer {
                    code: err.error.code,
                    message: err.error.message,
                });
                self.inner.outbound.complete(&err.id, reply);
                None
            }
        }
    }

    fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcMessage> {
        if let Err(e) = validate_request(&request) {
            return Some(reply(request.id, Err(e)));
        }

        let id = request.id.clone();
        if self.inner.inflight.contains_key(&id) {
            tracing::warn!("Rejecting duplicate in-flight request id {id}");
            let err = McpError::InvalidRequest(format!("request id {id} is already in flight"));
            return Some(reply(id, Err(err)));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        match self.route(request, cancel_rx) {
            Ok(Outcome::Ready(result)) => Some(self.finish(id, result)),
            Ok(Outcome::Deferred(future)) => {
                let session = self.clone();
                let task_id = id.clone();
                let tracked = self.track(id.clone(), cancel_tx, future, move |result| {
                    session.complete_deferred(task_id, result)
                });
                if tracked {
                    None
                } else {
                    let err = McpError::InvalidRequest(format!("request id {id} is already in flight"));
                    Some(reply(id, Err(err)))
                }
            }
            Err(e) => Some(self.finish(id, Err(e))),
        }
    }

    fn route(&self, request: JsonRpcRequest, cancel: watch::Receiver<bool>) -> Routed {
        let JsonRpcRequest { id, method, params, .. } = request;
        let state = self.state();

        match method.as_str() {
            "initialize" if state == SessionState::Uninitialized => {
                return ready(self.handle_initialize(params));
            }
            "initialize" if !state.is_shutting_down() => {
                return Err(McpError::InvalidRequest(
                    "session is already initialized".to_string(),
                ));
            }
            "ping" if !state.is_shutting_down() => return ready(Ok(EmptyResult {})),
            _ => state.guard()?,
        }

        let caps = self.capabilities();
        match method.as_str() {
            "tools/list" => {
                caps.require(Capability::Tools)?;
                ready(self.list_tools().map(|tools| ToolListResult {
                    tools,
                    next_cursor: None,
                }))
            }
            "tools/call" => {
                let call: CallToolRequest = parse_params(params, "tools/call")?;
                let name = call.name.clone();
                let exchange = self.exchange(Some(id), cancel);
                match self.dispatcher().call_tool(exchange, call) {
                    Ok(outcome) => Ok(outcome.map(to_value)),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        tracing::warn!("tools/call '{name}' rejected: {e}");
                        ready(Ok(CallToolResult::error(e.to_string())))
                    }
                }
            }

            "resources/list" => {
                caps.require(Capability::Resources)?;
                ready(self.list_resources().map(|resources| ResourceListResult {
                    resources,
                    next_cursor: None,
                }))
            }
            "resources/templates/list" => {
                caps.require(Capability::Resources)?;
                ready(
                    self.list_resource_templates()
                        .map(|resource_templates| ResourceTemplateListResult {
                            resource_templates,
                            next_cursor: None,
                        }),
                )
            }
            "resources/read" => {
                let read: ReadResourceRequest = parse_params(params, "resources/read")?;
                let exchange = self.exchange(Some(id), cancel);
                let outcome = self.dispatcher().read_resource(exchange, &read.uri)?;
                Ok(outcome.map(to_value))
            }
            "resources/subscribe" => {
                caps.require(Capability::ResourceSubscriptions)?;
                let sub: SubscribeParams = parse_params(params, "resources/subscribe")?;
                tracing::debug!("Client subscribed to {}", sub.uri);
                self.inner.subscriptions.insert(sub.uri);
                ready(Ok(EmptyResult {}))
            }
            "resources/unsubscribe" => {
                caps.require(Capability::ResourceSubscriptions)?;
                let sub: SubscribeParams = parse_params(params, "resources/unsubscribe")?;
                tracing::debug!("Client unsubscribed from {}", sub.uri);
                self.inner.subscriptions.remove(&sub.uri);
                ready(Ok(EmptyResult {}))
            }

            "prompts/list" => {
                caps.require(Capability::Prompts)?;
                ready(self.list_prompts().map(|prompts| PromptListResult {
                    prompts,
                    next_cursor: None,
                }))
            }
            "prompts/get" => {
                let get: GetPromptRequest = parse_params(params, "prompts/get")?;
                let exchange = self.exchange(Some(id), cancel);
                let outcome = self.dispatcher().get_prompt(exchange, get)?;
                Ok(outcome.map(to_value))
            }

            "logging/setLevel" => {
                caps.require(Capability::Logging)?;
                let set: SetLevelParams = parse_params(params, "logging/setLevel")?;
                tracing::info!("Client set minimum log level to {:?}", set.level);
                self.inner.outbound.set_min_log_level(set.level);
                ready(Ok(EmptyResult {}))
            }

            _ => Err(McpError::MethodNotFound(method)),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> McpResult<InitializeResult> {
        let params: InitializeParams = parse_params(params, "initialize")?;
        if !self.transition(SessionState::Negotiating) {
            return Err(McpError::InvalidRequest(
                "session is already initialized".to_string(),
            ));
        }
        let result = self.inner.negotiation.negotiate(
            params,
            &self.inner.server_info,
            &self.capabilities(),
            self.inner.instructions.clone(),
        )?;
        self.transition(SessionState::Active);
        Ok(result)
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::INITIALIZED => self.inner.negotiation.mark_initialized(),
            methods::CANCELLED => {
                match parse_params::<CancelledParams>(notification.params, methods::CANCELLED) {
                    Ok(cancelled) => self.cancel_call(cancelled),
                    Err(e) => tracing::warn!("Ignoring malformed cancellation: {e}"),
                }
            }
            methods::ROOTS_LIST_CHANGED => {
                tracing::info!("Client roots changed");
            }
            other => {
                tracing::debug!("Unknown notification: {other}");
            }
        }
    }

    fn cancel_call(&self, cancelled: CancelledParams) {
        let reason = cancelled.reason.as_deref().unwrap_or("no reason given");
        match self.inner.inflight.get(&cancelled.request_id) {
            Some(call) => {
                tracing::info!("Cancelling request {} ({reason})", cancelled.request_id);
                let _ = call.cancel.send(true);
            }
            None => tracing::debug!(
                "Cancellation for request {} which is not in flight",
                cancelled.request_id
            ),
        }
    }

    /// Reply for a call that settled on the accept flow.
    fn finish(&self, id: RequestId, result: McpResult<Value>) -> JsonRpcMessage {
        reply(id, result.map_err(|e| self.escalate(e)))
    }

    fn complete_deferred(&self, id: RequestId, result: McpResult<Value>) {
        if self.state() != SessionState::Active {
            tracing::debug!("Discarding result for request {id}: session is {}", self.state());
            return;
        }
        let result = result.map_err(|e| self.escalate(e));
        // Refused once teardown has closed the channel, even if it began
        // after the state check above.
        if !self.inner.outbound.send_open(reply(id.clone(), result)) {
            tracing::debug!("Discarding result for request {id}: session is {}", self.state());
        }
    }
}

#[derive(Serialize)]
struct EmptyResult {}

fn to_value<T: Serialize>(result: McpResult<T>) -> McpResult<Value> {
    result.and_then(|value| {
        serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
    })
}

fn ready<T: Serialize>(result: McpResult<T>) -> Routed {
    Ok(Outcome::Ready(to_value(result)))
}

fn reply(id: RequestId, result: McpResult<Value>) -> JsonRpcMessage {
    match result {
        Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(id, value)),
        Err(e) => JsonRpcMessage::Error(e.to_json_rpc_error(id)),
    }
}
