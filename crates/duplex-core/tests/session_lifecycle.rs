//! End-to-end session tests driven through JSON-RPC values.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use duplex_core::transport::{self, OutboundFrames};
use duplex_core::types::*;
use duplex_core::{Handler, Session, SessionBuilder, SessionState};

// ─────────────────────── helpers ───────────────────────

fn mcp_request(id: i64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

fn init_request() -> Value {
    mcp_request(
        0,
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "sampling": {} },
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }),
    )
}

fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

async fn send(session: &Session, msg: Value) -> Option<Value> {
    let parsed: JsonRpcMessage = serde_json::from_value(msg).unwrap();
    session
        .handle_message(parsed)
        .await
        .map(|reply| serde_json::to_value(reply).unwrap())
}

async fn send_unwrap(session: &Session, msg: Value) -> Value {
    send(session, msg).await.expect("expected response")
}

async fn next_frame(frames: &mut OutboundFrames) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbound channel closed");
    serde_json::to_value(frame).unwrap()
}

fn all_capabilities() -> CapabilitySet {
    CapabilitySet::builder()
        .tools(true)
        .resources(true, true)
        .prompts(true)
        .logging()
        .build()
}

fn builder() -> SessionBuilder {
    SessionBuilder::new("test-server", "0.1.0")
        .capabilities(all_capabilities())
        .tool(
            Tool::new(
                "add",
                "Adds two numbers",
                json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "number"}}}),
            ),
            Handler::sync(|_, req: CallToolRequest| {
                let a = req.f64_arg("a").unwrap_or(0.0);
                let b = req.f64_arg("b").unwrap_or(0.0);
                Ok(CallToolResult::text((a + b).to_string()))
            }),
        )
        .tool(
            Tool::new("sleep", "Sleeps for `ms`", json!({"type": "object"})),
            Handler::asynchronous(|_, req: CallToolRequest| async move {
                let ms = req.f64_arg("ms").unwrap_or(0.0) as u64;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(CallToolResult::text(ms.to_string()))
            }),
        )
        .tool(
            Tool::new("sample", "Asks the client for a completion", json!({"type": "object"})),
            Handler::asynchronous(|exchange: duplex_core::Exchange, _| async move {
                let request = CreateMessageRequest::new(vec![SamplingMessage::user("2+2?")], 32);
                exchange.create_message(request).await.map(|result| {
                    CallToolResult::text(result.content.as_text().unwrap_or_default().to_string())
                })
            }),
        )
        .tool(
            Tool::new("wait-cancel", "Runs until cancelled", json!({"type": "object"})),
            Handler::asynchronous(|exchange: duplex_core::Exchange, _| async move {
                tokio::select! {
                    _ = exchange.cancelled() => Ok(CallToolResult::text("cancelled")),
                    _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(CallToolResult::text("finished")),
                }
            }),
        )
        .resource(
            Resource::new("custom://resource", "Custom"),
            Handler::sync(|_, req: ReadResourceRequest| {
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(req.uri, Some("text/plain"), "hello")],
                })
            }),
        )
}

async fn initialized(builder: SessionBuilder) -> (Session, OutboundFrames) {
    let (handle, frames) = transport::channel();
    let session = builder.start(handle).unwrap();
    let resp = send_unwrap(&session, init_request()).await;
    assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
    assert!(send(&session, notification("notifications/initialized", json!({})))
        .await
        .is_none());
    (session, frames)
}

// ─────────────────────── handshake ───────────────────────

#[tokio::test]
async fn test_calls_before_initialize_are_rejected() {
    let (handle, _frames) = transport::channel();
    let session = builder().start(handle).unwrap();

    let resp = send_unwrap(&session, mcp_request(1, "tools/list", json!({}))).await;
    assert_eq!(resp["error"]["code"], mcp_error_codes::NOT_INITIALIZED);

    let resp = send_unwrap(&session, mcp_request(2, "ping", json!({}))).await;
    assert_eq!(resp["result"], json!({}));
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[tokio::test]
async fn test_initialize_advertises_capabilities_and_rejects_repeat() {
    let (handle, _frames) = transport::channel();
    let session = builder().start(handle).unwrap();

    let resp = send_unwrap(&session, init_request()).await;
    let caps = &resp["result"]["capabilities"];
    assert_eq!(caps["tools"]["listChanged"], true);
    assert_eq!(caps["resources"]["subscribe"], true);
    assert!(caps.get("logging").is_some());
    assert_eq!(resp["result"]["serverInfo"]["name"], "test-server");
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.client_info().unwrap().name, "test-client");

    let again = send_unwrap(&session, init_request()).await;
    assert_eq!(again["error"]["code"], error_codes::INVALID_REQUEST);
}

// ─────────────────────── dispatch ───────────────────────

#[tokio::test]
async fn test_add_returns_five() {
    let (session, _frames) = initialized(builder()).await;
    let resp = send_unwrap(
        &session,
        mcp_request(1, "tools/call", json!({"name": "add", "arguments": {"a": 2, "b": 3}})),
    )
    .await;
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"]["content"][0]["text"], "5");
    assert_eq!(resp["result"]["isError"], false);
}

#[tokio::test]
async fn test_unknown_tool_is_error_result_not_transport_fault() {
    let (session, _frames) = initialized(builder()).await;
    let resp = send_unwrap(
        &session,
        mcp_request(1, "tools/call", json!({"name": "sub", "arguments": {"a": 2, "b": 3}})),
    )
    .await;
    assert!(resp.get("error").is_none());
    assert_eq!(resp["result"]["isError"], true);
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn test_disabled_capability_is_not_reported_as_not_found() {
    let builder = SessionBuilder::new("bare", "0.1.0");
    let (session, _frames) = initialized(builder).await;

    let err = session.invoke_tool("ghost", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::CapabilityDisabled(Capability::Tools)));

    let resp = send_unwrap(&session, mcp_request(1, "prompts/list", json!({}))).await;
    assert_eq!(resp["error"]["code"], mcp_error_codes::CAPABILITY_DISABLED);

    let resp = send_unwrap(
        &session,
        mcp_request(2, "resources/read", json!({"uri": "custom://resource"})),
    )
    .await;
    assert_eq!(resp["error"]["code"], mcp_error_codes::CAPABILITY_DISABLED);
}

#[tokio::test]
async fn test_unknown_resource_with_capability_enabled_is_not_found() {
    let (session, _frames) = initialized(builder()).await;
    let err = session.read_resource("custom://missing").await.unwrap_err();
    assert!(matches!(err, McpError::ResourceNotFound(_)));

    let resp = send_unwrap(
        &session,
        mcp_request(1, "resources/read", json!({"uri": "custom://missing"})),
    )
    .await;
    assert_eq!(resp["error"]["code"], mcp_error_codes::RESOURCE_NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_method() {
    let (session, _frames) = initialized(builder()).await;
    let resp = send_unwrap(&session, mcp_request(9, "tools/destroy", json!({}))).await;
    assert_eq!(resp["error"]["code"], error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_replacement_keeps_position_and_wins() {
    let (session, mut frames) = initialized(builder()).await;
    session
        .add_tool(
            Tool::new("add", "Now concatenates", json!({"type": "object"})),
            Handler::sync(|_, _| Ok(CallToolResult::text("23"))),
        )
        .unwrap();
    let changed = next_frame(&mut frames).await;
    assert_eq!(changed["method"], "notifications/tools/list_changed");

    let resp = send_unwrap(&session, mcp_request(1, "tools/list", json!({}))).await;
    let names: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "sleep", "sample", "wait-cancel"]);
    assert_eq!(resp["result"]["tools"][0]["description"], "Now concatenates");

    let result = session.invoke_tool("add", json!({"a": 2, "b": 3})).await.unwrap();
    assert_eq!(result.text_content(), "23");
}

// ─────────────────────── async completion ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_async_results_arrive_in_completion_order() {
    let (session, mut frames) = initialized(builder()).await;

    let slow = mcp_request(1, "tools/call", json!({"name": "sleep", "arguments": {"ms": 50}}));
    let fast = mcp_request(2, "tools/call", json!({"name": "sleep", "arguments": {"ms": 10}}));
    assert!(send(&session, slow).await.is_none());
    assert!(send(&session, fast).await.is_none());
    assert_eq!(session.in_flight(), 2);

    let first = next_frame(&mut frames).await;
    let second = next_frame(&mut frames).await;
    assert_eq!(first["id"], 2);
    assert_eq!(first["result"]["content"][0]["text"], "10");
    assert_eq!(second["id"], 1);
    assert_eq!(session.in_flight(), 0);
}

#[tokio::test]
async fn test_duplicate_in_flight_id_is_rejected() {
    let (session, _frames) = initialized(builder()).await;
    let call = mcp_request(5, "tools/call", json!({"name": "wait-cancel", "arguments": {}}));
    assert!(send(&session, call.clone()).await.is_none());

    let resp = send_unwrap(&session, call).await;
    assert_eq!(resp["error"]["code"], error_codes::INVALID_REQUEST);
    session.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_notification_reaches_handler() {
    let (session, mut frames) = initialized(builder()).await;
    let call = mcp_request(7, "tools/call", json!({"name": "wait-cancel", "arguments": {}}));
    assert!(send(&session, call).await.is_none());

    send(
        &session,
        notification("notifications/cancelled", json!({"requestId": 7, "reason": "user"})),
    )
    .await;

    let resp = next_frame(&mut frames).await;
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["result"]["content"][0]["text"], "cancelled");
}

// ─────────────────────── server → client ───────────────────────

#[tokio::test]
async fn test_create_message_round_trip() {
    let (session, mut frames) = initialized(builder()).await;
    let call = mcp_request(3, "tools/call", json!({"name": "sample", "arguments": {}}));
    assert!(send(&session, call).await.is_none());

    let request = next_frame(&mut frames).await;
    assert_eq!(request["method"], "sampling/createMessage");
    assert_eq!(request["params"]["maxTokens"], 32);
    assert_eq!(session.pending_requests(), 1);

    let reply = json!({
        "jsonrpc": "2.0",
        "id": request["id"].clone(),
        "result": {
            "role": "assistant",
            "content": {"type": "text", "text": "4"},
            "model": "test-model"
        }
    });
    assert!(send(&session, reply).await.is_none());

    let resp = next_frame(&mut frames).await;
    assert_eq!(resp["id"], 3);
    assert_eq!(resp["result"]["content"][0]["text"], "4");
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_client_error_reply_becomes_error_result() {
    let (session, mut frames) = initialized(builder()).await;
    send(&session, mcp_request(3, "tools/call", json!({"name": "sample"}))).await;

    let request = next_frame(&mut frames).await;
    let reply = json!({
        "jsonrpc": "2.0",
        "id": request["id"].clone(),
        "error": {"code": -1, "message": "User rejected sampling request"}
    });
    send(&session, reply).await;

    let resp = next_frame(&mut frames).await;
    assert_eq!(resp["result"]["isError"], true);
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("User rejected"));
}

#[tokio::test(start_paused = true)]
async fn test_create_message_times_out_without_reply() {
    let builder = builder().request_timeout(Duration::from_millis(200));
    let (session, mut frames) = initialized(builder).await;
    send(&session, mcp_request(3, "tools/call", json!({"name": "sample"}))).await;

    let request = next_frame(&mut frames).await;
    assert_eq!(request["method"], "sampling/createMessage");

    let resp = next_frame(&mut frames).await;
    assert_eq!(resp["id"], 3);
    assert_eq!(resp["result"]["isError"], true);
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("sampling/createMessage"));
    assert_eq!(session.pending_requests(), 0);
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn test_set_level_filters_handler_logs() {
    let builder = builder().tool(
        Tool::new("chatty", "Logs twice", json!({"type": "object"})),
        Handler::sync(|exchange: duplex_core::Exchange, _| {
            exchange.log(LogLevel::Debug, Some("chatty"), "debug detail");
            exchange.log(LogLevel::Error, Some("chatty"), "something broke");
            Ok(CallToolResult::text("done"))
        }),
    );
    let (session, mut frames) = initialized(builder).await;
    let resp = send_unwrap(&session, mcp_request(1, "logging/setLevel", json!({"level": "warning"}))).await;
    assert_eq!(resp["result"], json!({}));

    send_unwrap(&session, mcp_request(2, "tools/call", json!({"name": "chatty"}))).await;
    let log = next_frame(&mut frames).await;
    assert_eq!(log["method"], "notifications/message");
    assert_eq!(log["params"]["level"], "error");
    assert!(frames.try_recv().is_err());
}

#[tokio::test]
async fn test_subscribe_then_update() {
    let (session, mut frames) = initialized(builder()).await;
    let resp = send_unwrap(
        &session,
        mcp_request(1, "resources/subscribe", json!({"uri": "custom://resource"})),
    )
    .await;
    assert_eq!(resp["result"], json!({}));

    session.notify(ServerEvent::ResourceUpdated {
        uri: "custom://resource".to_string(),
    });
    let update = next_frame(&mut frames).await;
    assert_eq!(update["method"], "notifications/resources/updated");
    assert_eq!(update["params"]["uri"], "custom://resource");
}

// ─────────────────────── teardown ───────────────────────

#[tokio::test]
async fn test_teardown_fails_pending_and_is_bounded() {
    let (observed_tx, mut observed) = mpsc::unbounded_channel();
    let builder = builder()
        .drain_timeout(Duration::from_millis(100))
        .tool(
            Tool::new("observe-sample", "Reports how sampling ended", json!({"type": "object"})),
            Handler::asynchronous(move |exchange: duplex_core::Exchange, _| {
                let observed_tx = observed_tx.clone();
                async move {
                    let request = CreateMessageRequest::new(vec![SamplingMessage::user("hi")], 8);
                    let result = exchange.create_message(request).await;
                    let _ = observed_tx.send(matches!(result, Err(McpError::SessionClosed)));
                    Ok(CallToolResult::text("late"))
                }
            }),
        )
        .tool(
            Tool::new("stubborn", "Ignores cancellation", json!({"type": "object"})),
            Handler::asynchronous(|_, _| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(CallToolResult::text("never"))
            }),
        );
    let (session, mut frames) = initialized(builder).await;

    const PENDING: i64 = 3;
    for id in 0..PENDING {
        send(&session, mcp_request(100 + id, "tools/call", json!({"name": "observe-sample"}))).await;
    }
    for id in 0..2 {
        send(&session, mcp_request(200 + id, "tools/call", json!({"name": "stubborn"}))).await;
    }
    for _ in 0..PENDING {
        assert_eq!(next_frame(&mut frames).await["method"], "sampling/createMessage");
    }
    assert_eq!(session.pending_requests(), PENDING as usize);
    assert_eq!(session.in_flight(), 5);

    tokio::time::timeout(Duration::from_secs(5), session.shutdown())
        .await
        .expect("teardown must be bounded");

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.pending_requests(), 0);
    assert_eq!(session.in_flight(), 0);
    for _ in 0..PENDING {
        assert!(observed.recv().await.unwrap(), "pending request must fail with SessionClosed");
    }

    // Results of drained calls are discarded.
    assert!(frames.try_recv().is_err());

    let resp = send_unwrap(&session, mcp_request(9, "tools/list", json!({}))).await;
    assert_eq!(resp["error"]["code"], mcp_error_codes::SESSION_CLOSED);
}

#[tokio::test]
async fn test_corruption_terminates_session() {
    let builder = builder().tool(
        Tool::new("corrupt", "Reports corrupted state", json!({"type": "object"})),
        Handler::sync(|_, _| Err(McpError::SessionCorrupted("registry invariant broken".into()))),
    );
    let (session, _frames) = initialized(builder).await;

    let resp = send_unwrap(&session, mcp_request(1, "tools/call", json!({"name": "corrupt"}))).await;
    assert_eq!(resp["error"]["code"], mcp_error_codes::SESSION_CORRUPTED);

    tokio::time::timeout(Duration::from_secs(5), session.closed())
        .await
        .expect("corruption must close the session");
    assert_eq!(session.state(), SessionState::Closed);
}
