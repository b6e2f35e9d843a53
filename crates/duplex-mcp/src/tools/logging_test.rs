//! Tool `logging-test`: emit a debug log notification to the client.

use duplex_core::types::{CallToolRequest, CallToolResult, LogLevel, McpResult, Tool};
use duplex_core::{Exchange, Handler, ToolHandler};
use serde_json::json;

pub const NAME: &str = "logging-test";

pub fn definition() -> Tool {
    Tool::new(
        NAME,
        "Send a debug log message to the client",
        json!({ "type": "object", "properties": {} }),
    )
}

pub fn handler() -> ToolHandler {
    Handler::asynchronous(execute)
}

async fn execute(exchange: Exchange, _request: CallToolRequest) -> McpResult<CallToolResult> {
    exchange.log(LogLevel::Debug, Some("test-logger"), "Debug message");
    Ok(CallToolResult::text("Logging test completed"))
}
