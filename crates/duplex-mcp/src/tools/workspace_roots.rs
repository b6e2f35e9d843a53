//! Tool `workspace-roots`: list the filesystem roots the client exposes.

use duplex_core::types::{CallToolRequest, CallToolResult, McpResult, Tool};
use duplex_core::{Exchange, Handler, ToolHandler};
use serde_json::json;

pub const NAME: &str = "workspace-roots";

pub const NO_ROOTS: &str = "Client does not expose roots";

pub fn definition() -> Tool {
    Tool::new(
        NAME,
        "List the workspace roots the client has shared",
        json!({ "type": "object", "properties": {} }),
    )
}

pub fn handler() -> ToolHandler {
    Handler::asynchronous(execute)
}

async fn execute(exchange: Exchange, _request: CallToolRequest) -> McpResult<CallToolResult> {
    if exchange.client_capabilities().roots.is_none() {
        return Ok(CallToolResult::text(NO_ROOTS));
    }
    let listed = exchange.list_roots().await?;
    Ok(CallToolResult::json(&listed.roots))
}
