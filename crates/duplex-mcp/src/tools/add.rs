//! Tool `add`: sum two numbers.

use duplex_core::types::{CallToolRequest, CallToolResult, McpResult, Tool};
use duplex_core::{Exchange, Handler, ToolHandler};
use serde::Deserialize;
use serde_json::json;

pub const NAME: &str = "add";

#[derive(Debug, Deserialize)]
struct AddParams {
    a: f64,
    b: f64,
}

pub fn definition() -> Tool {
    Tool::new(
        NAME,
        "Add two numbers",
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number", "description": "First operand" },
                "b": { "type": "number", "description": "Second operand" }
            },
            "required": ["a", "b"]
        }),
    )
}

pub fn handler() -> ToolHandler {
    Handler::sync(execute)
}

fn execute(_exchange: Exchange, request: CallToolRequest) -> McpResult<CallToolResult> {
    let params: AddParams = super::parse_args(request.arguments())?;
    Ok(CallToolResult::text((params.a + params.b).to_string()))
}
