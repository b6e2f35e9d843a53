//! Demo tools registered by the `duplex-mcp` server.

pub mod add;
pub mod ai_calculator;
pub mod basic_calculator;
pub mod logging_test;
pub mod slow_echo;
pub mod workspace_roots;

use duplex_core::types::McpError;
use duplex_core::SessionBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Add every demo tool to `builder`, in listing order.
pub fn register(builder: SessionBuilder) -> SessionBuilder {
    builder
        .tool(add::definition(), add::handler())
        .tool(basic_calculator::definition(), basic_calculator::handler())
        .tool(ai_calculator::definition(), ai_calculator::handler())
        .tool(logging_test::definition(), logging_test::handler())
        .tool(slow_echo::definition(), slow_echo::handler())
        .tool(workspace_roots::definition(), workspace_roots::handler())
}

/// Decode tool arguments into a typed parameter struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, McpError> {
    serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))
}
