//! Tool registry.

use crate::types::{CallToolRequest, CallToolResult, McpError, McpResult, Tool};

use super::handler::Handler;
use super::store::{Descriptor, Registry};

pub type ToolHandler = Handler<CallToolRequest, CallToolResult>;
pub type ToolRegistry = Registry<Tool, ToolHandler>;

impl Descriptor for Tool {
    const KIND: &'static str = "tool";

    fn key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> McpResult<()> {
        if self.name.is_empty() {
            return Err(McpError::Configuration(
                "tool name must not be empty".to_string(),
            ));
        }
        if !self.input_schema.is_object() {
            return Err(McpError::Configuration(format!(
                "tool '{}' input schema must be a JSON object",
                self.name
            )));
        }
        Ok(())
    }

    fn not_found(key: &str) -> McpError {
        McpError::ToolNotFound(key.to_string())
    }
}
