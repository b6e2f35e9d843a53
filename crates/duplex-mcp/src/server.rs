//! The `duplex-mcp` server definition shared by every transport.

use duplex_core::types::{CapabilitySet, McpResult, MCP_VERSION};
use duplex_core::SessionBuilder;
use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::{prompts, resources, tools};

pub const SERVER_NAME: &str = "duplex-mcp";

const INSTRUCTIONS: &str = "Demo MCP server. Try `basic-calculator`, read `custom://resource`, \
or call `ai-calculator` from a client that supports sampling.";

pub fn capabilities() -> CapabilitySet {
    CapabilitySet::builder()
        .tools(true)
        .resources(true, true)
        .prompts(true)
        .logging()
        .build()
}

/// Template every transport stamps sessions from.
pub fn session_builder(config: &ServerConfig) -> SessionBuilder {
    let builder = SessionBuilder::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))
        .capabilities(capabilities())
        .instructions(INSTRUCTIONS)
        .request_timeout(config.request_timeout)
        .drain_timeout(config.drain_timeout);

    let builder = tools::register(builder);
    let builder = resources::register(builder);
    prompts::register(builder)
}

/// Server identity, capabilities and operations as JSON, for `duplex-mcp info`.
pub fn describe(builder: &SessionBuilder) -> McpResult<Value> {
    let session = builder.build()?;
    let tools = session.list_tools()?;
    let resources = session.list_resources()?;
    let templates = session.list_resource_templates()?;
    let prompts = session.list_prompts()?;

    Ok(json!({
        "server": builder.server_info(),
        "protocol_version": MCP_VERSION,
        "capabilities": builder.capability_set().to_server_capabilities(),
        "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
        "tool_count": tools.len(),
        "resources": resources.iter().map(|r| &r.uri).collect::<Vec<_>>(),
        "resource_templates": templates.iter().map(|t| &t.uri_template).collect::<Vec<_>>(),
        "prompts": prompts.iter().map(|p| &p.name).collect::<Vec<_>>(),
    }))
}
