//! Step-by-step session construction.

use std::time::Duration;

use crate::exchange::DEFAULT_REQUEST_TIMEOUT;
use crate::registry::{PromptHandler, ResourceHandler, ToolHandler};
use crate::transport::TransportHandle;
use crate::types::{CapabilitySet, Implementation, McpResult, Prompt, Resource, ResourceTemplate, Tool};

use super::Session;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Describes a server: identity, capabilities, timeouts and the operations
/// every new session starts with.
///
/// Cloneable so a transport that accepts many connections can stamp out one
/// session per connection from the same template.
#[derive(Clone)]
pub struct SessionBuilder {
    server_info: Implementation,
    capabilities: CapabilitySet,
    instructions: Option<String>,
    request_timeout: Duration,
    drain_timeout: Duration,
    tools: Vec<(Tool, ToolHandler)>,
    resources: Vec<(Resource, ResourceHandler)>,
    templates: Vec<(ResourceTemplate, ResourceHandler)>,
    prompts: Vec<(Prompt, PromptHandler)>,
}

impl SessionBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation::new(name, version),
            capabilities: CapabilitySet::default(),
            instructions: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            tools: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
        }
    }

    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Upper bound on every server→client request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How long teardown waits for in-flight handlers before aborting them.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn tool(mut self, tool: Tool, handler: ToolHandler) -> Self {
        self.tools.push((tool, handler));
        self
    }

    pub fn resource(mut self, resource: Resource, handler: ResourceHandler) -> Self {
        self.resources.push((resource, handler));
        self
    }

    pub fn resource_template(mut self, template: ResourceTemplate, handler: ResourceHandler) -> Self {
        self.templates.push((template, handler));
        self
    }

    pub fn prompt(mut self, prompt: Prompt, handler: PromptHandler) -> Self {
        self.prompts.push((prompt, handler));
        self
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn capability_set(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Build a session that is not yet attached to a transport.
    ///
    /// Fails with `Configuration` if an operation targets a disabled
    /// capability or has a malformed descriptor.
    pub fn build(&self) -> McpResult<Session> {
        let session = Session::new(
            self.server_info.clone(),
            self.capabilities,
            self.instructions.clone(),
            self.request_timeout,
            self.drain_timeout,
        );
        for (tool, handler) in &self.tools {
            session.add_tool(tool.clone(), handler.clone())?;
        }
        for (resource, handler) in &self.resources {
            session.add_resource(resource.clone(), handler.clone())?;
        }
        for (template, handler) in &self.templates {
            session.add_resource_template(template.clone(), handler.clone())?;
        }
        for (prompt, handler) in &self.prompts {
            session.add_prompt(prompt.clone(), handler.clone())?;
        }
        Ok(session)
    }

    /// Build a session and bind it to `transport`.
    pub fn start(&self, transport: TransportHandle) -> McpResult<Session> {
        let session = self.build()?;
        session.attach(transport)?;
        tracing::info!(
            "Session {} started for {} v{}",
            session.id(),
            self.server_info.name,
            self.server_info.version
        );
        Ok(session)
    }
}
