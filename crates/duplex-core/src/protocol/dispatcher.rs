//! Resolves calls against the registries and runs their handlers.
//!
//! Every call goes through the same four steps: capability check, lookup,
//! exchange scoping, invocation. Errors from the first two come back as `Err`
//! before anything runs; what the handler produces is carried by the
//! returned [`Outcome`].

use crate::exchange::Exchange;
use crate::registry::prompts::check_required_arguments;
use crate::registry::{Outcome, Registries};
use crate::types::{
    CallToolRequest, CallToolResult, Capability, CapabilitySet, GetPromptRequest,
    GetPromptResult, McpResult, ReadResourceResult,
};

pub struct Dispatcher<'a> {
    registries: &'a Registries,
    capabilities: CapabilitySet,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registries: &'a Registries, capabilities: CapabilitySet) -> Self {
        Self {
            registries,
            capabilities,
        }
    }

    /// Handler failures are folded into an `isError` result, except session
    /// corruption which stays an `Err`.
    pub fn call_tool(
        &self,
        exchange: Exchange,
        request: CallToolRequest,
    ) -> McpResult<Outcome<CallToolResult>> {
        self.capabilities.require(Capability::Tools)?;
        let (_, handler) = self.registries.tools.get(&request.name)?;
        tracing::debug!("Calling tool '{}' ({:?})", request.name, handler.mode());

        let name = request.name.clone();
        let scope = exchange.scope();
        let outcome = handler.invoke(exchange, request);
        Ok(outcome.map(move |result| {
            drop(scope);
            match result {
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Tool '{name}' failed: {e}");
                    Ok(CallToolResult::error(e.to_string()))
                }
                other => other,
            }
        }))
    }

    pub fn read_resource(
        &self,
        exchange: Exchange,
        uri: &str,
    ) -> McpResult<Outcome<ReadResourceResult>> {
        self.capabilities.require(Capability::Resources)?;
        let (handler, request) = self.registries.resources.resolve(uri)?;
        tracing::debug!("Reading resource {uri}");

        let scope = exchange.scope();
        let outcome = handler.invoke(exchange, request);
        Ok(outcome.map(move |result| {
            drop(scope);
            result
        }))
    }

    pub fn get_prompt(
        &self,
        exchange: Exchange,
        request: GetPromptRequest,
    ) -> McpResult<Outcome<GetPromptResult>> {
        self.capabilities.require(Capability::Prompts)?;
        let (prompt, handler) = self.registries.prompts.get(&request.name)?;
        check_required_arguments(&prompt, &request)?;
        tracing::debug!("Rendering prompt '{}'", request.name);

        let scope = exchange.scope();
        let outcome = handler.invoke(exchange, request);
        Ok(outcome.map(move |result| {
            drop(scope);
            result
        }))
    }
}
