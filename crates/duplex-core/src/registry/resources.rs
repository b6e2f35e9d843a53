//! Resource registry: exact URIs plus URI templates.

use std::collections::HashMap;

use crate::types::{
    McpError, McpResult, ReadResourceRequest, ReadResourceResult, Resource, ResourceTemplate,
};

use super::handler::Handler;
use super::store::{Descriptor, Registry};

pub type ResourceHandler = Handler<ReadResourceRequest, ReadResourceResult>;

impl Descriptor for Resource {
    const KIND: &'static str = "resource";

    fn key(&self) -> &str {
        &self.uri
    }

    fn validate(&self) -> McpResult<()> {
        if self.uri.is_empty() {
            return Err(McpError::Configuration(
                "resource URI must not be empty".to_string(),
            ));
        }
        if self.name.is_empty() {
            return Err(McpError::Configuration(format!(
                "resource '{}' must have a name",
                self.uri
            )));
        }
        Ok(())
    }

    fn not_found(key: &str) -> McpError {
        McpError::ResourceNotFound(key.to_string())
    }
}

impl Descriptor for ResourceTemplate {
    const KIND: &'static str = "resource template";

    fn key(&self) -> &str {
        &self.uri_template
    }

    fn validate(&self) -> McpResult<()> {
        if self.uri_template.is_empty() {
            return Err(McpError::Configuration(
                "resource template must not be empty".to_string(),
            ));
        }
        template_variables(&self.uri_template).map(|_| ())
    }

    fn not_found(key: &str) -> McpError {
        McpError::ResourceNotFound(key.to_string())
    }
}

/// Both resource maps. Exact URIs win over templates.
#[derive(Default)]
pub struct ResourceRegistry {
    pub resources: Registry<Resource, ResourceHandler>,
    pub templates: Registry<ResourceTemplate, ResourceHandler>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a URI to its handler, binding template variables on the way.
    pub fn resolve(&self, uri: &str) -> McpResult<(ResourceHandler, ReadResourceRequest)> {
        match self.resources.get(uri) {
            Ok((_, handler)) => return Ok((handler, ReadResourceRequest::new(uri))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let matched = self
            .templates
            .find_map(|template| match_uri_template(&template.uri_template, uri))?;

        match matched {
            Some((template, handler, variables)) => {
                tracing::debug!("Resource {uri} matched template {}", template.uri_template);
                let mut request = ReadResourceRequest::new(uri);
                request.variables = variables;
                Ok((handler, request))
            }
            None => Err(McpError::ResourceNotFound(uri.to_string())),
        }
    }
}

/// Variable names of a `{var}` template, rejecting malformed ones.
fn template_variables(template: &str) -> McpResult<Vec<String>> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            McpError::Configuration(format!("unclosed '{{' in resource template {template}"))
        })?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(McpError::Configuration(format!(
                "invalid variable in resource template {template}"
            )));
        }
        if after[close + 1..].starts_with('{') {
            return Err(McpError::Configuration(format!(
                "adjacent variables in resource template {template}"
            )));
        }
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(McpError::Configuration(format!(
            "unmatched '}}' in resource template {template}"
        )));
    }
    Ok(names)
}

/// Match `uri` against a level-1 URI template (`custom://notes/{id}`).
///
/// A variable matches one or more characters up to the next literal and never
/// spans a `/`.
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let mut variables = HashMap::new();
    let mut template_rest = template;
    let mut uri_rest = uri;

    loop {
        let Some(open) = template_rest.find('{') else {
            return (uri_rest == template_rest).then_some(variables);
        };

        let literal = &template_rest[..open];
        uri_rest = uri_rest.strip_prefix(literal)?;

        let after = &template_rest[open + 1..];
        let close = after.find('}')?;
        let name = &after[..close];
        template_rest = &after[close + 1..];

        let next_literal = &template_rest[..template_rest.find('{').unwrap_or(template_rest.len())];
        let value_len = if next_literal.is_empty() {
            uri_rest.len()
        } else {
            uri_rest.find(next_literal)?
        };

        let value = &uri_rest[..value_len];
        if value.is_empty() || value.contains('/') {
            return None;
        }
        variables.insert(name.to_string(), value.to_string());
        uri_rest = &uri_rest[value_len..];
    }
}
