//! Prompt registry.

use std::collections::HashSet;

use crate::types::{GetPromptRequest, GetPromptResult, McpError, McpResult, Prompt};

use super::handler::Handler;
use super::store::{Descriptor, Registry};

pub type PromptHandler = Handler<GetPromptRequest, GetPromptResult>;
pub type PromptRegistry = Registry<Prompt, PromptHandler>;

impl Descriptor for Prompt {
    const KIND: &'static str = "prompt";

    fn key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> McpResult<()> {
        if self.name.is_empty() {
            return Err(McpError::Configuration(
                "prompt name must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for argument in self.arguments() {
            if argument.name.is_empty() || !seen.insert(argument.name.as_str()) {
                return Err(McpError::Configuration(format!(
                    "prompt '{}' has an empty or duplicate argument name '{}'",
                    self.name, argument.name
                )));
            }
        }
        Ok(())
    }

    fn not_found(key: &str) -> McpError {
        McpError::PromptNotFound(key.to_string())
    }
}

/// Fail with `InvalidParams` when a required argument is missing.
pub fn check_required_arguments(prompt: &Prompt, request: &GetPromptRequest) -> McpResult<()> {
    let missing: Vec<&str> = prompt
        .arguments()
        .iter()
        .filter(|arg| arg.required && !request.has_argument(&arg.name))
        .map(|arg| arg.name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(McpError::InvalidParams(format!(
            "prompt '{}' is missing required argument(s): {}",
            prompt.name,
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptArgument;
    use serde_json::{json, Map, Value};

    fn greeting() -> Prompt {
        Prompt::new(
            "greeting",
            "Greets someone",
            vec![
                PromptArgument::new("name", "Who to greet", true),
                PromptArgument::new("tone", "How to greet", false),
            ],
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_missing_required_argument() {
        let request = GetPromptRequest::new("greeting", args(json!({"tone": "warm"})));
        let err = check_required_arguments(&greeting(), &request).unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(ref m) if m.contains("name")));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let request = GetPromptRequest::new("greeting", args(json!({"name": null})));
        assert!(check_required_arguments(&greeting(), &request).is_err());
    }

    #[test]
    fn test_optional_arguments_may_be_omitted() {
        let request = GetPromptRequest::new("greeting", args(json!({"name": "Ada"})));
        assert!(check_required_arguments(&greeting(), &request).is_ok());
    }

    #[test]
    fn test_duplicate_argument_names_are_rejected() {
        let prompt = Prompt::new(
            "dup",
            "dup",
            vec![
                PromptArgument::new("x", "", true),
                PromptArgument::new("x", "", false),
            ],
        );
        assert!(matches!(prompt.validate(), Err(McpError::Configuration(_))));
    }
}
