//! MCP request parameter types.
//!
//! The `*Request` types double as the payload handed to registered handlers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::notification::ProgressToken;

/// The `_meta` object a client may attach to request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl CallToolRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments: Some(arguments),
            meta: None,
        }
    }

    /// Token to quote in progress notifications, if the client asked for them.
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.meta.as_ref()?.progress_token.as_ref()
    }

    /// Arguments as an object, empty when the client sent none.
    pub fn arguments(&self) -> Value {
        self.arguments
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn f64_arg(&self, key: &str) -> Option<f64> {
        self.arguments.as_ref()?.get(key)?.as_f64()
    }

    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    pub uri: String,
    /// Values bound by a matching URI template; empty for exact matches.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

impl ReadResourceRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            variables: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

impl GetPromptRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments: Some(arguments),
        }
    }

    /// A prompt argument rendered as text; strings are taken verbatim.
    pub fn argument(&self, key: &str) -> Option<String> {
        let value = self.arguments.as_ref()?.get(key)?;
        Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn has_argument(&self, key: &str) -> bool {
        self.arguments
            .as_ref()
            .is_some_and(|args| args.get(key).is_some_and(|v| !v.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_tool_request_reads_progress_token() {
        let req: CallToolRequest = serde_json::from_value(json!({
            "name": "slow-echo",
            "arguments": {"text": "hi"},
            "_meta": {"progressToken": "abc"}
        }))
        .unwrap();
        assert_eq!(req.progress_token(), Some(&ProgressToken::String("abc".into())));
        assert_eq!(req.str_arg("text"), Some("hi"));
        assert!(CallToolRequest::new("add", json!({})).progress_token().is_none());
    }

    #[test]
    fn test_prompt_argument_rendering() {
        let mut args = Map::new();
        args.insert("name".into(), json!("Ada"));
        args.insert("count".into(), json!(3));
        args.insert("absent".into(), Value::Null);
        let req = GetPromptRequest::new("greeting", args);
        assert_eq!(req.argument("name").as_deref(), Some("Ada"));
        assert_eq!(req.argument("count").as_deref(), Some("3"));
        assert!(!req.has_argument("absent"));
        assert!(!req.has_argument("missing"));
    }
}
