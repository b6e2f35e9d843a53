//! JSON-RPC message validation.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{JsonRpcRequest, McpError, McpResult, JSONRPC_VERSION};

/// Validate that a JSON-RPC request is well-formed.
pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{}\"",
            request.jsonrpc
        )));
    }

    if request.method.is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Decode required request params, reporting failures as `InvalidParams`.
pub fn parse_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> McpResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(format!("{method}: {e}")))?
        .ok_or_else(|| McpError::InvalidParams(format!("{method} params required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallToolRequest, RequestId};
    use serde_json::json;

    #[test]
    fn test_rejects_wrong_version_and_empty_method() {
        let mut request = JsonRpcRequest::new(RequestId::Number(1), "ping", None);
        assert!(validate_request(&request).is_ok());

        request.jsonrpc = "1.0".to_string();
        assert!(matches!(validate_request(&request), Err(McpError::InvalidRequest(_))));

        let request = JsonRpcRequest::new(RequestId::Number(1), "", None);
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn test_parse_params() {
        let call: CallToolRequest =
            parse_params(Some(json!({"name": "add", "arguments": {"a": 1}})), "tools/call").unwrap();
        assert_eq!(call.name, "add");

        let missing = parse_params::<CallToolRequest>(None, "tools/call").unwrap_err();
        assert!(matches!(missing, McpError::InvalidParams(ref m) if m.contains("required")));

        let malformed = parse_params::<CallToolRequest>(Some(json!({"nope": 1})), "tools/call");
        assert!(matches!(malformed, Err(McpError::InvalidParams(_))));
    }
}
