//! Message framing for newline-delimited JSON.

use duplex_core::types::{JsonRpcError, JsonRpcMessage, McpError, McpResult, RequestId};

/// Parse a single line of text as a JSON-RPC message.
pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))
}

/// Serialize a message to a JSON line (with trailing newline).
pub fn frame_message(message: &JsonRpcMessage) -> McpResult<String> {
    let mut json = serde_json::to_string(message).map_err(McpError::Json)?;
    json.push('\n');
    Ok(json)
}

/// Error frame for a failure not tied to any decodable request id.
pub fn null_id_error(error: &McpError) -> JsonRpcMessage {
    JsonRpcMessage::Error(JsonRpcError::new(RequestId::Null, error.code(), error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_core::types::error_codes;

    #[test]
    fn test_parse_rejects_blank_and_garbage() {
        assert!(matches!(parse_message("   \n"), Err(McpError::ParseError(_))));
        assert!(matches!(parse_message("{not json"), Err(McpError::ParseError(_))));
    }

    #[test]
    fn test_parse_then_frame_is_one_line() {
        let msg = parse_message(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(msg.method(), Some("ping"));
        let framed = frame_message(&msg).unwrap();
        assert!(framed.ends_with('\n'));
        assert_eq!(framed.matches('\n').count(), 1);
    }

    #[test]
    fn test_null_id_error_has_null_id() {
        let err = parse_message("nope").unwrap_err();
        let v = serde_json::to_value(null_id_error(&err)).unwrap();
        assert!(v["id"].is_null());
        assert_eq!(v["error"]["code"], error_codes::PARSE_ERROR);
    }
}
