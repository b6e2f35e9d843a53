//! Error types and JSON-RPC error codes for the MCP server.

use std::time::Duration;

use super::capabilities::Capability;
use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP-specific error codes.
pub mod mcp_error_codes {
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const RESOURCE_NOT_FOUND: i32 = -32802;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const PROMPT_NOT_FOUND: i32 = -32804;

    /// Session: request arrived before the initialize handshake.
    pub const NOT_INITIALIZED: i32 = -32810;
    /// Session: request arrived after teardown began.
    pub const SESSION_CLOSED: i32 = -32811;
    /// Session: feature group was not negotiated.
    pub const CAPABILITY_DISABLED: i32 = -32812;
    pub const CONFIGURATION_ERROR: i32 = -32813;
    pub const HANDLER_FAULT: i32 = -32814;
    pub const PEER_TIMEOUT: i32 = -32815;
    pub const SESSION_CORRUPTED: i32 = -32816;
}

/// All errors that can occur in the MCP server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Session not initialized")]
    NotInitialized,

    #[error("Session closed")]
    SessionClosed,

    #[error("Capability not enabled: {0}")]
    CapabilityDisabled(Capability),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Handler fault: {0}")]
    HandlerFault(String),

    #[error("No reply to {method} within {}ms", .timeout.as_millis())]
    PeerTimeout { method: String, timeout: Duration },

    #[error("Session corrupted: {0}")]
    SessionCorrupted(String),

    /// The client answered a server-initiated request with an error.
    #[error("Client error {code}: {message}")]
    Peer { code: i32, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::RequestCancelled => REQUEST_CANCELLED,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::PromptNotFound(_) => PROMPT_NOT_FOUND,
            McpError::NotInitialized => NOT_INITIALIZED,
            McpError::SessionClosed => SESSION_CLOSED,
            McpError::CapabilityDisabled(_) => CAPABILITY_DISABLED,
            McpError::Configuration(_) => CONFIGURATION_ERROR,
            McpError::HandlerFault(_) => HANDLER_FAULT,
            McpError::PeerTimeout { .. } => PEER_TIMEOUT,
            McpError::SessionCorrupted(_) => SESSION_CORRUPTED,
            McpError::Peer { code, .. } => *code,
            McpError::Transport(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
        }
    }

    /// Lookup failures: the name is unknown to an enabled registry.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            McpError::ToolNotFound(_) | McpError::ResourceNotFound(_) | McpError::PromptNotFound(_)
        )
    }

    /// Only session corruption forces a teardown.
    pub fn is_fatal(&self) -> bool {
        matches!(self, McpError::SessionCorrupted(_))
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
