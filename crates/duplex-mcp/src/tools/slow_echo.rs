//! Tool `slow-echo`: echo text back after a delay, reporting progress.
//!
//! The delay is split into steps. Each step reports progress when the
//! client supplied a progress token, and the call gives up as soon as it is
//! cancelled.

use std::time::Duration;

use duplex_core::types::{CallToolRequest, CallToolResult, McpError, McpResult, Tool};
use duplex_core::{Exchange, Handler, ToolHandler};
use serde::Deserialize;
use serde_json::json;

pub const NAME: &str = "slow-echo";

const STEPS: u32 = 4;

fn default_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
struct SlowEchoParams {
    text: String,
    #[serde(default = "default_delay_ms")]
    delay_ms: u64,
}

pub fn definition() -> Tool {
    Tool::new(
        NAME,
        "Echo text after a delay; honours cancellation",
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "delay_ms": { "type": "integer", "minimum": 0, "default": 1000 }
            },
            "required": ["text"]
        }),
    )
}

pub fn handler() -> ToolHandler {
    Handler::asynchronous(execute)
}

async fn execute(exchange: Exchange, request: CallToolRequest) -> McpResult<CallToolResult> {
    let params: SlowEchoParams = super::parse_args(request.arguments())?;
    let step = Duration::from_millis(params.delay_ms) / STEPS;

    for done in 1..=STEPS {
        tokio::select! {
            _ = exchange.cancelled() => {
                tracing::info!("{NAME} cancelled after {} of {STEPS} steps", done - 1);
                return Err(McpError::RequestCancelled);
            }
            _ = tokio::time::sleep(step) => {}
        }
        if let Some(token) = request.progress_token() {
            exchange.send_progress(token.clone(), f64::from(done), Some(f64::from(STEPS)));
        }
    }

    Ok(CallToolResult::text(params.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_echoes_after_delay() {
        let request = CallToolRequest::new(NAME, json!({"text": "hello", "delay_ms": 400}));
        let result = execute(Exchange::detached(), request).await.unwrap();
        assert_eq!(result.text_content(), "hello");
    }

    #[tokio::test]
    async fn test_requires_text() {
        let request = CallToolRequest::new(NAME, json!({"delay_ms": 1}));
        let err = execute(Exchange::detached(), request).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }
}
