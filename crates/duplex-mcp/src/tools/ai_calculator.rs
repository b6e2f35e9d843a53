//! Tool `ai-calculator`: evaluate an expression by asking the client's model.

use duplex_core::types::{
    CallToolRequest, CallToolResult, CreateMessageRequest, McpError, McpResult, ModelHint,
    ModelPreferences, SamplingMessage, Tool,
};
use duplex_core::{Exchange, Handler, ToolHandler};
use serde::Deserialize;
use serde_json::json;

pub const NAME: &str = "ai-calculator";

pub const NO_SAMPLING: &str = "Client does not support AI capabilities";

const SYSTEM_PROMPT: &str =
    "You are a helpful calculator assistant. Provide only the numerical answer.";
const MAX_TOKENS: u32 = 100;

#[derive(Debug, Deserialize)]
struct AiCalculatorParams {
    expression: String,
}

pub fn definition() -> Tool {
    Tool::new(
        NAME,
        "Evaluate an arithmetic expression using the client's language model",
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate, e.g. \"12 * (3 + 4)\""
                }
            },
            "required": ["expression"]
        }),
    )
}

pub fn handler() -> ToolHandler {
    Handler::asynchronous(execute)
}

pub(crate) fn sampling_request(expression: &str) -> CreateMessageRequest {
    let preferences = ModelPreferences {
        hints: vec![ModelHint::of("claude-3-sonnet"), ModelHint::of("claude")],
        intelligence_priority: Some(0.8),
        speed_priority: Some(0.5),
        ..Default::default()
    };
    CreateMessageRequest::new(
        vec![SamplingMessage::user(format!("Calculate: {expression}"))],
        MAX_TOKENS,
    )
    .with_system_prompt(SYSTEM_PROMPT)
    .with_model_preferences(preferences)
}

async fn execute(exchange: Exchange, request: CallToolRequest) -> McpResult<CallToolResult> {
    let params: AiCalculatorParams = super::parse_args(request.arguments())?;

    if exchange.client_capabilities().sampling.is_none() {
        return Ok(CallToolResult::text(NO_SAMPLING));
    }

    let reply = exchange
        .create_message(sampling_request(&params.expression))
        .await?;
    tracing::debug!("{NAME}: model {} answered '{}'", reply.model, params.expression);

    match reply.content.as_text() {
        Some(answer) => Ok(CallToolResult::text(answer.trim())),
        None => Err(McpError::InternalError(
            "model returned non-text content".to_string(),
        )),
    }
}
