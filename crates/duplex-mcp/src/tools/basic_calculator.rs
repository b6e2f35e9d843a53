//! Tool `basic-calculator`: arithmetic on two operands.

use std::str::FromStr;

use duplex_core::types::{CallToolRequest, CallToolResult, McpError, McpResult, Tool};
use duplex_core::{Exchange, Handler, ToolHandler};
use serde::Deserialize;
use serde_json::json;

pub const NAME: &str = "basic-calculator";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl FromStr for Operation {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" | "+" => Ok(Operation::Add),
            "subtract" | "-" => Ok(Operation::Subtract),
            "multiply" | "*" | "x" => Ok(Operation::Multiply),
            "divide" | "/" => Ok(Operation::Divide),
            other => Err(McpError::InvalidParams(format!("unknown operation '{other}'"))),
        }
    }
}

impl Operation {
    pub fn apply(self, a: f64, b: f64) -> McpResult<f64> {
        match self {
            Operation::Add => Ok(a + b),
            Operation::Subtract => Ok(a - b),
            Operation::Multiply => Ok(a * b),
            Operation::Divide if b == 0.0 => {
                Err(McpError::InvalidParams("division by zero".to_string()))
            }
            Operation::Divide => Ok(a / b),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalculatorParams {
    operation: String,
    a: f64,
    b: f64,
}

pub fn definition() -> Tool {
    Tool::new(
        NAME,
        "Basic calculator",
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"]
                },
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["operation", "a", "b"]
        }),
    )
}

pub fn handler() -> ToolHandler {
    Handler::sync(execute)
}

fn execute(_exchange: Exchange, request: CallToolRequest) -> McpResult<CallToolResult> {
    let params: CalculatorParams = super::parse_args(request.arguments())?;
    let operation: Operation = params.operation.parse()?;
    let value = operation.apply(params.a, params.b)?;
    tracing::debug!("{NAME}: {:?}({}, {}) = {value}", operation, params.a, params.b);
    Ok(CallToolResult::text(value.to_string()))
}
