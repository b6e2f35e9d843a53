//! Prompt `greeting`: ask the model to greet someone by name.

use duplex_core::types::{
    Content, GetPromptRequest, GetPromptResult, McpResult, Prompt, PromptArgument,
    PromptMessage, Role,
};
use duplex_core::{Exchange, Handler, PromptHandler};

pub const NAME: &str = "greeting";

pub fn definition() -> Prompt {
    Prompt::new(
        NAME,
        "A friendly greeting prompt",
        vec![
            PromptArgument::new("name", "Name of the person to greet", true),
            PromptArgument::new("style", "Tone of the greeting, e.g. formal", false),
        ],
    )
}

pub fn handler() -> PromptHandler {
    Handler::sync(render)
}

fn render(_exchange: Exchange, request: GetPromptRequest) -> McpResult<GetPromptResult> {
    // Required arguments are checked before the handler runs.
    let name = request.argument("name").unwrap_or_default();
    let text = match request.argument("style") {
        Some(style) => format!("Hello {name}! Please greet them in a {style} tone."),
        None => format!("Hello {name}! How can I assist you today?"),
    };

    Ok(GetPromptResult {
        description: Some(format!("Greeting for {name}")),
        messages: vec![PromptMessage {
            role: Role::User,
            content: Content::text(text),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_greeting_uses_name_and_style() {
        let mut args = Map::new();
        args.insert("name".into(), json!("Ada"));
        let plain = render(Exchange::detached(), GetPromptRequest::new(NAME, args.clone())).unwrap();
        assert_eq!(
            plain.messages[0].content.as_text(),
            Some("Hello Ada! How can I assist you today?")
        );

        args.insert("style".into(), json!("formal"));
        let formal = render(Exchange::detached(), GetPromptRequest::new(NAME, args)).unwrap();
        assert!(formal.messages[0].content.as_text().unwrap().contains("formal tone"));
    }
}
