//! Resource template `custom://notes/{id}`: one JSON note per id.

use duplex_core::types::{
    McpError, McpResult, ReadResourceRequest, ReadResourceResult, ResourceContents,
    ResourceTemplate,
};
use duplex_core::{Exchange, Handler, ResourceHandler};
use serde_json::json;

pub const URI_TEMPLATE: &str = "custom://notes/{id}";

pub fn definition() -> ResourceTemplate {
    ResourceTemplate::new(URI_TEMPLATE, "Note")
        .with_description("A note addressed by id")
        .with_mime_type("application/json")
}

pub fn handler() -> ResourceHandler {
    Handler::sync(read)
}

fn read(_exchange: Exchange, request: ReadResourceRequest) -> McpResult<ReadResourceResult> {
    let id = request
        .variables
        .get("id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| McpError::ResourceNotFound(request.uri.clone()))?;

    let note = json!({
        "id": id,
        "title": format!("Note {id}"),
        "body": format!("Contents of note {id}"),
    });
    let text = serde_json::to_string_pretty(&note)?;

    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(
            request.uri,
            Some("application/json"),
            text,
        )],
    })
}
