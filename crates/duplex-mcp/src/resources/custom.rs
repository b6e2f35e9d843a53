//! Resource `custom://resource`: a fixed text document.

use duplex_core::types::{ReadResourceRequest, ReadResourceResult, Resource, ResourceContents};
use duplex_core::{Handler, ResourceHandler};

pub const URI: &str = "custom://resource";

pub fn definition() -> Resource {
    Resource::new(URI, "Custom resource")
        .with_description("A static text resource")
        .with_mime_type("text/plain")
}

pub fn handler() -> ResourceHandler {
    Handler::sync(|_exchange, request: ReadResourceRequest| {
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(
                request.uri,
                Some("text/plain"),
                "Custom resource content",
            )],
        })
    })
}
