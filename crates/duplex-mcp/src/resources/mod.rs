//! Demo resources registered by the `duplex-mcp` server.

pub mod custom;
pub mod notes;

use duplex_core::SessionBuilder;

pub fn register(builder: SessionBuilder) -> SessionBuilder {
    builder
        .resource(custom::definition(), custom::handler())
        .resource_template(notes::definition(), notes::handler())
}
