//! Demo prompts registered by the `duplex-mcp` server.

pub mod greeting;

use duplex_core::SessionBuilder;

pub fn register(builder: SessionBuilder) -> SessionBuilder {
    builder.prompt(greeting::definition(), greeting::handler())
}
