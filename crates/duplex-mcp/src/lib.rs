//! MCP server host built on duplex-core.
//!
//! Wires the protocol core to stdio and SSE transports, registers a set of
//! demo tools, resources and prompts, and ships an in-process client used by
//! the REPL and the integration tests.

pub mod client;
pub mod config;
pub mod prompts;
pub mod repl;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use client::{ClientOptions, LocalClient};
pub use config::{ConfigOverrides, ServerConfig};
pub use server::session_builder;
pub use transport::StdioTransport;
