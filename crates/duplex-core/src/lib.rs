//! duplex-core: protocol dispatch core for bidirectional MCP sessions.
//!
//! A [`Session`] negotiates capabilities with one client, owns the tool,
//! resource and prompt registries, routes inbound JSON-RPC to their handlers
//! and lets those handlers talk back to the client through an [`Exchange`].

pub mod exchange;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

pub use exchange::Exchange;
pub use registry::{Handler, HandlerMode, Outcome, PromptHandler, ResourceHandler, ToolHandler};
pub use session::{Session, SessionBuilder, SessionState};
pub use transport::{OutboundFrames, TransportHandle};
