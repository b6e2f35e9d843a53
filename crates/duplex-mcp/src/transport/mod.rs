//! Transport layer for MCP communication.
//!
//! Each transport owns the wire and one or more sessions: it feeds decoded
//! frames to [`Session::handle_message`](duplex_core::Session::handle_message)
//! and drains the session's outbound frames back onto the wire.

pub mod framing;
#[cfg(feature = "sse")]
pub mod sse;
pub mod stdio;

#[cfg(feature = "sse")]
pub use sse::SseTransport;
pub use stdio::StdioTransport;
