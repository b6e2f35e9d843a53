//! Protocol handling: negotiation, validation, dispatch and JSON-RPC routing.

pub mod dispatcher;
pub mod handler;
pub mod negotiation;
pub mod validator;

pub use dispatcher::Dispatcher;
pub use negotiation::{Negotiation, PeerInfo};
