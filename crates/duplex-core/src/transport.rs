//! Boundary with the transport collaborator.
//!
//! A transport owns the wire. It feeds decoded inbound frames to
//! [`Session::handle_message`](crate::session::Session::handle_message) in
//! arrival order and drains [`OutboundFrames`] onto the wire. Responses,
//! notifications and server-initiated requests all leave through the same
//! channel, so the transport never needs to know which is which.

use tokio::sync::mpsc;

use crate::types::JsonRpcMessage;

/// Receiving half handed back to the transport.
pub type OutboundFrames = mpsc::UnboundedReceiver<JsonRpcMessage>;

/// Sending half held by the session.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<JsonRpcMessage>,
}

/// Create a connected handle / frame stream pair.
pub fn channel() -> (TransportHandle, OutboundFrames) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TransportHandle { tx }, rx)
}

impl TransportHandle {
    /// Queue a frame for the wire. Never blocks; returns `false` once the
    /// transport has dropped its receiver.
    pub fn send(&self, message: JsonRpcMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
