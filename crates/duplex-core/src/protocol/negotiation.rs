//! Capability negotiation during initialization.

use std::sync::{Arc, OnceLock};

use crate::types::{
    CapabilitySet, ClientCapabilities, Implementation, InitializeParams, InitializeResult,
    McpError, McpResult, MCP_VERSION,
};

/// What the client told us about itself in `initialize`.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub client_info: Implementation,
    pub capabilities: ClientCapabilities,
    pub protocol_version: String,
}

/// Per-session negotiation record. Written exactly once.
#[derive(Debug, Default)]
pub struct Negotiation {
    peer: OnceLock<Arc<PeerInfo>>,
    initialized: OnceLock<()>,
}

impl Negotiation {
    pub fn negotiate(
        &self,
        params: InitializeParams,
        server_info: &Implementation,
        capabilities: &CapabilitySet,
        instructions: Option<String>,
    ) -> McpResult<InitializeResult> {
        if params.protocol_version != MCP_VERSION {
            tracing::warn!(
                "Client requested protocol version {}, server supports {}. Proceeding with server version.",
                params.protocol_version,
                MCP_VERSION
            );
        }

        let peer = PeerInfo {
            client_info: params.client_info,
            capabilities: params.capabilities,
            protocol_version: params.protocol_version,
        };
        tracing::info!(
            "Initialized with client: {} v{} (sampling: {}, roots: {})",
            peer.client_info.name,
            peer.client_info.version,
            peer.capabilities.sampling.is_some(),
            peer.capabilities.roots.is_some()
        );

        self.peer
            .set(Arc::new(peer))
            .map_err(|_| McpError::InvalidRequest("initialize received twice".to_string()))?;

        Ok(InitializeResult::new(
            server_info.clone(),
            capabilities,
            instructions,
        ))
    }

    pub fn peer(&self) -> Option<Arc<PeerInfo>> {
        self.peer.get().cloned()
    }

    pub fn mark_initialized(&self) {
        if self.initialized.set(()).is_ok() {
            tracing::info!("MCP handshake complete");
        } else {
            tracing::debug!("Duplicate initialized notification ignored");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get().is_some()
    }
}
