//! MCP capability and initialization types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{McpError, McpResult};

pub const MCP_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingCapability {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingCapability {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// One optional feature group of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Tools,
    Resources,
    ResourceSubscriptions,
    Prompts,
    Logging,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Tools => "tools",
            Capability::Resources => "resources",
            Capability::ResourceSubscriptions => "resources.subscribe",
            Capability::Prompts => "prompts",
            Capability::Logging => "logging",
        };
        f.write_str(name)
    }
}

/// Enabled / list-changed pair for a registry-backed feature group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub enabled: bool,
    pub list_changed: bool,
}

impl FeatureFlags {
    pub const DISABLED: FeatureFlags = FeatureFlags {
        enabled: false,
        list_changed: false,
    };

    pub fn enabled(list_changed: bool) -> Self {
        Self {
            enabled: true,
            list_changed,
        }
    }
}

/// The server's capability set for one session.
///
/// Fixed once the session is negotiated; see [`crate::session::Session::set_capabilities`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub tools: FeatureFlags,
    pub resources: FeatureFlags,
    pub resource_subscribe: bool,
    pub prompts: FeatureFlags,
    pub logging: bool,
}

impl CapabilitySet {
    pub fn builder() -> CapabilitySetBuilder {
        CapabilitySetBuilder::default()
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::Tools => self.tools.enabled,
            Capability::Resources => self.resources.enabled,
            Capability::ResourceSubscriptions => self.resources.enabled && self.resource_subscribe,
            Capability::Prompts => self.prompts.enabled,
            Capability::Logging => self.logging,
        }
    }

    /// Whether mutations of the given registry emit a list-changed notification.
    pub fn notifies_list_changed(&self, capability: Capability) -> bool {
        match capability {
            Capability::Tools => self.tools.enabled && self.tools.list_changed,
            Capability::Resources => self.resources.enabled && self.resources.list_changed,
            Capability::Prompts => self.prompts.enabled && self.prompts.list_changed,
            Capability::ResourceSubscriptions | Capability::Logging => false,
        }
    }

    /// Fails with `CapabilityDisabled` unless the capability is enabled.
    pub fn require(&self, capability: Capability) -> McpResult<()> {
        if self.is_enabled(capability) {
            Ok(())
        } else {
            Err(McpError::CapabilityDisabled(capability))
        }
    }

    /// Wire form advertised in the `initialize` response.
    pub fn to_server_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            experimental: None,
            logging: self.logging.then_some(LoggingCapability {}),
            prompts: self.prompts.enabled.then_some(PromptsCapability {
                list_changed: self.prompts.list_changed,
            }),
            resources: self.resources.enabled.then_some(ResourcesCapability {
                subscribe: self.resource_subscribe,
                list_changed: self.resources.list_changed,
            }),
            tools: self.tools.enabled.then_some(ToolsCapability {
                list_changed: self.tools.list_changed,
            }),
        }
    }
}

/// Builder mirroring the wire shape: every call enables one feature group.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySetBuilder {
    set: CapabilitySet,
}

impl CapabilitySetBuilder {
    pub fn tools(mut self, list_changed: bool) -> Self {
        self.set.tools = FeatureFlags::enabled(list_changed);
        self
    }

    pub fn resources(mut self, subscribe: bool, list_changed: bool) -> Self {
        self.set.resources = FeatureFlags::enabled(list_changed);
        self.set.resource_subscribe = subscribe;
        self
    }

    pub fn prompts(mut self, list_changed: bool) -> Self {
        self.set.prompts = FeatureFlags::enabled(list_changed);
        self
    }

    pub fn logging(mut self) -> Self {
        self.set.logging = true;
        self
    }

    pub fn build(self) -> CapabilitySet {
        self.set
    }
}

impl InitializeResult {
    pub fn new(
        server_info: Implementation,
        capabilities: &CapabilitySet,
        instructions: Option<String>,
    ) -> Self {
        Self {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: capabilities.to_server_capabilities(),
            server_info,
            instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_only_requested_groups() {
        let caps = CapabilitySet::builder().tools(true).logging().build();
        assert!(caps.is_enabled(Capability::Tools));
        assert!(caps.notifies_list_changed(Capability::Tools));
        assert!(!caps.is_enabled(Capability::Resources));
        assert!(!caps.is_enabled(Capability::Prompts));
        assert!(caps.is_enabled(Capability::Logging));
    }

    #[test]
    fn test_disabled_group_is_absent_on_the_wire() {
        let caps = CapabilitySet::builder().resources(true, false).build();
        let wire = serde_json::to_value(caps.to_server_capabilities()).unwrap();
        assert!(wire.get("tools").is_none());
        assert!(wire.get("logging").is_none());
        assert_eq!(wire["resources"]["subscribe"], true);
        assert_eq!(wire["resources"]["listChanged"], false);
    }

    #[test]
    fn test_require_reports_the_missing_capability() {
        let caps = CapabilitySet::builder().tools(false).build();
        assert!(caps.require(Capability::Tools).is_ok());
        let err = caps.require(Capability::Prompts).unwrap_err();
        assert!(matches!(err, McpError::CapabilityDisabled(Capability::Prompts)));
    }

    #[test]
    fn test_subscribe_requires_resources_enabled() {
        let mut caps = CapabilitySet::default();
        caps.resource_subscribe = true;
        assert!(!caps.is_enabled(Capability::ResourceSubscriptions));
    }

    #[test]
    fn test_client_roots_list_changed_is_camel_case() {
        let caps: ClientCapabilities =
            serde_json::from_str(r#"{"roots": {"listChanged": true}, "sampling": {}}"#).unwrap();
        assert!(caps.roots.unwrap().list_changed);
        assert!(caps.sampling.is_some());
    }
}
