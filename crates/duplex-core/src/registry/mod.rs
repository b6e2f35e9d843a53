//! Operation registries: tools, resources, prompts.

pub mod handler;
pub mod prompts;
pub mod resources;
pub mod store;
pub mod tools;

pub use handler::{Handler, HandlerMode, Outcome};
pub use prompts::{PromptHandler, PromptRegistry};
pub use resources::{ResourceHandler, ResourceRegistry};
pub use store::{Descriptor, Registration, Registry};
pub use tools::{ToolHandler, ToolRegistry};

/// The three independent registries owned by a session.
#[derive(Default)]
pub struct Registries {
    pub tools: ToolRegistry,
    pub resources: ResourceRegistry,
    pub prompts: PromptRegistry,
}
