//! Function tools the voice agent can call during a conversation.
//!
//! A [`Tool`] is a named capability with a JSON parameter schema. The host
//! agent framework discovers tools through [`ToolRegistry::declarations`]
//! and invokes them by name with JSON arguments.

mod registry;
mod tool;

pub use registry::ToolRegistry;
pub use tool::{Result, Tool, ToolError, ToolOutput};
