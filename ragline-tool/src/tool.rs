use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// What a tool hands back to the agent.
///
/// The agent only reads `content`; `metadata` carries structured detail for
/// other callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content)
    }
}

/// A capability exposed to the conversational agent.
///
/// From the agent's side a call is plain request/response: arguments in,
/// text out. Implementations must return within the turn's latency budget,
/// so anything that can stall should carry its own timeout.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the agent calls the tool by.
    fn name(&self) -> &str;

    /// Tells the agent's model when the tool is worth calling.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameter_schema(&self) -> Value;

    async fn execute(&self, arguments: Value) -> Result<ToolOutput>;
}
