//! The `search_knowledge_base` tool the voice agent calls for grounding.

use crate::rag::{ContextCache, Retrieval, RetrieveOptions, Retriever, Source};
use async_trait::async_trait;
use ragline_tool::{Tool, ToolError, ToolOutput};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const TOOL_NAME: &str = "search_knowledge_base";

/// Returned to the agent when the search succeeded but nothing matched.
pub const NO_MATCH_REPLY: &str = "No specific information found in the knowledge base for this query.";

/// Written to the context cache on a no-match retrieval.
pub const NO_MATCH_CONTEXT: &str = "No specific information found.";

/// Returned to the agent when retrieval is degraded.
pub const UNAVAILABLE_REPLY: &str =
    "I encountered an issue searching the knowledge base. Let me try to help you with what I know.";

const DESCRIPTION: &str = "Search the company knowledge base to find accurate information. \
ALWAYS use this tool when the customer asks about: \
- Company information, services, or products \
- Pricing, plans, or packages \
- Features or capabilities \
- FAQs or common questions \
- Contact information or support \
- Any factual question about the company. \
The tool returns relevant information from the company documentation.";

/// Answers agent queries from the knowledge base and records what it found.
pub struct KnowledgeBaseTool {
    retriever: Retriever,
    cache: Arc<ContextCache>,
}

impl KnowledgeBaseTool {
    pub fn new(retriever: Retriever, cache: Arc<ContextCache>) -> Self {
        Self { retriever, cache }
    }

    /// Runs one search and turns the outcome into the agent's reply.
    ///
    /// Always answers; a degraded search leaves the cache untouched.
    pub async fn search(&self, query: &str) -> String {
        self.answer(query).await.content
    }

    /// The reply plus, when context was found, the ranked sources behind it
    /// under `metadata.sources`.
    async fn answer(&self, query: &str) -> ToolOutput {
        info!(query, "searching knowledge base");
        let options = RetrieveOptions::default().include_metadata(false);

        match self.retriever.retrieve(query, &options).await {
            Retrieval::Context { context, results } => {
                self.cache.record(query, &context).await;
                let sources: Vec<Source> = results.iter().map(Source::from).collect();
                ToolOutput::new(context).with_metadata(json!({ "sources": sources }))
            }
            Retrieval::NoMatch => {
                self.cache.record(query, NO_MATCH_CONTEXT).await;
                ToolOutput::new(NO_MATCH_REPLY)
            }
            Retrieval::Unavailable { reason } => {
                warn!(query, reason = %reason, "knowledge base unavailable to agent");
                ToolOutput::new(UNAVAILABLE_REPLY)
            }
        }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameter_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant information"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> ragline_tool::Result<ToolOutput> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidInput("'query' must be a non-empty string".to_string()))?;

        Ok(self.answer(query).await)
    }
}
