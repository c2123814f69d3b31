//! Wire types: one JSON object per line in each direction.

use crate::rag::{IndexStats, RagContext, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Raw ranked results plus the formatted context.
    Query {
        query: String,
        #[serde(default)]
        top_k: Option<usize>,
    },
    /// Collection and configuration summary.
    Stats,
    /// The most recent context retrieved for the agent.
    Context,
    /// Invokes a registered tool as the agent would.
    Tool {
        name: String,
        #[serde(default)]
        arguments: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Query(QueryResponse),
    Stats(StatsResponse),
    Context(RagContext),
    Tool {
        name: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<QueryResult>,
    pub context: String,
    pub retrieval_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub text: String,
    pub score: f32,
    pub header: String,
    pub source: String,
}

impl From<SearchResult> for QueryResult {
    fn from(result: SearchResult) -> Self {
        Self {
            text: result.text,
            score: result.score,
            header: result.metadata.header,
            source: result.metadata.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub collection: IndexStats,
    pub config: StatsConfig,
}

/// The configuration values that shape retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsConfig {
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub score_threshold: f32,
}
