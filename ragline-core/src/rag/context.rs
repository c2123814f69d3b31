//! Most recent retrieval, kept for UI polling.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// The last context handed to the voice agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagContext {
    pub query: String,
    pub context: String,
    /// RFC 3339 time of the retrieval; `None` before the first one.
    pub timestamp: Option<String>,
    pub has_context: bool,
}

/// Holds a single [`RagContext`], overwritten on every record.
///
/// Shared by `Arc` between the knowledge-base tool that writes it and the
/// request server that reads it.
#[derive(Debug, Default)]
pub struct ContextCache {
    last: RwLock<RagContext>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached value with `query` and `context`, stamped now.
    pub async fn record(&self, query: &str, context: &str) {
        let entry = RagContext {
            query: query.to_string(),
            context: context.to_string(),
            timestamp: Some(Utc::now().to_rfc3339()),
            has_context: !context.is_empty(),
        };
        *self.last.write().await = entry;
    }

    /// A copy of the cached value; empty before the first record.
    pub async fn snapshot(&self) -> RagContext {
        self.last.read().await.clone()
    }
}
