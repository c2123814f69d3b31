use super::types::{QueryResponse, QueryResult, Request, Response, StatsConfig, StatsResponse};
use crate::rag::{format_context, RagEngine, RetrieveOptions};
use crate::tool::KnowledgeBaseTool;
use ragline_tool::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Longest query accepted, in characters.
pub const MAX_QUERY_CHARS: usize = 1000;

/// Largest `top_k` a query request may ask for.
pub const MAX_TOP_K: usize = 10;

/// Routes each request to the engine or the tool registry.
pub struct RequestHandler {
    engine: RagEngine,
    tools: ToolRegistry,
}

impl RequestHandler {
    /// Creates a handler with the knowledge-base tool registered.
    pub fn new(engine: RagEngine) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(KnowledgeBaseTool::new(
            engine.retriever().clone(),
            engine.cache().clone(),
        )));
        Self { engine, tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Query { query, top_k } => self.handle_query(query, top_k).await,
            Request::Stats => self.handle_stats().await,
            Request::Context => Response::Context(self.engine.cache().snapshot().await),
            Request::Tool { name, arguments } => self.handle_tool(name, arguments).await,
        }
    }

    async fn handle_query(&self, query: String, top_k: Option<usize>) -> Response {
        if let Err(message) = validate_query(&query, top_k) {
            return Response::error(message);
        }

        let started = Instant::now();
        let options = RetrieveOptions {
            top_k,
            ..RetrieveOptions::default()
        };

        match self.engine.retriever().retrieve_results(&query, &options).await {
            Ok(results) => {
                let context = format_context(&results, self.engine.config().rag.include_metadata);
                let retrieval_time_ms = started.elapsed().as_secs_f64() * 1000.0;
                debug!(results = results.len(), retrieval_time_ms, "query served");
                Response::Query(QueryResponse {
                    query,
                    results: results.into_iter().map(QueryResult::from).collect(),
                    context,
                    retrieval_time_ms: (retrieval_time_ms * 100.0).round() / 100.0,
                })
            }
            Err(e) => {
                error!(error = %e, "query failed");
                Response::error(format!("query failed: {e}"))
            }
        }
    }

    async fn handle_stats(&self) -> Response {
        let config = self.engine.config();
        match self.engine.index().stats().await {
            Ok(collection) => Response::Stats(StatsResponse {
                collection,
                config: StatsConfig {
                    embedding_model: config.embedding.model.clone(),
                    embedding_dimension: config.embedding.dimension,
                    chunk_size: config.rag.chunk_size,
                    chunk_overlap: config.rag.chunk_overlap,
                    top_k: config.rag.top_k,
                    score_threshold: config.rag.score_threshold,
                },
            }),
            Err(e) => {
                error!(error = %e, "stats failed");
                Response::error(format!("failed to get stats: {e}"))
            }
        }
    }

    async fn handle_tool(&self, name: String, arguments: Value) -> Response {
        match self.tools.execute(&name, arguments).await {
            Ok(output) => Response::Tool {
                name,
                content: output.content,
                metadata: output.metadata,
            },
            Err(e) => Response::error(e.to_string()),
        }
    }
}

fn validate_query(query: &str, top_k: Option<usize>) -> Result<(), String> {
    let chars = query.chars().count();
    if chars == 0 || chars > MAX_QUERY_CHARS {
        return Err(format!("query must be 1 to {MAX_QUERY_CHARS} characters, got {chars}"));
    }
    if let Some(k) = top_k {
        if !(1..=MAX_TOP_K).contains(&k) {
            return Err(format!("top_k must be between 1 and {MAX_TOP_K}, got {k}"));
        }
    }
    Ok(())
}
