//! Query-time retrieval: embed, search, filter and format.
//!
//! Grounding is best effort. [`Retriever::retrieve`] never fails: provider
//! and storage errors, including timeouts, become
//! [`Retrieval::Unavailable`], which callers can tell apart from a legitimate
//! [`Retrieval::NoMatch`] even though both render as [`NO_CONTEXT`].

use super::embedder::Embedder;
use super::store::{StorageError, VectorIndex};
use super::types::{SearchResult, Source};
use super::{RagError, Result};
use crate::config::RagConfig;
use crate::provider::{EmbedMode, ProviderError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Context string returned when there is nothing to ground on.
pub const NO_CONTEXT: &str = "";

/// Separator placed between passages in an assembled context.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Per-call overrides. `None` falls back to the retriever's configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveOptions {
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    pub include_metadata: Option<bool>,
}

impl RetrieveOptions {
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn score_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = Some(score_threshold);
        self
    }

    pub fn include_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = Some(include_metadata);
        self
    }
}

/// Outcome of a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// At least one passage passed the threshold.
    Context { context: String, results: Vec<SearchResult> },
    /// The search succeeded and nothing passed the threshold.
    NoMatch,
    /// Embedding or search failed; the conversation should carry on without grounding.
    Unavailable { reason: String },
}

impl Retrieval {
    /// The assembled context, or [`NO_CONTEXT`].
    pub fn context(&self) -> &str {
        match self {
            Retrieval::Context { context, .. } => context,
            Retrieval::NoMatch | Retrieval::Unavailable { .. } => NO_CONTEXT,
        }
    }

    /// Ranked source descriptors, empty unless context was found.
    pub fn sources(&self) -> Vec<Source> {
        match self {
            Retrieval::Context { results, .. } => results.iter().map(Source::from).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Retrieval::Unavailable { .. })
    }
}

/// Joins passages in rank order, optionally prefixed with their section header.
pub fn format_context(results: &[SearchResult], include_metadata: bool) -> String {
    results
        .iter()
        .map(|result| {
            if include_metadata && !result.metadata.header.is_empty() {
                format!("[{}] {}", result.metadata.header, result.text)
            } else {
                result.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Stateless orchestrator over an [`Embedder`] and a [`VectorIndex`].
///
/// Cloning is cheap; clones share the index and its connection.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    score_threshold: f32,
    include_metadata: bool,
    timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Embedder, index: Arc<dyn VectorIndex>, config: &RagConfig) -> Self {
        Self {
            embedder,
            index,
            top_k: config.top_k,
            score_threshold: config.score_threshold,
            include_metadata: config.include_metadata,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    /// Embeds the query and searches the index, propagating any error.
    ///
    /// Both calls are bounded by the configured timeout; an elapsed timeout
    /// surfaces as the provider or storage error of the call that stalled.
    pub async fn retrieve_results(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<SearchResult>> {
        let top_k = options.top_k.unwrap_or(self.top_k);
        let score_threshold = options.score_threshold.unwrap_or(self.score_threshold);

        let embedding = timeout(self.timeout, self.embedder.embed(query, EmbedMode::Query))
            .await
            .map_err(|_| RagError::Provider(ProviderError::Timeout(self.timeout)))??;

        debug!(top_k, score_threshold, "searching knowledge base");
        let results = timeout(self.timeout, self.index.search(&embedding, top_k, score_threshold))
            .await
            .map_err(|_| RagError::Storage(StorageError::Timeout(self.timeout)))??;

        Ok(results)
    }

    /// Retrieves and formats context for `query`. Never fails.
    pub async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Retrieval {
        let started = Instant::now();
        let include_metadata = options.include_metadata.unwrap_or(self.include_metadata);

        match self.retrieve_results(query, options).await {
            Ok(results) if results.is_empty() => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "no relevant context found");
                Retrieval::NoMatch
            }
            Ok(results) => {
                let context = format_context(&results, include_metadata);
                info!(
                    results = results.len(),
                    chars = context.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "retrieved context"
                );
                Retrieval::Context { context, results }
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "knowledge base retrieval degraded");
                Retrieval::Unavailable { reason: e.to_string() }
            }
        }
    }

    /// The context string alone; [`NO_CONTEXT`] on no match or failure.
    pub async fn retrieve_context(&self, query: &str, options: &RetrieveOptions) -> String {
        self.retrieve(query, options).await.context().to_string()
    }

    /// The context string and its ranked sources.
    pub async fn retrieve_with_sources(&self, query: &str, options: &RetrieveOptions) -> (String, Vec<Source>) {
        let retrieval = self.retrieve(query, options).await;
        (retrieval.context().to_string(), retrieval.sources())
    }
}
