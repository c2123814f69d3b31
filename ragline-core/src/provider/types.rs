//! Common types for embedding providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when interacting with a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Expected {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("No API key configured for {0}")]
    MissingApiKey(&'static str),

    #[error("Provider error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Which side of the retrieval the text is on.
///
/// Embedding models used for retrieval are asymmetric: a question and the
/// passage that answers it are embedded differently. Query vectors are only
/// ever compared against document vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    Query,
    Document,
}

impl fmt::Display for EmbedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedMode::Query => write!(f, "query"),
            EmbedMode::Document => write!(f, "document"),
        }
    }
}

/// Provider trait for embedding backends.
///
/// Implementations turn a batch of texts into raw vectors. Validation of
/// input text and output dimension is done by [`crate::rag::Embedder`], so
/// providers only translate to and from their wire format.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text in `texts` using `mode`, returning vectors in input order.
    async fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>>;

    /// Model identifier sent to the provider.
    fn model(&self) -> &str;
}

/// Maps a non-success HTTP response to [`ProviderError::Api`].
pub(crate) async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    ProviderError::Api { status, message }
}
