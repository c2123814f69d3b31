//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the
//! [`EmbeddingProvider`] trait. Ollama has no notion of task types, so the
//! query/document asymmetry is expressed with the input prefixes that
//! retrieval-tuned models such as `nomic-embed-text` are trained on.

use super::types::*;
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new Ollama provider with the specified config.
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            http_client: reqwest::Client::new(),
        }
    }
}

fn prefixed(text: &str, mode: EmbedMode) -> String {
    match mode {
        EmbedMode::Query => format!("search_query: {text}"),
        EmbedMode::Document => format!("search_document: {text}"),
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        debug!(provider = "ollama", batch_size = texts.len(), %mode, "embedding batch");

        let embed_request = EmbedRequest {
            model: self.model.clone(),
            input: texts.iter().map(|text| prefixed(text, mode)).collect(),
        };

        let response = self.http_client.post(&url).json(&embed_request).send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let embed_response = response.json::<EmbedResponse>().await?;
        Ok(embed_response.embeddings)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}
