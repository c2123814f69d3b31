//! Gemini embedding provider.
//!
//! Talks to the Generative Language REST API. Query and document modes map to
//! the `RETRIEVAL_QUERY` and `RETRIEVAL_DOCUMENT` task types.

use super::types::*;
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini HTTP API provider.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    http_client: reqwest::Client,
}

impl GeminiProvider {
    /// Creates a provider from the embedding config. An API key is required.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey("gemini"))?;

        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model,
            dimension: config.dimension,
            http_client: reqwest::Client::new(),
        })
    }

    fn request_body<'a>(&'a self, texts: &[&'a str], mode: EmbedMode) -> BatchEmbedRequest<'a> {
        let task_type = match mode {
            EmbedMode::Query => "RETRIEVAL_QUERY",
            EmbedMode::Document => "RETRIEVAL_DOCUMENT",
        };

        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|&text| EmbedContentRequest {
                    model: &self.model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type,
                    output_dimensionality: self.dimension,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1beta/{}:batchEmbedContents", self.base_url, self.model);
        debug!(provider = "gemini", batch_size = texts.len(), %mode, "embedding batch");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(texts, mode))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = response.json::<BatchEmbedResponse>().await?;
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Gemini-specific request/response types (internal)

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}
