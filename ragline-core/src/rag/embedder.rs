//! Embedding generation on top of an [`EmbeddingProvider`].
//!
//! The embedder owns the checks every provider needs: empty input is
//! rejected before any network call, each call is bounded by a timeout, and
//! every returned vector must have the configured dimension. Batch requests
//! are split into mode-homogeneous provider calls that run with bounded
//! parallelism.

use super::types::Embedding;
use super::{RagError, Result};
use crate::config::EmbeddingConfig;
use crate::provider::{EmbedMode, EmbeddingProvider, ProviderError};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Converts text into fixed-dimension vectors.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Overrides the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidInput`] for empty or whitespace-only text, and
    /// [`RagError::Provider`] when the provider fails, times out or returns
    /// a vector of the wrong dimension.
    pub async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Embedding> {
        validate_text(text)?;
        let mut vectors = self.call(vec![text], mode).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Provider(ProviderError::Other("provider returned no embedding".into())))
    }

    /// Embeds many texts, returning vectors in input order.
    ///
    /// Consecutive inputs sharing a mode are grouped into provider calls of at
    /// most `batch_size` texts, with at most `concurrency` calls in flight.
    /// The first failure aborts the whole request.
    pub async fn embed_many(&self, inputs: &[(&str, EmbedMode)]) -> Result<Vec<Embedding>> {
        for (text, _) in inputs {
            validate_text(text)?;
        }

        let batches = self.batches(inputs);
        debug!(texts = inputs.len(), batches = batches.len(), "embedding texts");

        let results: Vec<Vec<Embedding>> = stream::iter(batches)
            .map(|(texts, mode)| self.call(texts, mode))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(results.into_iter().flatten().collect())
    }

    /// Embeds chunk texts in document mode.
    pub async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let inputs: Vec<(&str, EmbedMode)> = texts.iter().map(|&t| (t, EmbedMode::Document)).collect();
        self.embed_many(&inputs).await
    }

    fn batches<'a>(&self, inputs: &[(&'a str, EmbedMode)]) -> Vec<(Vec<&'a str>, EmbedMode)> {
        let mut batches: Vec<(Vec<&'a str>, EmbedMode)> = Vec::new();
        for &(text, mode) in inputs {
            match batches.last_mut() {
                Some((texts, batch_mode)) if *batch_mode == mode && texts.len() < self.batch_size => {
                    texts.push(text);
                }
                _ => batches.push((vec![text], mode)),
            }
        }
        batches
    }

    async fn call(&self, texts: Vec<&str>, mode: EmbedMode) -> Result<Vec<Embedding>> {
        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(&texts, mode))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        if vectors.len() != texts.len() {
            return Err(RagError::Provider(ProviderError::Other(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))));
        }

        vectors
            .into_iter()
            .map(|values| {
                if values.len() != self.dimension {
                    return Err(RagError::Provider(ProviderError::Dimension {
                        expected: self.dimension,
                        actual: values.len(),
                    }));
                }
                Ok(Embedding::new(values, mode))
            })
            .collect()
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::InvalidInput("cannot embed empty text".into()));
    }
    Ok(())
}
