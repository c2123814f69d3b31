//! Embedding provider abstraction layer.
//!
//! This module defines a common interface for the external services that turn
//! text into vectors (Gemini, Ollama), and a factory selecting one from config.

mod types;
pub mod gemini;
pub mod ollama;

// Re-export common types
pub use types::{EmbedMode, EmbeddingProvider, ProviderError, Result};

// Re-export provider implementations
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

use crate::config::{EmbeddingConfig, ProviderKind};
use std::sync::Arc;

/// Creates the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(config)?)),
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(config))),
    }
}
