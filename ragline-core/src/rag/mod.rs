//! Retrieval Augmented Generation (RAG) pipeline for the voice agent.
//!
//! A knowledge-base document is ingested offline and queried live while a
//! conversation is in progress.
//!
//! # Architecture
//!
//! - [`Chunker`]: splits markdown into overlapping, header-aware chunks
//! - [`Embedder`]: validates and batches calls to an embedding provider
//! - [`VectorIndex`]: cosine-similarity index over one collection
//!   ([`MemoryIndex`] in process, [`QdrantIndex`] over gRPC)
//! - [`Ingestor`]: recreate, chunk, embed and upsert, with retries
//! - [`Retriever`]: embeds a query, searches and formats context
//! - [`ContextCache`]: the most recent retrieval, for UI polling
//!
//! [`RagEngine`] builds all of these from a [`Config`] and shares one index
//! between ingestion and retrieval.
//!
//! # Failure posture
//!
//! Ingestion treats any error as fatal to the run and reports how far it
//! got. Retrieval never fails: a provider or storage outage degrades to
//! [`Retrieval::Unavailable`] so the conversation can continue ungrounded.

mod chunker;
mod context;
mod embedder;
mod ingest;
mod memory_store;
mod qdrant_store;
mod retriever;
mod store;
mod types;

pub use chunker::Chunker;
pub use context::{ContextCache, RagContext};
pub use embedder::Embedder;
pub use ingest::{IngestError, IngestStage, IngestSummary, Ingestor};
pub use memory_store::MemoryIndex;
pub use qdrant_store::QdrantIndex;
pub use retriever::{format_context, Retrieval, RetrieveOptions, Retriever, CONTEXT_DELIMITER, NO_CONTEXT};
pub use store::{cosine_similarity, create_vector_index, IndexStats, StorageError, VectorIndex};
pub use types::{Chunk, ChunkMetadata, Embedding, IndexedPoint, SearchResult, Source};

use crate::config::Config;
use crate::provider::{create_provider, EmbeddingProvider, ProviderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Vector index error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RagError {
    /// Whether retrying the same call may succeed.
    ///
    /// Provider and storage failures are transient, except a missing
    /// collection, which only ingestion can fix. Invalid input and
    /// configuration are caller bugs.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::Storage(StorageError::MissingCollection(_)) => false,
            RagError::Provider(_) | RagError::Storage(_) => true,
            RagError::InvalidInput(_) | RagError::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

/// The assembled pipeline.
///
/// Cloning is cheap: clones share the index connection and the context cache.
#[derive(Clone)]
pub struct RagEngine {
    config: Config,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    ingestor: Ingestor,
    cache: Arc<ContextCache>,
}

impl RagEngine {
    /// Validates `config` and builds the provider and index it selects.
    ///
    /// No network call is made here; the vector database connection is
    /// opened on first use.
    pub fn new(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let index = create_vector_index(&config.storage, config.embedding.dimension);
        Self::with_components(config, provider, index)
    }

    /// Builds the pipeline around an existing provider and index.
    pub fn with_components(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        config.validate().map_err(|e| RagError::Config(e.to_string()))?;

        let embedder = Embedder::new(provider, &config.embedding);
        let retriever = Retriever::new(embedder.clone(), index.clone(), &config.rag);
        let ingestor = Ingestor::new(
            Chunker::from_config(&config.rag),
            embedder,
            index.clone(),
            config.retry.clone(),
            config.storage.upsert_batch_size,
        );

        info!(
            provider = ?config.embedding.provider,
            model = %config.embedding.model,
            dimension = config.embedding.dimension,
            collection = index.collection_name(),
            "rag engine ready"
        );

        Ok(Self {
            config: config.clone(),
            index,
            retriever,
            ingestor,
            cache: Arc::new(ContextCache::new()),
        })
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageMode;
    use crate::provider::EmbedMode;
    use async_trait::async_trait;

    struct ConstantProvider;

    #[async_trait]
    impl EmbeddingProvider for ConstantProvider {
        async fn embed_batch(&self, texts: &[&str], _mode: EmbedMode) -> crate::provider::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect())
        }

        fn model(&self) -> &str {
            "constant"
        }
    }

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.embedding.dimension = 2;
        config.storage.storage_mode = StorageMode::Memory;
        config
    }

    #[test]
    fn test_transient_classification() {
        assert!(RagError::Provider(ProviderError::Other("x".to_string())).is_transient());
        assert!(RagError::Storage(StorageError::Other("x".to_string())).is_transient());
        assert!(!RagError::Storage(StorageError::MissingCollection("kb".to_string())).is_transient());
        assert!(!RagError::InvalidInput("x".to_string()).is_transient());
        assert!(!RagError::Config("x".to_string()).is_transient());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = memory_config();
        config.rag.chunk_overlap = config.rag.chunk_size;
        let index = create_vector_index(&config.storage, 2);
        let result = RagEngine::with_components(&config, Arc::new(ConstantProvider), index);
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_engine_shares_index_between_ingest_and_retrieve() {
        let config = memory_config();
        let index = create_vector_index(&config.storage, 2);
        let engine = RagEngine::with_components(&config, Arc::new(ConstantProvider), index).unwrap();

        let summary = engine
            .ingestor()
            .ingest("# Hours\nWe are open nine to five on weekdays.", "kb")
            .await
            .unwrap();
        assert_eq!(summary.vectors_indexed, 1);
        assert_eq!(engine.index().stats().await.unwrap().points_count, 1);

        let context = engine
            .retriever()
            .retrieve_context("when are you open", &RetrieveOptions::default())
            .await;
        assert!(context.contains("nine to five"));
    }
}
