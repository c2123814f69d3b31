#![allow(dead_code)]

use async_trait::async_trait;
use ragline_core::config::{Config, StorageMode};
use ragline_core::provider::{EmbedMode, EmbeddingProvider};
use ragline_core::rag::{
    Embedding, IndexStats, IndexedPoint, MemoryIndex, RagEngine, RagError, SearchResult, StorageError,
    VectorIndex,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Words the keyword provider embeds on; one dimension each.
pub const VOCABULARY: &[&str] = &["pricing", "plan", "starter", "support", "refund", "phone", "email", "card"];

pub const DIMENSION: usize = VOCABULARY.len();

/// Deterministic bag-of-words embeddings over [`VOCABULARY`].
///
/// Texts that share no vocabulary word have cosine similarity 0.
#[derive(Default)]
pub struct KeywordProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed_batch(&self, texts: &[&str], _mode: EmbedMode) -> ragline_core::provider::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn model(&self) -> &str {
        "keyword"
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    VOCABULARY.iter().map(|word| text.matches(word).count() as f32).collect()
}

/// An in-memory index whose first `stalls` searches never answer.
pub struct StallingIndex {
    inner: MemoryIndex,
    stalls: AtomicUsize,
}

impl StallingIndex {
    /// Stalls every search.
    pub fn new() -> Self {
        Self::stalling_first(usize::MAX)
    }

    pub fn stalling_first(stalls: usize) -> Self {
        Self {
            inner: MemoryIndex::new("stalling", DIMENSION),
            stalls: AtomicUsize::new(stalls),
        }
    }
}

#[async_trait]
impl VectorIndex for StallingIndex {
    fn collection_name(&self) -> &str {
        self.inner.collection_name()
    }

    async fn upsert(&self, points: &[IndexedPoint]) -> ragline_core::rag::Result<usize> {
        self.inner.upsert(points).await
    }

    async fn search(&self, query: &Embedding, limit: usize, threshold: f32) -> ragline_core::rag::Result<Vec<SearchResult>> {
        let stall = self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(Vec::new());
        }
        self.inner.search(query, limit, threshold).await
    }

    async fn recreate_collection(&self) -> ragline_core::rag::Result<()> {
        self.inner.recreate_collection().await
    }

    async fn clear(&self) -> ragline_core::rag::Result<()> {
        self.inner.clear().await
    }

    async fn collection_exists(&self) -> ragline_core::rag::Result<bool> {
        Ok(true)
    }

    async fn stats(&self) -> ragline_core::rag::Result<IndexStats> {
        self.inner.stats().await
    }
}

/// Fails every call as an unreachable database would.
pub struct UnreachableIndex;

fn unreachable() -> RagError {
    RagError::Storage(StorageError::Qdrant("transport error: connection refused".to_string()))
}

#[async_trait]
impl VectorIndex for UnreachableIndex {
    fn collection_name(&self) -> &str {
        "unreachable"
    }

    async fn upsert(&self, _points: &[IndexedPoint]) -> ragline_core::rag::Result<usize> {
        Err(unreachable())
    }

    async fn search(&self, _query: &Embedding, _limit: usize, _threshold: f32) -> ragline_core::rag::Result<Vec<SearchResult>> {
        Err(unreachable())
    }

    async fn recreate_collection(&self) -> ragline_core::rag::Result<()> {
        Err(unreachable())
    }

    async fn clear(&self) -> ragline_core::rag::Result<()> {
        Err(unreachable())
    }

    async fn collection_exists(&self) -> ragline_core::rag::Result<bool> {
        Err(unreachable())
    }

    async fn stats(&self) -> ragline_core::rag::Result<IndexStats> {
        Err(unreachable())
    }
}

/// Default configuration on an in-memory index sized for [`KeywordProvider`].
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.dimension = DIMENSION;
    config.storage.storage_mode = StorageMode::Memory;
    config.retry.backoff_ms = 10;
    config
}

pub fn engine_with(config: &Config, index: Arc<dyn VectorIndex>) -> RagEngine {
    RagEngine::with_components(config, Arc::new(KeywordProvider::default()), index).unwrap()
}

pub fn memory_engine() -> RagEngine {
    let config = test_config();
    let index = Arc::new(MemoryIndex::new("voara_kb", DIMENSION));
    engine_with(&config, index)
}

/// Three sections; only the last one mentions pricing.
pub fn company_document() -> String {
    format!(
        "## Support\n{}\n## Refunds\n{}\n## Pricing Plans\n{}\n",
        "Our team answers questions by phone and email on weekdays. ".repeat(5),
        "Refunds are issued to the original card within thirty days. ".repeat(5),
        "We offer three plans: Starter, Pro and Enterprise. Starter suits small teams, \
         Pro adds analytics, and Enterprise adds dedicated onboarding."
    )
}

/// 1200 characters in two sections.
pub fn two_section_document() -> String {
    let filler = |chars: usize| -> String { "voice agents answer calls ".chars().cycle().take(chars).collect() };
    format!("# Overview\n{}\n\n{}\n# Pricing\n{}\n", filler(337), filler(349), filler(489))
}
