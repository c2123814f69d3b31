//! One-shot ingestion: recreate, chunk, embed, upsert.
//!
//! A run starts from an empty collection and is not resumable. Transient
//! provider and storage errors are retried per batch with exponential
//! backoff; anything that still fails aborts the run and reports how far it
//! got. Re-running from a fresh collection is the recovery path.

use super::chunker::{decode_text, Chunker};
use super::embedder::Embedder;
use super::store::VectorIndex;
use super::types::{Embedding, IndexedPoint};
use super::{RagError, Result};
use crate::config::RetryConfig;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Exact counts produced by each stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub chunks_created: usize,
    pub vectors_embedded: usize,
    pub vectors_indexed: usize,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chunks created, {} vectors embedded, {} vectors indexed",
            self.chunks_created, self.vectors_embedded, self.vectors_indexed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Recreate,
    Chunk,
    Embed,
    Upsert,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Recreate => "recreate",
            IngestStage::Chunk => "chunk",
            IngestStage::Embed => "embed",
            IngestStage::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

/// A failed run, with the counts reached before the failure.
#[derive(Debug, Error)]
#[error("ingestion failed at {stage} stage after {progress}: {source}")]
pub struct IngestError {
    pub stage: IngestStage,
    pub progress: IngestSummary,
    pub source: RagError,
}

/// Populates a collection from a knowledge-base document.
#[derive(Clone)]
pub struct Ingestor {
    chunker: Chunker,
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    retry: RetryConfig,
    upsert_batch_size: usize,
}

impl Ingestor {
    pub fn new(
        chunker: Chunker,
        embedder: Embedder,
        index: Arc<dyn VectorIndex>,
        retry: RetryConfig,
        upsert_batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            retry,
            upsert_batch_size: upsert_batch_size.max(1),
        }
    }

    /// Ingests raw document bytes, rejecting non-text input before the
    /// collection is touched.
    pub async fn ingest_bytes(&self, bytes: &[u8], source: &str) -> std::result::Result<IngestSummary, IngestError> {
        let text = decode_text(bytes, source).map_err(|e| IngestError {
            stage: IngestStage::Chunk,
            progress: IngestSummary::default(),
            source: e,
        })?;
        self.ingest(text, source).await
    }

    /// Replaces the collection's contents with the chunks of `text`.
    pub async fn ingest(&self, text: &str, source: &str) -> std::result::Result<IngestSummary, IngestError> {
        let mut progress = IngestSummary::default();
        let fail = |stage, progress, source| IngestError { stage, progress, source };

        with_retry(&self.retry, "recreate collection", || self.index.recreate_collection())
            .await
            .map_err(|e| fail(IngestStage::Recreate, progress, e))?;

        let chunks = self.chunker.chunk_document(text, source);
        progress.chunks_created = chunks.len();
        info!(source, chunks = chunks.len(), collection = self.index.collection_name(), "chunked document");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embedded = self.embed_all(&texts, &mut progress).await;
        let embeddings = embedded.map_err(|e| fail(IngestStage::Embed, progress, e))?;

        let points: Vec<IndexedPoint> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedPoint::from_chunk(chunk, embedding))
            .collect();

        for batch in points.chunks(self.upsert_batch_size) {
            let written = with_retry(&self.retry, "upsert batch", || self.index.upsert(batch))
                .await
                .map_err(|e| fail(IngestStage::Upsert, progress, e))?;
            progress.vectors_indexed += written;
        }

        info!(
            source,
            chunks_created = progress.chunks_created,
            vectors_embedded = progress.vectors_embedded,
            vectors_indexed = progress.vectors_indexed,
            "ingestion complete"
        );
        Ok(progress)
    }

    /// Embeds texts in provider-sized batches with bounded parallelism,
    /// counting completed vectors into `progress` as batches land.
    async fn embed_all(&self, texts: &[&str], progress: &mut IngestSummary) -> Result<Vec<Embedding>> {
        let mut batches = stream::iter(texts.chunks(self.embedder.batch_size()))
            .map(|batch| with_retry(&self.retry, "embed batch", move || self.embedder.embed_documents(batch)))
            .buffered(self.embedder.concurrency());

        let mut embeddings = Vec::with_capacity(texts.len());
        while let Some(batch) = batches.next().await {
            let batch = batch?;
            progress.vectors_embedded += batch.len();
            embeddings.extend(batch);
        }
        Ok(embeddings)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or uses
/// up `policy.max_attempts`. The delay starts at `backoff_ms` and doubles.
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(policy.backoff_ms);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(attempt, max_attempts = policy.max_attempts, error = %e, "{what} failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
