//! Vector index abstraction and factory.
//!
//! This module provides a unified interface over the in-process index used
//! for tests and local runs and the Qdrant service used in production.

use super::memory_store::MemoryIndex;
use super::qdrant_store::QdrantIndex;
use super::types::{Embedding, IndexedPoint, SearchResult};
use super::{RagError, Result};
use crate::config::{StorageConfig, StorageMode};
use crate::provider::EmbedMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a vector index backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Vector index call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Collection '{0}' does not exist")]
    MissingCollection(String),

    #[error("Storage error: {0}")]
    Other(String),
}

/// Collection summary reported by [`VectorIndex::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub collection: String,
    pub exists: bool,
    pub points_count: u64,
    /// Backend status, `not_found` when the collection is missing.
    pub status: String,
    pub dimension: usize,
}

/// Unified interface for vector index operations.
///
/// An index serves a single named collection. Only ingestion mutates it;
/// queries only call [`search`](VectorIndex::search).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Name of the collection this index serves.
    fn collection_name(&self) -> &str;

    /// Inserts points, replacing any stored point with the same id.
    ///
    /// Returns the number of points written. Every embedding must be a
    /// document-mode vector of the collection's dimension.
    async fn upsert(&self, points: &[IndexedPoint]) -> Result<usize>;

    /// Searches for the points most similar to a query-mode vector.
    ///
    /// Results are sorted by descending cosine similarity, include only
    /// scores `>= score_threshold`, and hold at most `limit` entries. Equal
    /// scores keep insertion order.
    async fn search(&self, query: &Embedding, limit: usize, score_threshold: f32) -> Result<Vec<SearchResult>>;

    /// Drops the collection if present and creates it empty.
    async fn recreate_collection(&self) -> Result<()>;

    /// Removes every point from the collection.
    async fn clear(&self) -> Result<()>;

    async fn collection_exists(&self) -> Result<bool>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Creates the index selected by the storage mode.
///
/// - `Memory` keeps points in process and loses them on exit
/// - `Grpc` talks to a Qdrant server; the connection is opened on first use
pub fn create_vector_index(config: &StorageConfig, dimension: usize) -> Arc<dyn VectorIndex> {
    let collection = config.vector_db.collection_name.clone();
    match &config.storage_mode {
        StorageMode::Memory => Arc::new(MemoryIndex::new(collection, dimension)),
        StorageMode::Grpc { url, api_key } => {
            Arc::new(QdrantIndex::new(url.clone(), api_key.clone(), collection, dimension))
        }
    }
}

/// Cosine similarity of two vectors; 0.0 if either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn check_query(query: &Embedding, dimension: usize) -> Result<()> {
    if query.mode != EmbedMode::Query {
        return Err(RagError::InvalidInput(format!(
            "search requires a query vector, got a {} vector",
            query.mode
        )));
    }
    check_dimension(query, dimension)
}

pub(crate) fn check_points(points: &[IndexedPoint], dimension: usize) -> Result<()> {
    for point in points {
        if point.embedding.mode != EmbedMode::Document {
            return Err(RagError::InvalidInput(format!(
                "point '{}' holds a {} vector; only document vectors are indexed",
                point.id, point.embedding.mode
            )));
        }
        check_dimension(&point.embedding, dimension)?;
    }
    Ok(())
}

fn check_dimension(embedding: &Embedding, dimension: usize) -> Result<()> {
    if embedding.dimension() != dimension {
        return Err(RagError::InvalidInput(format!(
            "expected a {dimension}-dimensional vector, got {}",
            embedding.dimension()
        )));
    }
    Ok(())
}

/// Applies the threshold, orders by descending score and caps at `limit`.
///
/// The sort is stable, so callers pass results in insertion order to get
/// the tie-break.
pub(crate) fn rank(mut results: Vec<SearchResult>, limit: usize, score_threshold: f32) -> Vec<SearchResult> {
    results.retain(|r| r.score >= score_threshold);
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    results
}
