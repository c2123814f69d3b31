//! Qdrant vector database storage implementation.
//!
//! Points are written with numeric ids derived from the chunk id, so
//! re-ingesting the same chunk replaces it. The gRPC client is created on
//! first use and shared by every later call, including calls that are
//! cancelled mid-flight.

use super::store::{check_points, check_query, rank, IndexStats, StorageError, VectorIndex};
use super::types::{ChunkMetadata, Embedding, IndexedPoint, SearchResult};
use super::{RagError, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CollectionStatus, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Qdrant-backed index for a single collection.
pub struct QdrantIndex {
    url: String,
    api_key: Option<String>,
    collection_name: String,
    dimension: usize,
    client: OnceCell<Arc<Qdrant>>,
}

impl QdrantIndex {
    /// Creates the index without connecting; the client is built on first use.
    pub fn new(url: String, api_key: Option<String>, collection_name: String, dimension: usize) -> Self {
        Self {
            url,
            api_key,
            collection_name,
            dimension,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Arc<Qdrant>> {
        self.client
            .get_or_try_init(|| async {
                info!(url = %self.url, collection = %self.collection_name, "connecting to qdrant");
                let client = Qdrant::from_url(&self.url)
                    .api_key(self.api_key.clone())
                    .build()
                    .map_err(map_err)?;
                Ok::<_, RagError>(Arc::new(client))
            })
            .await
    }

    /// Rechecks the collection after a point operation failed.
    async fn explain(&self, client: &Qdrant, e: QdrantError) -> RagError {
        let exists = client.collection_exists(&self.collection_name).await.ok();
        point_op_err(e, &self.collection_name, exists)
    }

    async fn create_collection(&self, client: &Qdrant) -> Result<()> {
        client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name)
                    .vectors_config(VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(map_err)?;
        debug!(collection = %self.collection_name, dimension = self.dimension, "created qdrant collection");
        Ok(())
    }
}

fn map_err(e: QdrantError) -> RagError {
    RagError::Storage(StorageError::Qdrant(e.to_string()))
}

/// Classifies a failed point operation: a collection confirmed absent becomes
/// [`StorageError::MissingCollection`], anything else stays a Qdrant error.
fn point_op_err(e: QdrantError, collection: &str, exists: Option<bool>) -> RagError {
    match exists {
        Some(false) => RagError::Storage(StorageError::MissingCollection(collection.to_string())),
        _ => map_err(e),
    }
}

/// Stable numeric point id for a chunk id.
fn point_id(chunk_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    chunk_id.hash(&mut hasher);
    hasher.finish()
}

fn payload_for(point: &IndexedPoint) -> Result<Payload> {
    Payload::try_from(json!({
        "chunk_id": point.id,
        "text": point.text,
        "source": point.metadata.source,
        "header": point.metadata.header,
        "level": point.metadata.level,
        "position": point.metadata.position,
    }))
    .map_err(map_err)
}

fn string_field(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn integer_field(payload: &HashMap<String, QdrantValue>, key: &str) -> i64 {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => *n,
        Some(Kind::DoubleValue(n)) => *n as i64,
        _ => 0,
    }
}

fn result_from_payload(payload: &HashMap<String, QdrantValue>, score: f32) -> SearchResult {
    SearchResult {
        id: string_field(payload, "chunk_id"),
        text: string_field(payload, "text"),
        score,
        metadata: ChunkMetadata {
            source: string_field(payload, "source"),
            header: string_field(payload, "header"),
            level: integer_field(payload, "level").clamp(0, u8::MAX as i64) as u8,
            position: integer_field(payload, "position").max(0) as usize,
        },
    }
}

fn status_name(status: i32) -> String {
    CollectionStatus::try_from(status)
        .map(|s| s.as_str_name().to_lowercase())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn upsert(&self, points: &[IndexedPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        check_points(points, self.dimension)?;

        let structs = points
            .iter()
            .map(|point| {
                Ok(PointStruct::new(
                    point_id(&point.id),
                    point.embedding.values.clone(),
                    payload_for(point)?,
                ))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        let client = self.client().await?;
        if let Err(e) = client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, structs).wait(true))
            .await
        {
            return Err(self.explain(client, e).await);
        }

        debug!(collection = %self.collection_name, count = points.len(), "upserted points to qdrant");
        Ok(points.len())
    }

    /// Searches with Qdrant's cosine distance, then orders equal scores by
    /// chunk position.
    async fn search(&self, query: &Embedding, limit: usize, score_threshold: f32) -> Result<Vec<SearchResult>> {
        check_query(query, self.dimension)?;

        let client = self.client().await?;
        let response = match client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query.values.clone(), limit as u64)
                    .with_payload(true)
                    .score_threshold(score_threshold),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(self.explain(client, e).await),
        };

        let mut results: Vec<SearchResult> = response
            .result
            .iter()
            .map(|point| result_from_payload(&point.payload, point.score))
            .collect();
        results.sort_by_key(|r| r.metadata.position);

        Ok(rank(results, limit, score_threshold))
    }

    async fn recreate_collection(&self) -> Result<()> {
        let client = self.client().await?;
        if client.collection_exists(&self.collection_name).await.map_err(map_err)? {
            client.delete_collection(&self.collection_name).await.map_err(map_err)?;
        }
        self.create_collection(client).await
    }

    /// Removes all points by dropping and recreating the collection.
    async fn clear(&self) -> Result<()> {
        self.recreate_collection().await
    }

    async fn collection_exists(&self) -> Result<bool> {
        let client = self.client().await?;
        client.collection_exists(&self.collection_name).await.map_err(map_err)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats {
            collection: self.collection_name.clone(),
            exists: false,
            points_count: 0,
            status: "not_found".to_string(),
            dimension: self.dimension,
        };

        if !self.collection_exists().await? {
            return Ok(stats);
        }

        let client = self.client().await?;
        let info = client.collection_info(&self.collection_name).await.map_err(map_err)?;
        stats.exists = true;
        if let Some(info) = info.result {
            stats.points_count = info.points_count.unwrap_or(0);
            stats.status = status_name(info.status);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EmbedMode;

    fn point(id: &str, values: Vec<f32>, position: usize) -> IndexedPoint {
        IndexedPoint {
            id: id.to_string(),
            text: format!("text of {id}"),
            metadata: ChunkMetadata {
                source: "kb".to_string(),
                header: "Pricing Plans".to_string(),
                level: 2,
                position,
            },
            embedding: Embedding::new(values, EmbedMode::Document),
        }
    }

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("kb_chunk_0"), point_id("kb_chunk_0"));
        assert_ne!(point_id("kb_chunk_0"), point_id("kb_chunk_1"));
    }

    #[test]
    fn test_payload_round_trip() {
        let original = point("kb_chunk_4", vec![1.0, 0.0, 0.0], 4);
        let payload: HashMap<String, QdrantValue> = payload_for(&original).unwrap().into();

        let result = result_from_payload(&payload, 0.87);
        assert_eq!(result.id, "kb_chunk_4");
        assert_eq!(result.text, "text of kb_chunk_4");
        assert_eq!(result.metadata, original.metadata);
        assert!((result.score - 0.87).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_payload_fields_default() {
        let result = result_from_payload(&HashMap::new(), 0.5);
        assert!(result.id.is_empty());
        assert_eq!(result.metadata.level, 0);
    }

    #[test]
    fn test_point_op_err_reports_missing_collection() {
        let failure = || QdrantError::ConversionError("not found".to_string());

        let err = point_op_err(failure(), "kb", Some(false));
        assert!(matches!(err, RagError::Storage(StorageError::MissingCollection(ref name)) if name == "kb"));
        assert!(!err.is_transient());

        assert!(matches!(point_op_err(failure(), "kb", Some(true)), RagError::Storage(StorageError::Qdrant(_))));
        assert!(matches!(point_op_err(failure(), "kb", None), RagError::Storage(StorageError::Qdrant(_))));
    }

    #[test]
    fn test_status_name() {
        assert_eq!(status_name(CollectionStatus::Green as i32), "green");
        assert_eq!(status_name(-7), "unknown");
    }

    #[tokio::test]
    #[ignore] // Requires Qdrant server running
    async fn test_qdrant_index_grpc() {
        let missing = QdrantIndex::new(
            "http://localhost:6334".to_string(),
            None,
            "ragline_test_missing_collection".to_string(),
            3,
        );
        let query = Embedding::new(vec![1.0, 0.0, 0.0], EmbedMode::Query);
        let err = missing.search(&query, 5, 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::Storage(StorageError::MissingCollection(_))));

        let index = QdrantIndex::new(
            "http://localhost:6334".to_string(),
            None,
            "ragline_test_collection".to_string(),
            3,
        );
        index.recreate_collection().await.unwrap();

        let written = index
            .upsert(&[point("a", vec![1.0, 0.0, 0.0], 0), point("b", vec![0.0, 1.0, 0.0], 1)])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let results = index.search(&query, 5, 0.5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");

        let stats = index.stats().await.unwrap();
        assert!(stats.exists);
        assert_eq!(stats.points_count, 2);

        index.clear().await.unwrap();
        assert_eq!(index.stats().await.unwrap().points_count, 0);
    }
}
