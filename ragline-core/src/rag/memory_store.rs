//! In-process vector index using cosine similarity.
//!
//! Points are kept in insertion order in a `Vec` behind a
//! `tokio::sync::RwLock`, which gives search its stable tie-break for free.
//! Suitable for tests, local runs and small knowledge bases.

use super::store::{check_points, check_query, cosine_similarity, rank, IndexStats, VectorIndex};
use super::types::{Embedding, IndexedPoint, SearchResult};
use super::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct MemoryIndex {
    collection: String,
    dimension: usize,
    points: RwLock<Vec<IndexedPoint>>,
}

impl MemoryIndex {
    /// Creates an empty index. Its collection always exists.
    pub fn new(collection: impl Into<String>, dimension: usize) -> Self {
        Self {
            collection: collection.into(),
            dimension,
            points: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, points: &[IndexedPoint]) -> Result<usize> {
        check_points(points, self.dimension)?;

        let mut stored = self.points.write().await;
        for point in points {
            match stored.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point.clone(),
                None => stored.push(point.clone()),
            }
        }
        Ok(points.len())
    }

    async fn search(&self, query: &Embedding, limit: usize, score_threshold: f32) -> Result<Vec<SearchResult>> {
        check_query(query, self.dimension)?;

        let stored = self.points.read().await;
        let scored = stored
            .iter()
            .map(|point| SearchResult {
                id: point.id.clone(),
                text: point.text.clone(),
                score: cosine_similarity(&query.values, &point.embedding.values),
                metadata: point.metadata.clone(),
            })
            .collect();

        Ok(rank(scored, limit, score_threshold))
    }

    async fn recreate_collection(&self) -> Result<()> {
        self.clear().await
    }

    async fn clear(&self) -> Result<()> {
        self.points.write().await.clear();
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            collection: self.collection.clone(),
            exists: true,
            points_count: self.points.read().await.len() as u64,
            status: "green".to_string(),
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EmbedMode;
    use crate::rag::types::ChunkMetadata;
    use crate::rag::RagError;
    use proptest::prelude::*;

    fn point(id: &str, text: &str, values: Vec<f32>) -> IndexedPoint {
        IndexedPoint {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "kb".to_string(),
                ..ChunkMetadata::default()
            },
            embedding: Embedding::new(values, EmbedMode::Document),
        }
    }

    fn query(values: Vec<f32>) -> Embedding {
        Embedding::new(values, EmbedMode::Query)
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let index = MemoryIndex::new("kb", 2);
        let written = index
            .upsert(&[
                point("a", "pricing", vec![1.0, 0.0]),
                point("b", "support", vec![0.0, 1.0]),
                point("c", "mixed", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let results = index.search(&query(vec![1.0, 0.0]), 10, 0.5).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upsert_same_id_is_idempotent() {
        let index = MemoryIndex::new("kb", 2);
        let points = [point("a", "first", vec![1.0, 0.0])];
        index.upsert(&points).await.unwrap();
        index.upsert(&points).await.unwrap();
        index.upsert(&[point("a", "replaced", vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(index.stats().await.unwrap().points_count, 1);
        let results = index.search(&query(vec![1.0, 0.0]), 5, 0.0).await.unwrap();
        assert_eq!(results[0].text, "replaced");
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let index = MemoryIndex::new("kb", 2);
        index
            .upsert(&[
                point("first", "x", vec![1.0, 1.0]),
                point("second", "y", vec![1.0, 1.0]),
                point("third", "z", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index.search(&query(vec![1.0, 1.0]), 3, 0.0).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_rejects_cross_mode_vectors() {
        let index = MemoryIndex::new("kb", 2);
        let mut wrong = point("a", "x", vec![1.0, 0.0]);
        wrong.embedding.mode = EmbedMode::Query;
        assert!(matches!(index.upsert(&[wrong]).await, Err(RagError::InvalidInput(_))));

        let doc_vector = Embedding::new(vec![1.0, 0.0], EmbedMode::Document);
        assert!(matches!(index.search(&doc_vector, 3, 0.0).await, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_clear_and_recreate() {
        let index = MemoryIndex::new("kb", 2);
        index.upsert(&[point("a", "x", vec![1.0, 0.0])]).await.unwrap();
        index.clear().await.unwrap();
        assert!(index.search(&query(vec![1.0, 0.0]), 3, 0.0).await.unwrap().is_empty());

        index.upsert(&[point("a", "x", vec![1.0, 0.0])]).await.unwrap();
        index.recreate_collection().await.unwrap();
        let stats = index.stats().await.unwrap();
        assert!(stats.exists);
        assert_eq!(stats.points_count, 0);
        assert_eq!(stats.dimension, 2);
    }

    fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(-1.0f32..1.0f32, dim)
            .prop_filter("non-zero vector", |v| v.iter().any(|x| x.abs() > 1e-3))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_search_is_sorted_bounded_and_thresholded(
            vectors in proptest::collection::vec(arb_vector(8), 1..30),
            probe in arb_vector(8),
            limit in 1usize..12,
            threshold in -1.0f32..1.0f32,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = MemoryIndex::new("kb", 8);
                let points: Vec<IndexedPoint> = vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| point(&format!("p{i}"), "t", v))
                    .collect();
                index.upsert(&points).await.unwrap();
                index.search(&query(probe), limit, threshold).await.unwrap()
            });

            prop_assert!(results.len() <= limit);
            for result in &results {
                prop_assert!(result.score >= threshold);
            }
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }

        #[test]
        fn prop_higher_threshold_never_adds_results(
            vectors in proptest::collection::vec(arb_vector(8), 1..30),
            probe in arb_vector(8),
            low in -1.0f32..1.0f32,
            delta in 0.0f32..1.0f32,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (loose, strict) = rt.block_on(async {
                let index = MemoryIndex::new("kb", 8);
                let points: Vec<IndexedPoint> = vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| point(&format!("p{i}"), "t", v))
                    .collect();
                index.upsert(&points).await.unwrap();
                let q = query(probe);
                let loose = index.search(&q, 100, low).await.unwrap();
                let strict = index.search(&q, 100, low + delta).await.unwrap();
                (loose, strict)
            });

            prop_assert!(strict.len() <= loose.len());
            for result in &strict {
                prop_assert!(loose.iter().any(|r| r.id == result.id));
            }
        }
    }
}
