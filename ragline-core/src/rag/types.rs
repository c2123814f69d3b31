use crate::provider::EmbedMode;
use serde::{Deserialize, Serialize};

/// Where a chunk came from and which section encloses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the ingested document.
    pub source: String,
    /// Title of the nearest enclosing section; empty before the first header.
    pub header: String,
    /// Header depth (1 for `#`), 0 if there is no enclosing header.
    pub level: u8,
    /// Ordinal of the chunk within its ingestion run.
    pub position: usize,
}

/// A retrieval unit derived from a document.
///
/// `text` is the overlap prefix copied from the previous chunk followed by
/// the chunk's own core. Concatenating the cores of all chunks of a document
/// in order gives back the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// Length in bytes of the overlap prefix of `text`.
    pub overlap_len: usize,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// The chunk's own content, without the overlap prefix.
    pub fn core(&self) -> &str {
        &self.text[self.overlap_len..]
    }

    /// The prefix copied from the previous chunk.
    pub fn overlap(&self) -> &str {
        &self.text[..self.overlap_len]
    }
}

/// A vector tagged with the mode that produced it.
///
/// Query and document vectors live in the same space but are not
/// interchangeable, so the mode travels with the values.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub mode: EmbedMode,
}

impl Embedding {
    pub fn new(values: Vec<f32>, mode: EmbedMode) -> Self {
        Self { values, mode }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// A document vector stored in the index with its chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Embedding,
}

impl IndexedPoint {
    pub fn from_chunk(chunk: Chunk, embedding: Embedding) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            metadata: chunk.metadata,
            embedding,
        }
    }
}

/// A stored chunk returned by a search, with its cosine similarity to the query.
///
/// Results are ordered by descending score. Scores range from -1.0 to 1.0;
/// text embeddings mostly land between 0.0 and 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Ranked source descriptor shown next to the context in a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub chunk_id: String,
    pub source: String,
    pub header: String,
    pub score: f32,
}

impl From<&SearchResult> for Source {
    fn from(result: &SearchResult) -> Self {
        Self {
            chunk_id: result.id.clone(),
            source: result.metadata.source.clone(),
            header: result.metadata.header.clone(),
            score: result.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_and_overlap_split_text() {
        let chunk = Chunk {
            id: "kb_chunk_1".to_string(),
            text: "tail.Body of the chunk".to_string(),
            overlap_len: 5,
            metadata: ChunkMetadata::default(),
        };
        assert_eq!(chunk.overlap(), "tail.");
        assert_eq!(chunk.core(), "Body of the chunk");
    }

    #[test]
    fn test_source_from_result() {
        let result = SearchResult {
            id: "kb_chunk_0".to_string(),
            text: "Starter, Pro, Enterprise".to_string(),
            score: 0.82,
            metadata: ChunkMetadata {
                source: "kb".to_string(),
                header: "Pricing Plans".to_string(),
                level: 2,
                position: 0,
            },
        };
        let source = Source::from(&result);
        assert_eq!(source.chunk_id, "kb_chunk_0");
        assert_eq!(source.header, "Pricing Plans");
        assert_eq!(source.source, "kb");
    }
}
