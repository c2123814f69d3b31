//! ragline-core - knowledge-base retrieval for a conversational voice agent
//!
//! Provides the components that ground an agent's answers in company
//! documentation:
//! - Markdown-aware chunking and asymmetric (query/document) embeddings
//! - Vector index abstraction (in-memory, Qdrant)
//! - Offline ingestion and best-effort query-time retrieval
//! - The `search_knowledge_base` agent tool
//! - Configuration management
//! - A local request server

pub mod config;
pub mod provider;
pub mod rag;
pub mod server;
pub mod tool;

pub use config::Config;
pub use provider::{EmbedMode, EmbeddingProvider, ProviderError};
pub use rag::{
    IngestError, IngestSummary, Ingestor, RagEngine, RagError, Retrieval, RetrieveOptions, Retriever,
    SearchResult, Source, VectorIndex, NO_CONTEXT,
};
pub use server::Server;
pub use tool::KnowledgeBaseTool;
