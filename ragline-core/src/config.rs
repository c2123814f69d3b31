use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole retrieval core.
///
/// Every section has defaults, so a config file only needs to list what it
/// changes. Secrets are usually left out of the file and supplied through the
/// environment (see [`Config::apply_env`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chunking and retrieval behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum number of characters in a chunk's core (overlap excluded).
    pub chunk_size: usize,
    /// Characters copied from the end of the previous chunk.
    pub chunk_overlap: usize,
    /// Cores shorter than this are merged into a neighbor.
    pub min_chunk_size: usize,
    /// Number of results kept per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a result to be kept.
    pub score_threshold: f32,
    /// Prefix each context passage with its section header.
    pub include_metadata: bool,
    /// Bound on each external call made while answering a query.
    pub timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            min_chunk_size: 50,
            top_k: 3,
            score_threshold: 0.3,
            include_metadata: false,
            timeout_ms: 5_000,
        }
    }
}

/// Which embedding service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Ollama,
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub dimension: usize,
    /// Provider endpoint; `None` selects the provider's public default.
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Maximum number of texts per provider call.
    pub batch_size: usize,
    /// Maximum number of provider calls in flight during ingestion.
    pub concurrency: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "models/text-embedding-004".to_string(),
            dimension: 768,
            base_url: None,
            api_key: None,
            batch_size: 100,
            concurrency: 4,
            timeout_ms: 10_000,
        }
    }
}

/// Vector database storage mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum StorageMode {
    /// In-process index, lost when the process exits
    Memory,
    /// gRPC connection to an external Qdrant server
    Grpc {
        url: String,
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
    },
}

impl Default for StorageMode {
    fn default() -> Self {
        Self::Grpc {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        }
    }
}

/// Storage configuration for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    /// Points sent per upsert call during ingestion.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

fn default_upsert_batch_size() -> usize {
    64
}

/// Vector database configuration (collection name, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Collection holding the knowledge base
    pub collection_name: String,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            collection_name: "voara_kb".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            vector_db: VectorDbConfig::default(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

/// Retry policy applied by ingestion to transient provider and storage errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/ragline.sock".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ragline_core=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }

    /// Overlays secrets and endpoints from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            if self.embedding.provider == ProviderKind::Gemini {
                self.embedding.api_key = Some(key);
            }
        }
        if let Some(name) = get("QDRANT_COLLECTION_NAME") {
            self.storage.vector_db.collection_name = name;
        }

        // An in-memory index is only ever chosen explicitly; Qdrant settings
        // do not override it.
        if let StorageMode::Grpc { url, api_key } = &mut self.storage.storage_mode {
            if let Some(env_url) = get("QDRANT_URL") {
                *url = env_url;
            }
            if let Some(env_key) = get("QDRANT_API_KEY") {
                *api_key = Some(env_key);
            }
        }
    }

    /// Rejects settings that would make the chunker or retriever misbehave.
    pub fn validate(&self) -> Result<()> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than zero".into()));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.min_chunk_size > rag.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "min_chunk_size ({}) must not exceed chunk_size ({})",
                rag.min_chunk_size, rag.chunk_size
            )));
        }
        if rag.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be greater than zero".into()));
        }
        if rag.timeout_ms == 0 || self.embedding.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rag.timeout_ms and embedding.timeout_ms must be greater than zero".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&rag.score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "score_threshold ({}) must be within [-1, 1]",
                rag.score_threshold
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be greater than zero".into()));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size and embedding.concurrency must be greater than zero".into(),
            ));
        }
        if self.storage.upsert_batch_size == 0 {
            return Err(ConfigError::Invalid("storage.upsert_batch_size must be greater than zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least one".into()));
        }
        Ok(())
    }
}
