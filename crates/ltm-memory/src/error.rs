//! Error types for every memory layer.

use ltm_config::ConfigError;
use ltm_types::DocumentId;

/// Failure to turn a descriptor into a backend.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Unknown backend kind: {0}")]
    UnknownKind(String),
    #[error("Invalid {kind} descriptor: {source}")]
    InvalidConfig {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Embedding API error: {0}")]
    Api(String),
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("Invalid embedder configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Invalid vector store configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Vector service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Vector component {index} is not finite")]
    NonFinite { index: usize },
    /// A single-record write reported touching some other number of records.
    #[error("Write count mismatch: expected {expected}, got {got}")]
    WriteCountMismatch { expected: u64, got: u64 },
    #[error("Invalid vector id: {0}")]
    InvalidId(String),
    #[error("Vector store is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("Invalid datasource configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Document not found: {0}")]
    NotFound(DocumentId),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Datasource is closed")]
    Closed,
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    VectorStore,
    DataSource,
}

/// Errors surfaced by the `Ltm` pipelines, tagged with the failing stage.
#[derive(Debug, thiserror::Error)]
pub enum LtmError {
    #[error("embedding document: {0}")]
    Embedding(#[source] EmbeddingError),
    #[error("storing document vector: {0}")]
    StoreVector(#[source] VectorStoreError),
    #[error("storing document: {0}")]
    StoreDocument(#[source] DataSourceError),
    #[error("querying similar vectors: {0}")]
    QuerySimilarity(#[source] VectorStoreError),
    #[error("getting documents: {0}")]
    FetchDocuments(#[source] DataSourceError),
    #[error("closing vector store: {0}")]
    CloseVectorStore(#[source] VectorStoreError),
    #[error("closing datasource: {0}")]
    CloseDataSource(#[source] DataSourceError),
    #[error("building embedder: {0}")]
    BuildEmbedder(#[source] EmbeddingError),
    #[error("building vector store: {0}")]
    BuildVectorStore(#[source] VectorStoreError),
    #[error("building datasource: {0}")]
    BuildDataSource(#[source] DataSourceError),
}

impl LtmError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Embedding(_) | Self::BuildEmbedder(_) => Stage::Embedding,
            Self::StoreVector(_)
            | Self::QuerySimilarity(_)
            | Self::CloseVectorStore(_)
            | Self::BuildVectorStore(_) => Stage::VectorStore,
            Self::StoreDocument(_)
            | Self::FetchDocuments(_)
            | Self::CloseDataSource(_)
            | Self::BuildDataSource(_) => Stage::DataSource,
        }
    }

    /// True when a fetch named an id the datasource does not hold, e.g. a
    /// vector whose document write never landed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FetchDocuments(DataSourceError::NotFound(_)))
    }
}
