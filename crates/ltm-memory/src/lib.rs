//! ltm-memory: long-term memory for conversational agents.
//!
//! Provides:
//! - Embedder, VectorStore and DataSource contracts
//! - Local (SQLite) and remote (Pinecone) vector stores
//! - SQLite-backed document storage
//! - Backend descriptors and a registry that rebuilds backends from them
//! - The `Ltm` orchestrator joining all three by document id

pub mod datasource;
pub mod embedder;
pub mod error;
pub mod ltm;
pub mod registry;
pub mod vectorstore;

pub use datasource::DataSource;
pub use embedder::Embedder;
pub use error::{DataSourceError, DescriptorError, EmbeddingError, LtmError, Stage, VectorStoreError};
pub use ltm::{Ltm, LtmDescriptors};
pub use registry::{BackendRegistry, DataSourceRegistry, VectorStoreRegistry};
pub use vectorstore::VectorStore;
