//! Document storage keyed by document id.

mod memory;
mod sqlite;

pub use memory::InMemoryDataSource;
pub use sqlite::{SqliteConfig, SqliteDataSource};

use async_trait::async_trait;

use ltm_types::{Descriptor, Document, DocumentId};

use crate::error::DataSourceError;

/// Trait for document storage backends.
///
/// Implementations must be safe to call concurrently from several tasks.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch one document. A missing id is `DataSourceError::NotFound`.
    async fn get_document(&self, id: DocumentId) -> Result<Document, DataSourceError>;

    /// Fetch several documents in the order given.
    ///
    /// All-or-nothing: the first failed lookup aborts the call and no
    /// documents are returned.
    async fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<Document>, DataSourceError> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            docs.push(self.get_document(*id).await?);
        }
        Ok(docs)
    }

    /// Write the full document under its id, replacing any previous value.
    async fn store_document(&self, document: &Document) -> Result<(), DataSourceError>;

    /// Release backend resources. Idempotent.
    async fn close(&self) -> Result<(), DataSourceError>;

    /// Descriptor this datasource can be rebuilt from.
    fn descriptor(&self) -> Descriptor;
}
