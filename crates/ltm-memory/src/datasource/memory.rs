//! Process-local document storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use ltm_types::{Descriptor, Document, DocumentId};

use super::DataSource;
use crate::error::DataSourceError;

/// Datasource held in memory as JSON-encoded documents.
///
/// Rebuilding from the descriptor yields an empty datasource.
pub struct InMemoryDataSource {
    documents: RwLock<HashMap<DocumentId, String>>,
    closed: AtomicBool,
}

impl InMemoryDataSource {
    pub const KIND: &'static str = "memory";

    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, DataSourceError> {
        crate::registry::parse_config::<serde_json::Value>(descriptor, Self::KIND)?;
        Ok(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn ensure_open(&self) -> Result<(), DataSourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DataSourceError::Closed);
        }
        Ok(())
    }
}

impl Default for InMemoryDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn get_document(&self, id: DocumentId) -> Result<Document, DataSourceError> {
        self.ensure_open()?;
        let documents = self.documents.read().await;
        let body = documents.get(&id).ok_or(DataSourceError::NotFound(id))?;
        Ok(serde_json::from_str(body)?)
    }

    async fn store_document(&self, document: &Document) -> Result<(), DataSourceError> {
        self.ensure_open()?;
        let body = serde_json::to_string(document)?;
        self.documents.write().await.insert(document.id, body);
        Ok(())
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor {
            kind: Self::KIND.to_string(),
            config: serde_json::json!({}),
        }
    }
}
