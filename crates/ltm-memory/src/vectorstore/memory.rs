//! Process-local vector store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use ltm_types::{Descriptor, Document, DocumentId, Metadata};

use super::{DistanceMetric, VectorStore, check_finite, rank};
use crate::error::VectorStoreError;
use crate::registry::parse_config;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InMemoryIndexConfig {
    pub dimensions: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

/// Vector store held entirely in memory.
///
/// Rebuilding from the descriptor yields an empty store with the same
/// dimensionality and metric. Storing an id twice overwrites the vector.
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<DocumentId, (Vec<f32>, Metadata)>>,
    config: InMemoryIndexConfig,
    descriptor: Descriptor,
    closed: AtomicBool,
}

impl InMemoryVectorStore {
    pub const KIND: &'static str = "memory";

    pub fn new(dimensions: usize) -> Result<Self, VectorStoreError> {
        Self::with_config(InMemoryIndexConfig {
            dimensions,
            metric: DistanceMetric::default(),
        })
    }

    pub fn with_config(config: InMemoryIndexConfig) -> Result<Self, VectorStoreError> {
        if config.dimensions == 0 {
            return Err(VectorStoreError::InvalidConfig(
                "dimensions cannot be 0".to_string(),
            ));
        }
        let descriptor = Descriptor::new(Self::KIND, &config)?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            config,
            descriptor,
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, VectorStoreError> {
        Self::with_config(parse_config(descriptor, Self::KIND)?)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Metadata stored alongside a vector.
    pub async fn metadata(&self, id: &DocumentId) -> Option<Metadata> {
        self.entries.read().await.get(id).map(|(_, m)| m.clone())
    }

    fn check(&self, got: usize) -> Result<(), VectorStoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VectorStoreError::Closed);
        }
        if got != self.config.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.config.dimensions,
                got,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store_vector(&self, document: &Document) -> Result<(), VectorStoreError> {
        self.check(document.vector.len())?;
        check_finite(&document.vector)?;
        self.entries.write().await.insert(
            document.id,
            (document.vector.clone(), document.metadata.clone()),
        );
        Ok(())
    }

    async fn query_similarity(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentId>, VectorStoreError> {
        self.check(vector.len())?;
        check_finite(vector)?;
        let entries = self.entries.read().await;
        Ok(rank(
            self.config.metric,
            vector,
            entries.iter().map(|(id, (v, _))| (*id, v.as_slice())),
            k,
        ))
    }

    async fn close(&self) -> Result<(), VectorStoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }
}
