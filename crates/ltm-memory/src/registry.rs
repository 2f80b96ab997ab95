//! Backend registry: rebuilds live backends from their descriptors.
//!
//! Every backend kind registers a factory under its kind name. A serialized
//! [`Descriptor`] can then be handed back to the registry to reconstruct an
//! equivalent backend without knowing its constructor at the call site.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use ltm_types::Descriptor;

use crate::datasource::{DataSource, InMemoryDataSource, SqliteDataSource};
use crate::error::{DataSourceError, DescriptorError, VectorStoreError};
use crate::vectorstore::{InMemoryVectorStore, LocalVectorStore, PineconeVectorStore, VectorStore};

/// Maps backend kinds to the factories that build them.
pub struct BackendRegistry<T: ?Sized, E> {
    factories: HashMap<String, Arc<dyn Fn(&Descriptor) -> Result<Arc<T>, E> + Send + Sync>>,
}

pub type VectorStoreRegistry = BackendRegistry<dyn VectorStore, VectorStoreError>;
pub type DataSourceRegistry = BackendRegistry<dyn DataSource, DataSourceError>;

impl<T: ?Sized, E: From<DescriptorError>> BackendRegistry<T, E> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for a backend kind, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Descriptor) -> Result<Arc<T>, E> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a backend from a descriptor.
    pub fn create(&self, descriptor: &Descriptor) -> Result<Arc<T>, E> {
        let factory = self
            .factories
            .get(&descriptor.kind)
            .ok_or_else(|| DescriptorError::UnknownKind(descriptor.kind.clone()))?;
        tracing::debug!(kind = %descriptor.kind, "Building backend from descriptor");
        factory(descriptor)
    }
}

impl<T: ?Sized, E: From<DescriptorError>> Default for BackendRegistry<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry<dyn VectorStore, VectorStoreError> {
    /// Registry with every built-in vector store kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(LocalVectorStore::KIND, |d| {
            Ok(Arc::new(LocalVectorStore::from_descriptor(d)?) as Arc<dyn VectorStore>)
        });
        registry.register(PineconeVectorStore::KIND, |d| {
            Ok(Arc::new(PineconeVectorStore::from_descriptor(d)?) as Arc<dyn VectorStore>)
        });
        registry.register(InMemoryVectorStore::KIND, |d| {
            Ok(Arc::new(InMemoryVectorStore::from_descriptor(d)?) as Arc<dyn VectorStore>)
        });
        registry
    }
}

impl BackendRegistry<dyn DataSource, DataSourceError> {
    /// Registry with every built-in datasource kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SqliteDataSource::KIND, |d| {
            Ok(Arc::new(SqliteDataSource::from_descriptor(d)?) as Arc<dyn DataSource>)
        });
        registry.register(InMemoryDataSource::KIND, |d| {
            Ok(Arc::new(InMemoryDataSource::from_descriptor(d)?) as Arc<dyn DataSource>)
        });
        registry
    }
}

/// Decode a descriptor's payload, checking it names the expected kind.
pub fn parse_config<C: DeserializeOwned>(
    descriptor: &Descriptor,
    kind: &str,
) -> Result<C, DescriptorError> {
    if descriptor.kind != kind {
        return Err(DescriptorError::UnknownKind(descriptor.kind.clone()));
    }
    descriptor
        .config()
        .map_err(|source| DescriptorError::InvalidConfig {
            kind: kind.to_string(),
            source,
        })
}
