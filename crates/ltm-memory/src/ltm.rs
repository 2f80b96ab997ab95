//! Long-term memory orchestrator: embedder + vector store + datasource.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ltm_config::LtmConfig;
use ltm_types::{Descriptor, Document, DocumentId};

use crate::datasource::DataSource;
use crate::embedder::{Embedder, build_embedder};
use crate::error::LtmError;
use crate::registry::{DataSourceRegistry, VectorStoreRegistry};
use crate::vectorstore::VectorStore;

/// Result count used when a retrieval asks for zero documents.
pub const DEFAULT_TOP_K: usize = 10;
/// Largest result count passed to a vector store; larger requests are clamped.
pub const MAX_TOP_K: usize = 10_000;

/// Descriptors of both storage backends of an [`Ltm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtmDescriptors {
    pub vector_store: Descriptor,
    pub datasource: Descriptor,
}

/// Long-term memory for a conversational agent.
///
/// Vectors and documents live in two independent backends joined by the
/// document id. Writes are ordered vector first, document second, with no
/// rollback: a failed document write leaves a vector with no document, and a
/// later retrieval ranking that id fails with a not-found error.
pub struct Ltm {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    datasource: Arc<dyn DataSource>,
    default_top_k: usize,
}

impl Ltm {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        datasource: Arc<dyn DataSource>,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            datasource,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    /// Override the result count used for `top_k == 0`.
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = if top_k == 0 { DEFAULT_TOP_K } else { top_k };
        self
    }

    /// Build every component named by the configuration.
    pub fn from_config(
        config: &LtmConfig,
        vector_stores: &VectorStoreRegistry,
        datasources: &DataSourceRegistry,
    ) -> Result<Self, LtmError> {
        let embedder = build_embedder(&config.embedder).map_err(LtmError::BuildEmbedder)?;
        let descriptors = LtmDescriptors {
            vector_store: config.vector_store.clone(),
            datasource: config.datasource.clone(),
        };
        Ok(Self::from_descriptors(embedder, &descriptors, vector_stores, datasources)?
            .with_default_top_k(config.default_top_k))
    }

    /// Rebuild both storage backends from their descriptors.
    pub fn from_descriptors(
        embedder: Arc<dyn Embedder>,
        descriptors: &LtmDescriptors,
        vector_stores: &VectorStoreRegistry,
        datasources: &DataSourceRegistry,
    ) -> Result<Self, LtmError> {
        let vector_store = vector_stores
            .create(&descriptors.vector_store)
            .map_err(LtmError::BuildVectorStore)?;
        let datasource = datasources
            .create(&descriptors.datasource)
            .map_err(LtmError::BuildDataSource)?;
        Ok(Self::new(embedder, vector_store, datasource))
    }

    /// Embed and store a document, returning it with its vector attached.
    pub async fn store_document(&self, mut document: Document) -> Result<Document, LtmError> {
        document.vector = self
            .embedder
            .embed_document(&document)
            .await
            .map_err(LtmError::Embedding)?;

        self.vector_store
            .store_vector(&document)
            .await
            .map_err(LtmError::StoreVector)?;

        if let Err(e) = self.datasource.store_document(&document).await {
            warn!(id = %document.id, error = %e, "Vector stored but document write failed");
            return Err(LtmError::StoreDocument(e));
        }

        debug!(id = %document.id, embedder = self.embedder.id(), "Document stored");
        Ok(document)
    }

    /// Return the stored documents most similar to `document`, best first.
    ///
    /// `top_k == 0` uses the default (10 unless overridden); values above
    /// [`MAX_TOP_K`] are clamped.
    pub async fn retrieve_similar_documents(
        &self,
        document: &Document,
        top_k: usize,
    ) -> Result<Vec<Document>, LtmError> {
        let top_k = self.effective_top_k(top_k);

        let vector = self
            .embedder
            .embed_document(document)
            .await
            .map_err(LtmError::Embedding)?;

        let ids = self
            .vector_store
            .query_similarity(&vector, top_k)
            .await
            .map_err(LtmError::QuerySimilarity)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self
            .datasource
            .get_documents(&ids)
            .await
            .map_err(LtmError::FetchDocuments)?;
        debug!(top_k, found = documents.len(), "Retrieved similar documents");
        Ok(documents)
    }

    /// Fetch a stored document by id.
    pub async fn get_document(&self, id: DocumentId) -> Result<Document, LtmError> {
        self.datasource
            .get_document(id)
            .await
            .map_err(LtmError::FetchDocuments)
    }

    pub fn descriptors(&self) -> LtmDescriptors {
        LtmDescriptors {
            vector_store: self.vector_store.descriptor(),
            datasource: self.datasource.descriptor(),
        }
    }

    /// Close both backends. Both are always attempted; the first failure is
    /// reported.
    pub async fn close(&self) -> Result<(), LtmError> {
        let vector_store = self.vector_store.close().await;
        let datasource = self.datasource.close().await;
        vector_store.map_err(LtmError::CloseVectorStore)?;
        datasource.map_err(LtmError::CloseDataSource)?;
        Ok(())
    }

    fn effective_top_k(&self, top_k: usize) -> usize {
        match top_k {
            0 => self.default_top_k,
            k => k.min(MAX_TOP_K),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{InMemoryDataSource, SqliteDataSource};
    use crate::embedder::HashingEmbedder;
    use crate::error::{DataSourceError, EmbeddingError, Stage, VectorStoreError};
    use crate::vectorstore::{InMemoryVectorStore, LocalIndexConfig, LocalVectorStore};
    use async_trait::async_trait;

    const DIMS: usize = 128;

    struct Fixture {
        ltm: Ltm,
        vectors: Arc<InMemoryVectorStore>,
        documents: Arc<InMemoryDataSource>,
    }

    fn fixture() -> Fixture {
        let vectors = Arc::new(InMemoryVectorStore::new(DIMS).unwrap());
        let documents = Arc::new(InMemoryDataSource::new());
        let ltm = Ltm::new(
            Arc::new(HashingEmbedder::new(DIMS).unwrap()),
            vectors.clone(),
            documents.clone(),
        );
        Fixture {
            ltm,
            vectors,
            documents,
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn id(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        async fn embed_document(&self, _document: &Document) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Api("quota exceeded".into()))
        }
    }

    /// Reads from an inner datasource but refuses every write.
    struct ReadOnlyDataSource(Arc<InMemoryDataSource>);

    #[async_trait]
    impl DataSource for ReadOnlyDataSource {
        async fn get_document(&self, id: DocumentId) -> Result<Document, DataSourceError> {
            self.0.get_document(id).await
        }

        async fn store_document(&self, _document: &Document) -> Result<(), DataSourceError> {
            Err(DataSourceError::Io(std::io::Error::other("disk full")))
        }

        async fn close(&self) -> Result<(), DataSourceError> {
            self.0.close().await
        }

        fn descriptor(&self) -> Descriptor {
            self.0.descriptor()
        }
    }

    #[tokio::test]
    async fn test_store_then_fetch_round_trip() {
        let f = fixture();
        let doc = Document::new("I parked the car on level three")
            .with_metadata("user", "alice")
            .with_metadata("session", 42);

        let stored = f.ltm.store_document(doc.clone()).await.unwrap();
        assert_eq!(stored.id, doc.id);
        assert_eq!(stored.vector.len(), DIMS);

        let fetched = f.ltm.get_document(doc.id).await.unwrap();
        assert_eq!(fetched.content, doc.content);
        assert_eq!(fetched.metadata, doc.metadata);
        assert_eq!(f.vectors.metadata(&doc.id).await.unwrap(), doc.metadata);
    }

    #[tokio::test]
    async fn test_self_similarity_ranks_first() {
        let f = fixture();
        let target = Document::new("my sister's birthday is on the fourth of july");
        for doc in [
            Document::new("the deploy pipeline runs on every merge"),
            target.clone(),
            Document::new("remind me to buy oat milk"),
            Document::new("birthday party ideas for next year"),
        ] {
            f.ltm.store_document(doc).await.unwrap();
        }

        for k in [1, 2, 4] {
            let results = f.ltm.retrieve_similar_documents(&target, k).await.unwrap();
            assert_eq!(results.len(), k);
            assert_eq!(results[0].id, target.id);
        }
    }

    #[tokio::test]
    async fn test_self_similarity_symbol_only_content() {
        let f = fixture();
        f.ltm.store_document(Document::new("hello world")).await.unwrap();
        f.ltm.store_document(Document::new("another note")).await.unwrap();
        let target = f.ltm.store_document(Document::new("😊😊 ???")).await.unwrap();

        let results = f.ltm.retrieve_similar_documents(&target, 1).await.unwrap();
        assert_eq!(results[0].id, target.id);
    }

    #[tokio::test]
    async fn test_zero_top_k_means_ten() {
        let f = fixture();
        for i in 0..15 {
            f.ltm
                .store_document(Document::new(format!("note number {i} about gardening")))
                .await
                .unwrap();
        }
        let query = Document::new("gardening notes");

        let zero = f.ltm.retrieve_similar_documents(&query, 0).await.unwrap();
        let ten = f.ltm.retrieve_similar_documents(&query, 10).await.unwrap();
        assert_eq!(zero.len(), 10);
        assert_eq!(
            zero.iter().map(|d| d.id).collect::<Vec<_>>(),
            ten.iter().map(|d| d.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_top_k_policy() {
        let f = fixture();
        assert_eq!(f.ltm.effective_top_k(0), DEFAULT_TOP_K);
        assert_eq!(f.ltm.effective_top_k(3), 3);
        assert_eq!(f.ltm.effective_top_k(usize::MAX), MAX_TOP_K);

        let ltm = f.ltm.with_default_top_k(25);
        assert_eq!(ltm.effective_top_k(0), 25);
        let ltm = ltm.with_default_top_k(0);
        assert_eq!(ltm.effective_top_k(0), DEFAULT_TOP_K);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let f = fixture();
        let results = f
            .ltm
            .retrieve_similar_documents(&Document::new("anything"), 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let vectors = Arc::new(InMemoryVectorStore::new(DIMS).unwrap());
        let documents = Arc::new(InMemoryDataSource::new());
        let ltm = Ltm::new(Arc::new(FailingEmbedder), vectors.clone(), documents.clone());

        let err = ltm.store_document(Document::new("x")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Embedding);
        assert!(matches!(err, LtmError::Embedding(_)));
        assert!(vectors.is_empty().await);
        assert!(documents.is_empty().await);
    }

    #[tokio::test]
    async fn test_vector_failure_skips_document_write() {
        let documents = Arc::new(InMemoryDataSource::new());
        // Embedder and index disagree on dimensionality.
        let ltm = Ltm::new(
            Arc::new(HashingEmbedder::new(DIMS).unwrap()),
            Arc::new(InMemoryVectorStore::new(DIMS * 2).unwrap()),
            documents.clone(),
        );

        let err = ltm.store_document(Document::new("x")).await.unwrap_err();
        assert_eq!(err.stage(), Stage::VectorStore);
        assert!(matches!(
            err,
            LtmError::StoreVector(VectorStoreError::DimensionMismatch { .. })
        ));
        assert!(documents.is_empty().await);
    }

    #[tokio::test]
    async fn test_dangling_vector_surfaces_not_found() {
        let vectors = Arc::new(InMemoryVectorStore::new(DIMS).unwrap());
        let documents = Arc::new(InMemoryDataSource::new());
        let ltm = Ltm::new(
            Arc::new(HashingEmbedder::new(DIMS).unwrap()),
            vectors.clone(),
            Arc::new(ReadOnlyDataSource(documents.clone())),
        );

        let doc = Document::new("the wifi password is on the fridge");
        let err = ltm.store_document(doc.clone()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::DataSource);
        assert!(matches!(err, LtmError::StoreDocument(_)));
        // The vector write is not rolled back.
        assert_eq!(vectors.len().await, 1);

        let err = ltm.retrieve_similar_documents(&doc, 3).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            LtmError::FetchDocuments(DataSourceError::NotFound(id)) if id == doc.id
        ));
    }

    #[tokio::test]
    async fn test_descriptor_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMS).unwrap());
        let original = Ltm::new(
            embedder.clone(),
            Arc::new(
                LocalVectorStore::open(LocalIndexConfig {
                    path: dir.path().join("index.db"),
                    ..LocalIndexConfig::new(DIMS)
                })
                .unwrap(),
            ),
            Arc::new(
                SqliteDataSource::open(crate::datasource::SqliteConfig {
                    path: dir.path().join("docs.db"),
                })
                .unwrap(),
            ),
        );

        let first = original
            .store_document(Document::new("coffee order: flat white").with_metadata("kind", "pref"))
            .await
            .unwrap();
        let descriptors = original.descriptors();
        original.close().await.unwrap();
        original.close().await.unwrap();

        let json = serde_json::to_string(&descriptors).unwrap();
        let descriptors: LtmDescriptors = serde_json::from_str(&json).unwrap();
        let rebuilt = Ltm::from_descriptors(
            embedder,
            &descriptors,
            &VectorStoreRegistry::with_defaults(),
            &DataSourceRegistry::with_defaults(),
        )
        .unwrap();
        assert_eq!(rebuilt.descriptors(), descriptors);

        let fetched = rebuilt.get_document(first.id).await.unwrap();
        assert_eq!(fetched, first);

        let second = rebuilt
            .store_document(Document::new("tea order: earl grey"))
            .await
            .unwrap();
        let results = rebuilt.retrieve_similar_documents(&second, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, second.id);
        assert_eq!(results[1].id, first.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_store_and_retrieve() {
        const N: usize = 32;
        let dir = tempfile::tempdir().unwrap();
        let vectors = Arc::new(
            LocalVectorStore::open(LocalIndexConfig {
                path: dir.path().join("index.db"),
                ..LocalIndexConfig::new(DIMS)
            })
            .unwrap(),
        );
        let ltm = Arc::new(Ltm::new(
            Arc::new(HashingEmbedder::new(DIMS).unwrap()),
            vectors.clone(),
            Arc::new(
                SqliteDataSource::open(crate::datasource::SqliteConfig {
                    path: dir.path().join("docs.db"),
                })
                .unwrap(),
            ),
        ));

        let mut stores = Vec::with_capacity(N);
        let mut retrievals = Vec::with_capacity(N);
        for i in 0..N {
            let ltm_store = ltm.clone();
            stores.push(tokio::spawn(async move {
                ltm_store
                    .store_document(Document::new(format!("memory {i} about topic {}", i % 4)))
                    .await
            }));
            let ltm_query = ltm.clone();
            retrievals.push(tokio::spawn(async move {
                ltm_query
                    .retrieve_similar_documents(&Document::new(format!("topic {}", i % 4)), 5)
                    .await
            }));
        }

        let mut ids = Vec::with_capacity(N);
        for handle in stores {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        for handle in retrievals {
            match handle.await.unwrap() {
                Ok(docs) => assert!(docs.len() <= 5),
                // A vector may become visible before its document lands.
                Err(e) => assert!(e.is_not_found(), "unexpected error: {e}"),
            }
        }

        assert_eq!(vectors.len().await.unwrap(), N);
        for id in ids {
            assert_eq!(ltm.get_document(id).await.unwrap().id, id);
        }
        let results = ltm
            .retrieve_similar_documents(&Document::new("topic 1"), N)
            .await
            .unwrap();
        assert_eq!(results.len(), N);
    }

    #[test]
    fn test_from_config_reports_failing_stage() {
        let mut config = LtmConfig::default();
        config.vector_store = Descriptor {
            kind: "memory".into(),
            config: serde_json::json!({ "dimensions": 384 }),
        };
        config.datasource = Descriptor {
            kind: "boltdb".into(),
            config: serde_json::json!({}),
        };

        let err = Ltm::from_config(
            &config,
            &VectorStoreRegistry::with_defaults(),
            &DataSourceRegistry::with_defaults(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LtmError::BuildDataSource(_)));
        assert_eq!(err.stage(), Stage::DataSource);

        config.vector_store.config = serde_json::json!({ "dimensions": 0 });
        let err = Ltm::from_config(
            &config,
            &VectorStoreRegistry::with_defaults(),
            &DataSourceRegistry::with_defaults(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            LtmError::BuildVectorStore(VectorStoreError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_in_memory() {
        let mut config = LtmConfig::default();
        config.default_top_k = 2;
        config.vector_store = Descriptor {
            kind: "memory".into(),
            config: serde_json::json!({ "dimensions": 384 }),
        };
        config.datasource = Descriptor {
            kind: "memory".into(),
            config: serde_json::Value::Null,
        };
        let ltm = Ltm::from_config(
            &config,
            &VectorStoreRegistry::with_defaults(),
            &DataSourceRegistry::with_defaults(),
        )
        .unwrap();

        for text in ["alpha beta", "beta gamma", "gamma delta"] {
            ltm.store_document(Document::new(text)).await.unwrap();
        }
        let results = ltm
            .retrieve_similar_documents(&Document::new("beta"), 0)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
