//! Pinecone vector-search service client.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ltm_types::{Descriptor, Document, DocumentId};

use super::{VectorStore, check_finite};
use crate::error::VectorStoreError;
use crate::registry::parse_config;

/// Construction parameters for [`PineconeVectorStore`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    pub project_name: String,
    pub environment: String,
    /// Empty means a freshly generated namespace.
    #[serde(default)]
    pub namespace: String,
}

impl fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("api_key", &"<redacted>")
            .field("index_name", &self.index_name)
            .field("project_name", &self.project_name)
            .field("environment", &self.environment)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Vector store backed by a Pinecone index.
///
/// Each store writes to a single namespace of the index. Storing an id twice
/// overwrites the vector (Pinecone upsert semantics). Metadata is sent as
/// the vector payload.
pub struct PineconeVectorStore {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    api_key: String,
    descriptor: Descriptor,
    closed: AtomicBool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
}

impl PineconeVectorStore {
    pub const KIND: &'static str = "pinecone";

    pub fn new(mut config: PineconeConfig) -> Result<Self, VectorStoreError> {
        for (name, value) in [
            ("api_key", &config.api_key),
            ("index_name", &config.index_name),
            ("project_name", &config.project_name),
            ("environment", &config.environment),
        ] {
            if value.is_empty() {
                return Err(VectorStoreError::InvalidConfig(format!("{name} is required")));
            }
        }
        if config.namespace.is_empty() {
            config.namespace = ltm_config::generate(10);
        }

        let base_url = format!(
            "https://{}-{}.svc.{}.pinecone.io",
            config.index_name, config.project_name, config.environment
        );
        let descriptor = Descriptor::new(Self::KIND, &config)?;
        tracing::info!(
            index = %config.index_name,
            namespace = %config.namespace,
            "Pinecone vector store ready"
        );

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            namespace: config.namespace,
            api_key: config.api_key,
            descriptor,
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, VectorStoreError> {
        Self::new(parse_config(descriptor, Self::KIND)?)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn ensure_open(&self) -> Result<(), VectorStoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VectorStoreError::Closed);
        }
        Ok(())
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, VectorStoreError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(VectorStoreError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn store_vector(&self, document: &Document) -> Result<(), VectorStoreError> {
        self.ensure_open()?;
        check_finite(&document.vector)?;

        let mut vector = serde_json::json!({
            "id": document.id.to_string(),
            "values": document.vector,
        });
        if !document.metadata.is_empty() {
            vector["metadata"] = serde_json::to_value(&document.metadata)?;
        }
        let body = serde_json::json!({
            "vectors": [vector],
            "namespace": self.namespace,
        });

        let resp: UpsertResponse = self.post("/vectors/upsert", &body).await?;
        check_upserted_count(resp.upserted_count)?;
        tracing::debug!(id = %document.id, namespace = %self.namespace, "Vector upserted");
        Ok(())
    }

    async fn query_similarity(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentId>, VectorStoreError> {
        self.ensure_open()?;
        check_finite(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "vector": vector,
            "topK": k,
            "namespace": self.namespace,
            "includeValues": false,
            "includeMetadata": false,
        });
        let resp: QueryResponse = self.post("/query", &body).await?;
        parse_match_ids(resp.matches)
    }

    async fn close(&self) -> Result<(), VectorStoreError> {
        // Stateless HTTP client; nothing to release beyond refusing further calls.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }
}

/// A single-vector upsert must report exactly one record written.
fn check_upserted_count(count: u64) -> Result<(), VectorStoreError> {
    if count != 1 {
        return Err(VectorStoreError::WriteCountMismatch {
            expected: 1,
            got: count,
        });
    }
    Ok(())
}

fn parse_match_ids(matches: Vec<QueryMatch>) -> Result<Vec<DocumentId>, VectorStoreError> {
    matches
        .into_iter()
        .map(|m| {
            m.id
                .parse()
                .map_err(|_| VectorStoreError::InvalidId(m.id.clone()))
        })
        .collect()
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
