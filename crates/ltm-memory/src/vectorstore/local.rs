//! SQLite-backed local vector index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use ltm_types::{Descriptor, Document, DocumentId};

use super::{DistanceMetric, VectorStore, check_finite, rank};
use crate::error::VectorStoreError;
use crate::registry::parse_config;

/// Construction parameters for [`LocalVectorStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalIndexConfig {
    /// Index file. Empty means `$HOME/memory/local-index/index.db`.
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub dimensions: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_collection() -> String {
    "asltm".to_string()
}

impl LocalIndexConfig {
    pub fn new(dimensions: usize) -> Self {
        Self {
            path: PathBuf::new(),
            collection: default_collection(),
            dimensions,
            metric: DistanceMetric::default(),
        }
    }
}

/// Vector index stored in a SQLite file, ranked by brute force.
///
/// A file can hold several named collections, each with its own fixed
/// dimensionality and metric. Storing an id twice overwrites the vector.
pub struct LocalVectorStore {
    conn: Arc<Mutex<Option<Connection>>>,
    collection: String,
    dimensions: usize,
    metric: DistanceMetric,
    descriptor: Descriptor,
}

impl LocalVectorStore {
    pub const KIND: &'static str = "local";

    /// Open (or create) the index and its collection.
    pub fn open(mut config: LocalIndexConfig) -> Result<Self, VectorStoreError> {
        if config.dimensions == 0 {
            return Err(VectorStoreError::InvalidConfig(
                "dimensions cannot be 0".to_string(),
            ));
        }
        if config.collection.is_empty() {
            config.collection = default_collection();
        }
        if config.path.as_os_str().is_empty() {
            config.path = ltm_config::create_folder_inside_memory_folder("local-index")?
                .join("index.db");
        }
        ensure_parent(&config.path)?;

        let conn = Connection::open(&config.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;

             CREATE TABLE IF NOT EXISTS collections (
                 name TEXT PRIMARY KEY,
                 dimensions INTEGER NOT NULL,
                 metric TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS vectors (
                 collection TEXT NOT NULL,
                 id TEXT NOT NULL,
                 vector BLOB NOT NULL,
                 metadata TEXT NOT NULL,
                 updated_at INTEGER NOT NULL,
                 PRIMARY KEY (collection, id)
             );",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO collections (name, dimensions, metric) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                config.collection,
                config.dimensions as i64,
                config.metric.as_str()
            ],
        )?;
        let (dimensions, metric): (i64, String) = conn.query_row(
            "SELECT dimensions, metric FROM collections WHERE name = ?1",
            rusqlite::params![config.collection],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if dimensions as usize != config.dimensions || metric != config.metric.as_str() {
            return Err(VectorStoreError::InvalidConfig(format!(
                "collection {} exists with {} dimensions ({}), requested {} ({})",
                config.collection,
                dimensions,
                metric,
                config.dimensions,
                config.metric.as_str()
            )));
        }

        let descriptor = Descriptor::new(Self::KIND, &config)?;
        tracing::info!(
            collection = %config.collection,
            dimensions = config.dimensions,
            "Local vector index opened: {}",
            config.path.display()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            collection: config.collection,
            dimensions: config.dimensions,
            metric: config.metric,
            descriptor,
        })
    }

    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, VectorStoreError> {
        Self::open(parse_config(descriptor, Self::KIND)?)
    }

    /// Number of vectors in this collection.
    pub async fn len(&self) -> Result<usize, VectorStoreError> {
        let collection = self.collection.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vectors WHERE collection = ?1",
                rusqlite::params![collection],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool, VectorStoreError> {
        Ok(self.len().await? == 0)
    }

    fn check_dimensions(&self, got: usize) -> Result<(), VectorStoreError> {
        if got != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                got,
            });
        }
        Ok(())
    }

    async fn with_conn<R, F>(&self, f: F) -> Result<R, VectorStoreError>
    where
        F: FnOnce(&Connection) -> Result<R, VectorStoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            let conn = guard.as_ref().ok_or(VectorStoreError::Closed)?;
            f(conn)
        })
        .await?
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn store_vector(&self, document: &Document) -> Result<(), VectorStoreError> {
        self.check_dimensions(document.vector.len())?;
        check_finite(&document.vector)?;

        let collection = self.collection.clone();
        let id = document.id.to_string();
        let vector = vector_to_bytes(&document.vector);
        let metadata = serde_json::to_string(&document.metadata)?;
        let updated_at = chrono::Utc::now().timestamp();

        self.with_conn(move |conn| {
            let count = conn.execute(
                "INSERT OR REPLACE INTO vectors (collection, id, vector, metadata, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![collection, id, vector, metadata, updated_at],
            )?;
            if count != 1 {
                return Err(VectorStoreError::WriteCountMismatch {
                    expected: 1,
                    got: count as u64,
                });
            }
            Ok(())
        })
        .await?;

        tracing::debug!(id = %document.id, collection = %self.collection, "Vector stored");
        Ok(())
    }

    async fn query_similarity(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentId>, VectorStoreError> {
        self.check_dimensions(vector.len())?;
        check_finite(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let collection = self.collection.clone();
        let rows: Vec<(String, Vec<u8>)> = self
            .with_conn(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, vector FROM vectors WHERE collection = ?1")?;
                let rows = stmt
                    .query_map(rusqlite::params![collection], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, bytes) in rows {
            let id: DocumentId = id
                .parse()
                .map_err(|_| VectorStoreError::InvalidId(id.clone()))?;
            candidates.push((id, bytes_to_vector(&bytes)));
        }

        Ok(rank(
            self.metric,
            vector,
            candidates.iter().map(|(id, v)| (*id, v.as_slice())),
            k,
        ))
    }

    async fn close(&self) -> Result<(), VectorStoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| e)?;
                tracing::debug!("Local vector index closed");
            }
            Ok(())
        })
        .await?
    }

    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }
}

fn ensure_parent(path: &Path) -> Result<(), VectorStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
