//! SQLite-based document storage.
//!
//! Documents are kept as JSON bodies in a single key/value table keyed by
//! the document id.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use ltm_types::{Descriptor, Document, DocumentId};

use super::DataSource;
use crate::error::DataSourceError;
use crate::registry::parse_config;

/// Construction parameters for [`SqliteDataSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file. Empty means `$HOME/memory/<random name>`.
    #[serde(default)]
    pub path: PathBuf,
}

/// Document store backed by a SQLite file.
pub struct SqliteDataSource {
    conn: Arc<Mutex<Option<Connection>>>,
    descriptor: Descriptor,
}

impl SqliteDataSource {
    pub const KIND: &'static str = "sqlite";

    /// Open (or create) the database at the configured path.
    pub fn open(mut config: SqliteConfig) -> Result<Self, DataSourceError> {
        if config.path.as_os_str().is_empty() {
            config.path =
                ltm_config::create_memory_folder_in_home_dir()?.join(ltm_config::generate(10));
        }
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;

        tracing::info!("Datasource opened: {}", config.path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            descriptor: Descriptor::new(Self::KIND, &config)?,
        })
    }

    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self, DataSourceError> {
        Self::open(parse_config(descriptor, Self::KIND)?)
    }

    async fn with_conn<R, F>(&self, f: F) -> Result<R, DataSourceError>
    where
        F: FnOnce(&Connection) -> Result<R, DataSourceError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            let conn = guard.as_ref().ok_or(DataSourceError::Closed)?;
            f(conn)
        })
        .await?
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn get_document(&self, id: DocumentId) -> Result<Document, DataSourceError> {
        let body: Option<String> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare("SELECT body FROM documents WHERE id = ?1")?;
                let result = stmt.query_row(rusqlite::params![id.to_string()], |row| row.get(0));
                match result {
                    Ok(body) => Ok(Some(body)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        let body = body.ok_or(DataSourceError::NotFound(id))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn store_document(&self, document: &Document) -> Result<(), DataSourceError> {
        let id = document.id.to_string();
        let body = serde_json::to_string(document)?;
        let updated_at = chrono::Utc::now().timestamp();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO documents (id, body, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, body, updated_at],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!(id = %document.id, "Document stored");
        Ok(())
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| e)?;
                tracing::debug!("Datasource closed");
            }
            Ok(())
        })
        .await?
    }

    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }
}
