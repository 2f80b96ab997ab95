use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ──────────────────── Document Types ────────────────────

/// Free-form metadata carried alongside a document.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Unique identifier of a document.
///
/// Shared by the vector store and the datasource; it is the only link
/// between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A unit of stored knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Assigned at creation, never changed.
    pub id: DocumentId,
    /// Embedding of `content`. Empty until the document is embedded.
    #[serde(default)]
    pub vector: Vec<f32>,
    /// Opaque to the memory layer, passed through to both backends.
    #[serde(default)]
    pub metadata: Metadata,
    /// The original payload the vector was derived from.
    pub content: String,
}

impl Document {
    /// Create a document with a freshly generated id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            vector: Vec::new(),
            metadata: Metadata::new(),
            content: content.into(),
        }
    }

    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = vector;
        self
    }

    /// Whether an embedding has been attached.
    pub fn is_embedded(&self) -> bool {
        !self.vector.is_empty()
    }
}

// ──────────────────── Descriptor Types ────────────────────

/// Serializable snapshot of a backend's construction parameters.
///
/// `kind` selects the factory that can rebuild the backend; `config` is the
/// backend-specific configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Descriptor {
    /// Build a descriptor from a typed configuration record.
    pub fn new<C: Serialize>(kind: impl Into<String>, config: &C) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.into(),
            config: serde_json::to_value(config)?,
        })
    }

    /// Decode the configuration payload into its typed record.
    ///
    /// A `null` payload decodes as an empty object so that records made of
    /// defaulted fields can be described by their kind alone.
    pub fn config<C: DeserializeOwned>(&self) -> Result<C, serde_json::Error> {
        match &self.config {
            serde_json::Value::Null => serde_json::from_value(serde_json::json!({})),
            value => serde_json::from_value(value.clone()),
        }
    }
}
