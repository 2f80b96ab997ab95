//! Embedding providers that turn documents into vectors.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use ltm_config::EmbedderSettings;
use ltm_types::Document;

use crate::error::EmbeddingError;

/// Trait for embedding documents into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Vector dimensions.
    fn dimensions(&self) -> usize;
    /// Embed a document's content.
    async fn embed_document(&self, document: &Document) -> Result<Vec<f32>, EmbeddingError>;
}

/// OpenAI embedding provider.
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(api_key: String, model: String, dimensions: usize) -> Self {
        Self {
            api_key,
            model,
            dimensions,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn id(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_document(&self, document: &Document) -> Result<Vec<f32>, EmbeddingError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": document.content,
        });
        // Only the v3 family accepts a truncated output size.
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = self.dimensions.into();
        }

        let resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("{status}: {}", api_error_message(&text))));
        }
        let json: serde_json::Value = resp.json().await?;

        let embedding: Vec<f32> = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding array".into()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

/// Pull `error.message` out of an OpenAI error body, or fall back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Offline embedder based on feature hashing.
///
/// Each lowercase word token is hashed with SHA-256 into a signed bucket and
/// the result is L2-normalized, so documents sharing vocabulary land close
/// together under cosine similarity. Identical content always produces an
/// identical vector.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, EmbeddingError> {
        if dimensions == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "dimensions cannot be 0".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let mut words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .peekable();
        if words.peek().is_some() {
            for word in words {
                self.add_token(&mut vector, &word.to_lowercase());
            }
        } else {
            // Symbol-only content: every non-whitespace char is a token.
            let mut buf = [0u8; 4];
            for c in text.chars().filter(|c| !c.is_whitespace()) {
                self.add_token(&mut vector, c.encode_utf8(&mut buf));
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_token(&self, vector: &mut [f32], token: &str) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn id(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_document(&self, document: &Document) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(&document.content))
    }
}

/// Build the embedder named by the settings.
pub fn build_embedder(settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match settings.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(settings.dimensions)?)),
        "openai" => {
            let api_key = match &settings.api_key {
                Some(key) if !key.is_empty() => key.clone(),
                _ => std::env::var("OPENAI_API_KEY").map_err(|_| {
                    EmbeddingError::InvalidConfig("OPENAI_API_KEY is not set".to_string())
                })?,
            };
            let embedder = match &settings.model {
                Some(model) => {
                    OpenAiEmbedder::with_model(api_key, model.clone(), settings.dimensions)
                }
                None => OpenAiEmbedder::new(api_key),
            };
            Ok(Arc::new(embedder))
        }
        other => Err(EmbeddingError::InvalidConfig(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}
