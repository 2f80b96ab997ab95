//! Vector storage and nearest-neighbor queries.

mod local;
mod memory;
mod pinecone;

pub use local::{LocalIndexConfig, LocalVectorStore};
pub use memory::{InMemoryIndexConfig, InMemoryVectorStore};
pub use pinecone::{PineconeConfig, PineconeVectorStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ltm_types::{Descriptor, Document, DocumentId};

use crate::error::VectorStoreError;

/// Trait for vector storage backends.
///
/// Implementations must be safe to call concurrently from several tasks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store `document.vector` keyed by `document.id`, with its metadata as
    /// payload where the backend supports one.
    async fn store_vector(&self, document: &Document) -> Result<(), VectorStoreError>;

    /// Return up to `k` ids, most similar first.
    ///
    /// An index holding fewer than `k` entries yields what it has; an empty
    /// index yields an empty list.
    async fn query_similarity(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentId>, VectorStoreError>;

    /// Release backend resources. Idempotent.
    async fn close(&self) -> Result<(), VectorStoreError>;

    /// Descriptor this store can be rebuilt from.
    fn descriptor(&self) -> Descriptor;
}

/// Similarity metric used to rank stored vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::InnerProduct => "inner_product",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Self::Cosine),
            "l2" => Some(Self::L2),
            "inner_product" => Some(Self::InnerProduct),
            _ => None,
        }
    }

    /// Score two vectors; higher is more similar. L2 scores are negated
    /// distances.
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::L2 => -a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::InnerProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        }
    }
}

/// Rank candidates against `query` and keep the best `k` ids.
pub(crate) fn rank<'a>(
    metric: DistanceMetric,
    query: &[f32],
    candidates: impl IntoIterator<Item = (DocumentId, &'a [f32])>,
    k: usize,
) -> Vec<DocumentId> {
    let mut scored: Vec<(DocumentId, f32)> = candidates
        .into_iter()
        .map(|(id, vector)| {
            let score = metric.similarity(query, vector);
            // NaN sorts last.
            (id, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);
    scored.into_iter().map(|(id, _)| id).collect()
}

/// Reject vectors with NaN or infinite components.
pub(crate) fn check_finite(vector: &[f32]) -> Result<(), VectorStoreError> {
    match vector.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(VectorStoreError::NonFinite { index }),
        None => Ok(()),
    }
}

/// Cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_metric_names() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::L2, DistanceMetric::InnerProduct] {
            assert_eq!(DistanceMetric::parse(metric.as_str()), Some(metric));
            let json = serde_json::to_value(metric).unwrap();
            assert_eq!(json, metric.as_str());
        }
        assert_eq!(DistanceMetric::parse("hamming"), None);
    }

    #[test]
    fn test_rank_orders_by_metric() {
        let near = DocumentId::new();
        let far = DocumentId::new();
        let a = [1.0f32, 0.0];
        let b = [10.0f32, 10.0];
        let query = [2.0f32, 0.0];

        let cosine = rank(DistanceMetric::Cosine, &query, [(far, &b[..]), (near, &a[..])], 2);
        assert_eq!(cosine, vec![near, far]);

        let l2 = rank(DistanceMetric::L2, &query, [(far, &b[..]), (near, &a[..])], 2);
        assert_eq!(l2, vec![near, far]);

        // Magnitude wins under inner product.
        let ip = rank(DistanceMetric::InnerProduct, &query, [(near, &a[..]), (far, &b[..])], 1);
        assert_eq!(ip, vec![far]);
    }

    #[test]
    fn test_rank_fewer_than_k() {
        let id = DocumentId::new();
        let v = [1.0f32];
        assert_eq!(rank(DistanceMetric::Cosine, &[1.0], [(id, &v[..])], 10), vec![id]);
        assert!(rank(DistanceMetric::Cosine, &[1.0], std::iter::empty(), 10).is_empty());
    }

    #[test]
    fn test_rank_with_nan_scores() {
        let vectors: Vec<(DocumentId, [f32; 2])> = (0..200)
            .map(|i| {
                let v = if i % 3 == 0 { [f32::NAN, 1.0] } else { [1.0, i as f32 / 200.0] };
                (DocumentId::new(), v)
            })
            .collect();
        let query = [1.0f32, 0.5];

        let ids = rank(
            DistanceMetric::Cosine,
            &query,
            vectors.iter().map(|(id, v)| (*id, &v[..])),
            5,
        );
        assert_eq!(ids.len(), 5);
        for id in &ids {
            let (_, v) = vectors.iter().find(|(other, _)| other == id).unwrap();
            assert!(v[0].is_finite());
        }
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(&[0.0, -1.5, 3.0]).is_ok());
        assert!(matches!(
            check_finite(&[1.0, f32::NAN]),
            Err(VectorStoreError::NonFinite { index: 1 })
        ));
        assert!(matches!(
            check_finite(&[f32::INFINITY]),
            Err(VectorStoreError::NonFinite { index: 0 })
        ));
    }
}
