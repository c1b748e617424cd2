//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait the retrieval tools use to turn a query
//! into a dense vector, plus pure helpers for vector serialization and
//! distance computation.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the
//! `jenkins-chatbot` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Text → vector capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use jenkins_chatbot_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean (L2) distance between two vectors. Lower means closer.
///
/// Returns `None` for empty vectors or vectors of different lengths, so
/// callers can skip incomparable entries instead of ranking them.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum();

    Some(sum.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_l2_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(l2_distance(&v, &v), Some(0.0));
    }

    #[test]
    fn test_l2_known_value() {
        let d = l2_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_l2_incomparable() {
        assert_eq!(l2_distance(&[], &[]), None);
        assert_eq!(l2_distance(&[1.0, 2.0], &[1.0]), None);
    }
}
