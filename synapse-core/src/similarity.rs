//! Embedding similarity provider.
//!
//! The engine never generates embeddings itself; it only compares vectors
//! handed to it. The provider is a trait so callers can swap in an
//! approximate or hardware-accelerated implementation.

use crate::error::{Result, SynapseError};
use rayon::prelude::*;

/// Cosine similarity of two vectors, and batch similarity of one vector
/// against a corpus.
pub trait SimilarityProvider: Send + Sync {
    /// Similarity of `a` and `b`, in [-1, 1].
    fn similarity(&self, a: &[f32], b: &[f32]) -> Result<f32>;

    /// Similarity of `query` against each corpus vector, preserving order.
    fn batch_similarity(&self, query: &[f32], corpus: &[Vec<f32>]) -> Result<Vec<f32>>;
}

/// Exact cosine similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

impl CosineSimilarity {
    fn validate(a: &[f32], b: &[f32]) -> Result<()> {
        if a.is_empty() || b.is_empty() {
            return Err(SynapseError::validation("empty embedding vector"));
        }
        if a.len() != b.len() {
            return Err(SynapseError::validation(format!(
                "embedding dimension mismatch: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        Ok(())
    }
}

impl SimilarityProvider for CosineSimilarity {
    fn similarity(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        Self::validate(a, b)?;
        Ok(cosine(a, b))
    }

    fn batch_similarity(&self, query: &[f32], corpus: &[Vec<f32>]) -> Result<Vec<f32>> {
        if query.is_empty() {
            return Err(SynapseError::validation("empty query vector"));
        }
        for vec in corpus {
            Self::validate(query, vec)?;
        }
        Ok(corpus.par_iter().map(|vec| cosine(query, vec)).collect())
    }
}

/// Plain cosine similarity. Zero-magnitude vectors compare as 0.0; the
/// result is clamped to [-1, 1] against accumulated float error.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}
