//! Embeddings for concept labels
//!
//! [`EmbeddingProvider`] is the external model; [`EmbeddingCache`] sits in
//! front of it so each label is embedded at most once while cached.

mod cache;

pub use cache::{CacheStats, EmbeddingCache};

use async_trait::async_trait;

use crate::domain::mindmap::similarity::cosine_similarity;
use crate::error::Result;

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each text, returning one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Similarity in [-1, 1]. Clustering, merge and evolution all measure
    /// embeddings with this.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}
