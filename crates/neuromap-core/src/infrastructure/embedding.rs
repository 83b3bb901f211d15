//! Deterministic hashing embedder
//!
//! Each lowercase word of a text is hashed into a handful of signed buckets
//! and the sum is normalized. Texts sharing words end up similar; distinct
//! single-word labels are close to orthogonal. No model is involved.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::mindmap::similarity::normalize;
use crate::error::{Error, Result};

/// Buckets touched per word
const FEATURES_PER_TOKEN: usize = 8;

#[derive(Debug)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls served
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of individual texts embedded
    pub fn text_count(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.dimension == 0 {
            return Err(Error::validation("embedding dimension must be greater than zero"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| text_to_vec(t, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn text_to_vec(text: &str, dims: usize) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        tokens.push(lowered.as_str());
    }

    let mut vec = vec![0.0; dims];
    for token in tokens {
        let digest = Sha256::digest(token.as_bytes());
        for k in 0..FEATURES_PER_TOKEN {
            let idx = u16::from_le_bytes([digest[2 * k], digest[2 * k + 1]]) as usize % dims;
            let sign = if digest[16 + k] & 1 == 0 { 1.0 } else { -1.0 };
            vec[idx] += sign;
        }
    }

    normalize(&mut vec);
    vec
}
