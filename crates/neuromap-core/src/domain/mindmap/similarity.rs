//! Vector helpers shared by clustering, evolution and merge

use std::sync::Arc;

/// Pairwise embedding similarity used for clustering, merge and evolution.
/// Cosine unless an embedding provider supplies its own measure.
#[derive(Clone)]
pub struct Similarity(Arc<dyn Fn(&[f32], &[f32]) -> f32 + Send + Sync>);

impl Similarity {
    pub fn new(measure: impl Fn(&[f32], &[f32]) -> f32 + Send + Sync + 'static) -> Self {
        Self(Arc::new(measure))
    }

    pub fn between(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.0)(a, b)
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self::new(cosine_similarity)
    }
}

impl std::fmt::Debug for Similarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Similarity")
    }
}

/// Cosine similarity in [-1, 1]; zero for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Scale to unit length in place; zero vectors are left untouched
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Element-wise mean of equally sized vectors
pub fn mean_vector<'a>(vectors: impl IntoIterator<Item = &'a [f32]>, dimension: usize) -> Vec<f32> {
    let mut sum = vec![0.0; dimension];
    let mut count = 0usize;
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
        count += 1;
    }
    if count > 0 {
        for acc in &mut sum {
            *acc /= count as f32;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalize_and_mean() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let m = mean_vector([&a[..], &b[..]], 2);
        assert_eq!(m, vec![0.5, 0.5]);
    }

    #[test]
    fn test_similarity_defaults_to_cosine() {
        let cosine = Similarity::default();
        assert!((cosine.between(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);

        let flat = Similarity::new(|_, _| 0.25);
        assert_eq!(flat.between(&[1.0, 0.0], &[1.0, 0.0]), 0.25);
    }
}
