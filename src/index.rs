//! In-memory embedding index over the corpus's prior questions.
//!
//! Vectors are L2-normalized at build time, so cosine similarity reduces
//! to a plain inner product. Search is a brute-force scan over all
//! stored vectors; corpus sizes here are small enough that an
//! approximate-nearest-neighbor structure would be overhead with no
//! payoff.
//!
//! The index is built once at process start and read-only afterwards;
//! rebuilding requires a restart.

use anyhow::{bail, Result};

use crate::capability::TextEmbedder;
use crate::corpus::Corpus;

/// Immutable vector index, one entry per corpus record.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    vectors: Vec<Vec<f32>>,
    dims: usize,
}

impl EmbeddingIndex {
    /// Embed every corpus query and build the index.
    ///
    /// # Errors
    ///
    /// Fails if the embedding capability errors or returns a vector
    /// count that does not match the corpus record count.
    pub async fn build(corpus: &Corpus, embedder: &dyn TextEmbedder) -> Result<Self> {
        let dims = embedder.dims();

        if corpus.is_empty() {
            return Ok(Self {
                vectors: Vec::new(),
                dims,
            });
        }

        let queries = corpus.queries();
        let mut vectors = embedder.embed_batch(&queries).await?;

        if vectors.len() != corpus.len() {
            bail!(
                "Embedding count mismatch: {} vectors for {} records",
                vectors.len(),
                corpus.len()
            );
        }

        for (i, v) in vectors.iter_mut().enumerate() {
            if v.len() != dims {
                bail!(
                    "Embedding {} has {} dims, expected {}",
                    i,
                    v.len(),
                    dims
                );
            }
            l2_normalize(v);
        }

        Ok(Self { vectors, dims })
    }

    /// Construct directly from pre-computed vectors. Mainly for tests.
    pub fn from_vectors(mut vectors: Vec<Vec<f32>>, dims: usize) -> Self {
        for v in vectors.iter_mut() {
            l2_normalize(v);
        }
        Self { vectors, dims }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Return the `k` nearest corpus indices by inner product, highest
    /// similarity first. Returns fewer than `k` entries when the index
    /// holds fewer vectors, and an empty vector for an empty index.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, inner_product(query_vec, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Inner product of two vectors. Returns `0.0` for mismatched lengths.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_inner_product_mismatched_lengths() {
        assert_eq!(inner_product(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = EmbeddingIndex::from_vectors(
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
            3,
        );
        let results = index.search(&[0.0, 1.0, 0.0], 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, 1);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_search_truncates_to_k() {
        let index = EmbeddingIndex::from_vectors(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            2,
        );
        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn test_search_empty_index() {
        let index = EmbeddingIndex::from_vectors(Vec::new(), 4);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }
}
