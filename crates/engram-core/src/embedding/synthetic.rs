//! Synthetic Hash Embedder
//!
//! Deterministic feature hashing: each token (and adjacent token bigram) is
//! hashed into a bucket of the output vector with a +/- sign, weights are
//! accumulated, and the result is L2-normalized. No model files, no network,
//! stable across runs and platforms.
//!
//! The geometry is crude but useful: shared vocabulary means shared buckets,
//! so lexically-related texts land near each other. That is what the `fast`
//! tier trades semantic nuance for.

use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbedError, Embedder};

/// Bigrams get less weight than unigrams.
const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic hash-based embedder.
#[derive(Debug, Clone)]
pub struct SyntheticEmbedder {
    dim: usize,
}

impl SyntheticEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let bucket = u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes"))
            as usize
            % self.dim;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for SyntheticEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dim];

        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            // Whitespace-only or punctuation-only text still gets a stable,
            // finite vector: hash the raw bytes.
            self.accumulate(&mut vector, text, 1.0);
        } else {
            let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
            for token in &lowered {
                self.accumulate(&mut vector, token, 1.0);
            }
            for pair in lowered.windows(2) {
                self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = SyntheticEmbedder::new(128);
        let a = embedder.embed("the quick brown fox").unwrap();
        let b = embedder.embed("the quick brown fox").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unit_norm_and_finite() {
        let embedder = SyntheticEmbedder::new(128);
        for text in ["hello", "", "   ", "a b c d e f g", "!!!"] {
            let v = embedder.embed(text).unwrap();
            assert_eq!(v.len(), 128);
            assert!(v.iter().all(|x| x.is_finite()));
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm {} for {:?}", norm, text);
        }
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = SyntheticEmbedder::new(256);
        let base = embedder.embed("rust memory safety ownership").unwrap();
        let related = embedder.embed("rust ownership model").unwrap();
        let unrelated = embedder.embed("banana smoothie recipe blender").unwrap();
        assert!(
            cosine_similarity(&base, &related) > cosine_similarity(&base, &unrelated),
            "lexical overlap should raise similarity"
        );
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = SyntheticEmbedder::new(128);
        let a = embedder.embed("Hello World").unwrap();
        let b = embedder.embed("hello world").unwrap();
        assert_eq!(a, b);
    }
}
