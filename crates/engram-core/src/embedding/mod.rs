//! Embedding Facade
//!
//! Maps text to a fixed-dimension vector through pluggable backends:
//!
//! - **Synthetic**: deterministic hash-based features, no network. Always
//!   available; the `fast` tier and every test run on it.
//! - **Hosted adapters**: OpenAI / Gemini / Ollama over HTTP (feature
//!   `remote-embeddings`).
//! - **Hybrid tier**: weighted blend of synthetic + hosted, re-normalized so
//!   cosine similarity stays equivalent to dot product.
//!
//! Every vector leaving this module is finite, NaN-free, and L2-normalized.

mod synthetic;

#[cfg(feature = "remote-embeddings")]
mod remote;

pub use synthetic::SyntheticEmbedder;

#[cfg(feature = "remote-embeddings")]
pub use remote::RemoteEmbedder;

use crate::config::{EmbeddingProvider, EmbeddingTier, EngineConfig};
use crate::error::{EngineError, Result};

/// Blend weight for the synthetic component in `hybrid` tier.
pub const HYBRID_ALPHA: f32 = 0.5;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EmbedError {
    /// Backend could not be constructed (missing key, bad base URL)
    Init(String),
    /// Invalid input (empty text, non-finite output)
    InvalidInput(String),
    /// Transport failure talking to a hosted provider
    Transport { attempts: u32, message: String },
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::Init(e) => write!(f, "embedder init failed: {}", e),
            EmbedError::InvalidInput(e) => write!(f, "invalid embedding input: {}", e),
            EmbedError::Transport { attempts, message } => {
                write!(f, "embedding transport failed after {} attempt(s): {}", attempts, message)
            }
        }
    }
}

impl std::error::Error for EmbedError {}

impl From<EmbedError> for EngineError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::Init(m) => EngineError::Config(m),
            EmbedError::InvalidInput(m) => EngineError::InvalidInput(m),
            EmbedError::Transport { attempts, message } => {
                EngineError::BackendUnavailable { attempts, message }
            }
        }
    }
}

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// A text-to-vector backend. Output must be `dimensions()` long, finite,
/// and NaN-free; callers may assume unit norm.
pub trait Embedder: Send + Sync {
    /// Embed one text.
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError>;

    /// Output dimensionality (system-wide constant).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity of two equal-length vectors; 0.0 on length mismatch
/// or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { (dot / denom).clamp(-1.0, 1.0) } else { 0.0 }
}

/// Normalize to unit L2 norm in place. A zero vector gets a deterministic
/// unit basis vector instead so downstream cosine never divides by zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in v.iter_mut() {
            *x /= norm;
        }
    } else if !v.is_empty() {
        v.iter_mut().for_each(|x| *x = 0.0);
        v[0] = 1.0;
    }
}

/// Reject non-finite vectors before they reach the index.
pub fn validate_vector(v: &[f32], expected_dim: usize) -> Result<()> {
    if v.len() != expected_dim {
        return Err(EngineError::InvalidInput(format!(
            "vector dimension mismatch: expected {}, got {}",
            expected_dim,
            v.len()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(EngineError::InvalidInput(
            "vector contains NaN or infinite components".to_string(),
        ));
    }
    Ok(())
}

/// Encode a vector as little-endian f32 bytes for BLOB storage.
pub fn vector_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a BLOB back into a vector; `None` if the length is not a multiple
/// of four bytes.
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// TIER SELECTOR
// ============================================================================

/// The facade the rest of the engine embeds through. Selects one backend,
/// or blends two for the hybrid tier.
pub struct TieredEmbedder {
    tier: EmbeddingTier,
    synthetic: SyntheticEmbedder,
    #[cfg(feature = "remote-embeddings")]
    remote: Option<RemoteEmbedder>,
    dim: usize,
}

impl TieredEmbedder {
    /// Build from configuration. Hosted tiers require a provider other than
    /// `synthetic` (validated by `EngineConfig::validate`).
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let synthetic = SyntheticEmbedder::new(config.vec_dim);

        #[cfg(feature = "remote-embeddings")]
        let remote = match config.embeddings {
            EmbeddingProvider::Synthetic => None,
            provider => Some(RemoteEmbedder::from_env(provider, config.tier, config.vec_dim)?),
        };

        #[cfg(not(feature = "remote-embeddings"))]
        if config.embeddings != EmbeddingProvider::Synthetic {
            return Err(EngineError::Config(
                "hosted EMBEDDINGS require the remote-embeddings feature".to_string(),
            ));
        }

        Ok(Self {
            tier: config.tier,
            synthetic,
            #[cfg(feature = "remote-embeddings")]
            remote,
            dim: config.vec_dim,
        })
    }

    /// Synthetic-only facade, used by tests and the `fast` tier.
    pub fn synthetic(dim: usize) -> Self {
        Self {
            tier: EmbeddingTier::Fast,
            synthetic: SyntheticEmbedder::new(dim),
            #[cfg(feature = "remote-embeddings")]
            remote: None,
            dim,
        }
    }

    fn embed_semantic(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        #[cfg(feature = "remote-embeddings")]
        if let Some(remote) = &self.remote {
            return remote.embed(text);
        }
        // Hybrid with no hosted provider degenerates to synthetic.
        tracing::warn!("no hosted embedder configured; falling back to synthetic");
        self.synthetic.embed(text)
    }
}

impl Embedder for TieredEmbedder {
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let vector = match self.tier {
            EmbeddingTier::Fast => self.synthetic.embed(text)?,
            EmbeddingTier::Smart | EmbeddingTier::Deep => self.embed_semantic(text)?,
            EmbeddingTier::Hybrid => {
                let mut fast = self.synthetic.embed(text)?;
                // Hybrid degrades to the synthetic half when the hosted
                // provider is down; pure hosted tiers surface the error.
                match self.embed_semantic(text) {
                    Ok(semantic) => {
                        for (f, s) in fast.iter_mut().zip(semantic.iter()) {
                            *f = HYBRID_ALPHA * *f + (1.0 - HYBRID_ALPHA) * s;
                        }
                        l2_normalize(&mut fast);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "hybrid tier falling back to synthetic embedding");
                    }
                }
                fast
            }
        };
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::InvalidInput(
                "embedder produced non-finite components".to_string(),
            ));
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        match self.tier {
            EmbeddingTier::Fast => "synthetic",
            EmbeddingTier::Smart => "hosted",
            EmbeddingTier::Deep => "hosted-deep",
            EmbeddingTier::Hybrid => "hybrid",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_bounds() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0f32; 4];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[0.5, 0.5], 2).is_ok());
        assert!(validate_vector(&[0.5], 2).is_err());
        assert!(validate_vector(&[f32::NAN, 0.0], 2).is_err());
    }

    #[test]
    fn test_tiered_fast_is_unit_norm() {
        let embedder = TieredEmbedder::synthetic(64);
        let v = embedder.embed("hello world").unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
