//! Environment-Driven Configuration
//!
//! All knobs the engine recognizes, read once at startup and carried as a
//! context object. Nothing in the core reads the environment after
//! `EngineConfig::from_env()` returns.
//!
//! Recognized keys:
//!
//! | Key | Values | Default |
//! |-----|--------|---------|
//! | `USE_APPROX_VECTOR` | true / false | false (exact-linear) |
//! | `METADATA_BACKEND` | sqlite / postgres | sqlite |
//! | `EMBEDDINGS` | synthetic / openai / gemini / ollama | synthetic |
//! | `TIER` | fast / smart / deep / hybrid | fast |
//! | `VEC_DIM` | positive integer | 768 |
//! | `CACHE_ENABLED` | true / false | true |
//! | `COACTIVATION_MODE` | cron / interval / disabled | cron |
//! | `OVERFETCH_FACTOR` | integer >= 1 | 3 |
//! | `VECTOR_PARTITIONS` | power of two | 8 |
//! | `ENGRAM_DB_PATH` | filesystem path | platform data dir |

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::memory::Sector;

// ============================================================================
// ENUMS
// ============================================================================

/// Metadata storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Sqlite,
    Postgres,
}

/// Embedding provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Synthetic,
    Openai,
    Gemini,
    Ollama,
}

/// Embedding tier: which backend (or blend) serves `embed()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingTier {
    /// Synthetic hash embedder only; no network.
    #[default]
    Fast,
    /// Hosted provider only.
    Smart,
    /// Hosted provider, larger model where the provider offers one.
    Deep,
    /// Weighted blend of synthetic + hosted, L2-renormalized.
    Hybrid,
}

/// How query-time coactivations are turned into waypoint edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoactivationMode {
    /// Durable job queue drained by a worker. Recommended; survives crashes.
    #[default]
    Cron,
    /// Legacy in-memory buffer flushed on a timer. Loses data on crash.
    Interval,
    /// No coactivation tracking.
    Disabled,
}

// ============================================================================
// PER-SECTOR TUNING
// ============================================================================

/// Per-sector tuning knobs for salience decay and waypoint maintenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SectorParams {
    /// Exponential decay rate (per day) applied to salience.
    pub decay_rate: f64,
    /// Salience never decays below this floor.
    pub salience_floor: f64,
    /// Minimum cosine similarity to join an existing waypoint; below this a
    /// new waypoint is created.
    pub waypoint_threshold: f32,
    /// Members a waypoint can hold; a full waypoint overflows into a new one.
    pub max_members: usize,
    /// Maximum waypoint neighbors considered per hop during expansion.
    pub max_neighbors: usize,
    /// Salience step added on reinforcement, capped at 1.0.
    pub reinforcement_step: f64,
}

impl Default for SectorParams {
    fn default() -> Self {
        Self {
            decay_rate: 0.02,
            salience_floor: 0.05,
            waypoint_threshold: 0.72,
            max_members: 32,
            max_neighbors: 8,
            reinforcement_step: 0.1,
        }
    }
}

impl SectorParams {
    /// Defaults tuned per sector: episodic detail fades fastest, procedural
    /// knowledge is sticky.
    pub fn for_sector(sector: Sector) -> Self {
        let base = Self::default();
        match sector {
            Sector::Episodic => Self {
                decay_rate: 0.05,
                ..base
            },
            Sector::Emotional => Self {
                decay_rate: 0.03,
                salience_floor: 0.1,
                ..base
            },
            Sector::Procedural => Self {
                decay_rate: 0.008,
                ..base
            },
            Sector::Reflective => Self {
                decay_rate: 0.015,
                ..base
            },
            Sector::Semantic => base,
        }
    }
}

// ============================================================================
// RANKING WEIGHTS
// ============================================================================

/// Weights for the contextual re-rank formula:
/// `final = alpha * cosine + beta * salience + gamma * recency + delta * path_bonus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub delta: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            alpha: 0.55,
            beta: 0.20,
            gamma: 0.15,
            delta: 0.10,
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Full engine configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HNSW approximate backend instead of exact-linear.
    pub use_approx_vector: bool,
    /// Metadata store. Only sqlite is compiled into this build.
    pub metadata_backend: MetadataBackend,
    /// Embedding provider for the semantic tiers.
    pub embeddings: EmbeddingProvider,
    /// Embedding tier / blending strategy.
    pub tier: EmbeddingTier,
    /// System-wide vector dimension; must match the embedder output.
    pub vec_dim: usize,
    /// Query-result cache on/off (60 s TTL when on).
    pub cache_enabled: bool,
    /// Coactivation reconciliation mode.
    pub coactivation_mode: CoactivationMode,
    /// Over-fetch multiplier for post-filtering backends (F >= 1).
    pub overfetch_factor: usize,
    /// Hash partition count for the approximate backend (power of two).
    pub vector_partitions: u32,
    /// Database file path; `None` resolves to the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Per-sector tuning.
    pub sector_params: HashMap<Sector, SectorParams>,
    /// Contextual re-rank weights.
    pub rank_weights: RankWeights,
    /// Hard cap on waypoint neighbors visited during query expansion.
    pub max_expansion: usize,
    /// Query-result cache TTL in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let sector_params = Sector::ALL
            .iter()
            .map(|&s| (s, SectorParams::for_sector(s)))
            .collect();
        Self {
            use_approx_vector: false,
            metadata_backend: MetadataBackend::Sqlite,
            embeddings: EmbeddingProvider::Synthetic,
            tier: EmbeddingTier::Fast,
            vec_dim: 768,
            cache_enabled: true,
            coactivation_mode: CoactivationMode::Cron,
            overfetch_factor: 3,
            vector_partitions: 8,
            db_path: None,
            sector_params,
            rank_weights: RankWeights::default(),
            max_expansion: 12,
            cache_ttl_secs: 60,
        }
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(EngineError::Config(format!(
                "{key} must be true or false, got '{other}'"
            ))),
        },
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Read configuration from the environment. Unknown values for a
    /// recognized key are a startup error, never a silent default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.use_approx_vector = env_bool("USE_APPROX_VECTOR", false)?;
        config.cache_enabled = env_bool("CACHE_ENABLED", true)?;

        if let Ok(v) = std::env::var("METADATA_BACKEND") {
            config.metadata_backend = match v.trim().to_ascii_lowercase().as_str() {
                "sqlite" => MetadataBackend::Sqlite,
                "postgres" => MetadataBackend::Postgres,
                other => {
                    return Err(EngineError::Config(format!(
                        "METADATA_BACKEND must be sqlite or postgres, got '{other}'"
                    )));
                }
            };
        }

        if let Ok(v) = std::env::var("EMBEDDINGS") {
            config.embeddings = match v.trim().to_ascii_lowercase().as_str() {
                "synthetic" => EmbeddingProvider::Synthetic,
                "openai" => EmbeddingProvider::Openai,
                "gemini" => EmbeddingProvider::Gemini,
                "ollama" => EmbeddingProvider::Ollama,
                other => {
                    return Err(EngineError::Config(format!(
                        "EMBEDDINGS must be synthetic, openai, gemini or ollama, got '{other}'"
                    )));
                }
            };
        }

        if let Ok(v) = std::env::var("TIER") {
            config.tier = match v.trim().to_ascii_lowercase().as_str() {
                "fast" => EmbeddingTier::Fast,
                "smart" => EmbeddingTier::Smart,
                "deep" => EmbeddingTier::Deep,
                "hybrid" => EmbeddingTier::Hybrid,
                other => {
                    return Err(EngineError::Config(format!(
                        "TIER must be fast, smart, deep or hybrid, got '{other}'"
                    )));
                }
            };
        }

        if let Ok(v) = std::env::var("VEC_DIM") {
            config.vec_dim = v.trim().parse::<usize>().ok().filter(|d| *d > 0).ok_or_else(
                || EngineError::Config(format!("VEC_DIM must be a positive integer, got '{v}'")),
            )?;
        }

        if let Ok(v) = std::env::var("COACTIVATION_MODE") {
            config.coactivation_mode = match v.trim().to_ascii_lowercase().as_str() {
                "cron" => CoactivationMode::Cron,
                "interval" => CoactivationMode::Interval,
                "disabled" => CoactivationMode::Disabled,
                other => {
                    return Err(EngineError::Config(format!(
                        "COACTIVATION_MODE must be cron, interval or disabled, got '{other}'"
                    )));
                }
            };
        }

        if let Ok(v) = std::env::var("OVERFETCH_FACTOR") {
            config.overfetch_factor = v
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|f| *f >= 1)
                .ok_or_else(|| {
                    EngineError::Config(format!("OVERFETCH_FACTOR must be an integer >= 1, got '{v}'"))
                })?;
        }

        if let Ok(v) = std::env::var("VECTOR_PARTITIONS") {
            config.vector_partitions = v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|p| *p >= 1 && p.is_power_of_two())
                .ok_or_else(|| {
                    EngineError::Config(format!(
                        "VECTOR_PARTITIONS must be a power of two, got '{v}'"
                    ))
                })?;
        }

        if let Ok(v) = std::env::var("ENGRAM_DB_PATH") {
            if !v.trim().is_empty() {
                config.db_path = Some(PathBuf::from(v));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation, also run by `from_env`.
    pub fn validate(&self) -> Result<()> {
        if self.metadata_backend == MetadataBackend::Postgres {
            return Err(EngineError::Config(
                "METADATA_BACKEND=postgres is not compiled into this build; use sqlite".to_string(),
            ));
        }
        #[cfg(not(feature = "approx-search"))]
        if self.use_approx_vector {
            return Err(EngineError::Config(
                "USE_APPROX_VECTOR=true requires the approx-search feature".to_string(),
            ));
        }
        #[cfg(not(feature = "remote-embeddings"))]
        if self.embeddings != EmbeddingProvider::Synthetic {
            return Err(EngineError::Config(
                "hosted EMBEDDINGS require the remote-embeddings feature".to_string(),
            ));
        }
        if self.embeddings == EmbeddingProvider::Synthetic
            && matches!(self.tier, EmbeddingTier::Smart | EmbeddingTier::Deep)
        {
            return Err(EngineError::Config(
                "TIER=smart/deep needs a hosted EMBEDDINGS provider".to_string(),
            ));
        }
        Ok(())
    }

    /// Tuning for one sector (falls back to defaults for unknown entries).
    pub fn params(&self, sector: Sector) -> SectorParams {
        self.sector_params
            .get(&sector)
            .copied()
            .unwrap_or_else(|| SectorParams::for_sector(sector))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.use_approx_vector);
        assert_eq!(config.metadata_backend, MetadataBackend::Sqlite);
        assert_eq!(config.embeddings, EmbeddingProvider::Synthetic);
        assert_eq!(config.tier, EmbeddingTier::Fast);
        assert_eq!(config.vec_dim, 768);
        assert!(config.cache_enabled);
        assert_eq!(config.coactivation_mode, CoactivationMode::Cron);
        assert_eq!(config.overfetch_factor, 3);
        assert_eq!(config.vector_partitions, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_rejected() {
        let config = EngineConfig {
            metadata_backend: MetadataBackend::Postgres,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_smart_tier_needs_provider() {
        let config = EngineConfig {
            tier: EmbeddingTier::Smart,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sector_params_differ() {
        let episodic = SectorParams::for_sector(Sector::Episodic);
        let procedural = SectorParams::for_sector(Sector::Procedural);
        assert!(episodic.decay_rate > procedural.decay_rate);
    }
}
