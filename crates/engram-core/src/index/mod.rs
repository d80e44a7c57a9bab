//! Pluggable Vector Index
//!
//! Two backends behind one trait:
//!
//! - **Exact-linear**: pre-filters candidates by (sector, user) in SQL,
//!   computes cosine in process, returns exactly `min(k, matches)`. Right
//!   choice for small datasets.
//! - **Approximate (HNSW)**: per-(sector, partition) USearch indexes. The
//!   index cannot pre-filter by user, so searches over-fetch `k * F`
//!   neighbors and post-filter; results may come back short. Users are hash
//!   partitioned so a query touches one partition.
//!
//! All scores are cosine similarity in [-1, 1].

mod exact;

#[cfg(feature = "approx-search")]
mod hnsw;

pub use exact::ExactIndex;

#[cfg(feature = "approx-search")]
pub use hnsw::HnswIndex;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::memory::Sector;
use crate::storage::Storage;

// ============================================================================
// TYPES
// ============================================================================

/// One stored vector row.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub id: String,
    pub sector: Sector,
    pub user_id: String,
    pub vector: Vec<f32>,
}

/// Result of a vector search: scored ids plus the degraded flag for
/// approximate backends that could not fill `k` after post-filtering.
#[derive(Debug, Clone, Default)]
pub struct IndexSearchOutcome {
    /// (memory id, cosine similarity), best first, ties by id ascending.
    pub hits: Vec<(String, f32)>,
    /// The backend returned fewer than `k` hits for capacity reasons
    /// (never set by the exact backend).
    pub degraded: bool,
}

// ============================================================================
// TRAIT
// ============================================================================

/// Contract every vector backend implements. All operations are scoped by
/// sector; search additionally scopes by user when one is given.
pub trait VectorIndex: Send + Sync {
    /// Store a vector. Idempotent on (id, sector); last write wins.
    fn upsert(&self, id: &str, sector: Sector, user_id: &str, vector: &[f32]) -> Result<()>;

    /// Remove one sector row, or every sector row of the id.
    fn delete(&self, id: &str, sector: Option<Sector>) -> Result<()>;

    /// Top-k by cosine similarity. Exact backends return exactly
    /// `min(k, matches)`; approximate backends may return fewer.
    fn search(
        &self,
        sector: Sector,
        query: &[f32],
        k: usize,
        user: Option<&str>,
    ) -> Result<IndexSearchOutcome>;

    /// Fetch one stored vector.
    fn get(&self, id: &str, sector: Sector) -> Result<Option<Vec<f32>>>;

    /// All rows in a sector, for offline iteration.
    fn by_sector(&self, sector: Sector) -> Result<Vec<VectorRow>>;
}

/// Build the configured backend over shared storage.
pub fn build_index(
    config: &EngineConfig,
    storage: Arc<Storage>,
) -> Result<Arc<dyn VectorIndex>> {
    if config.use_approx_vector {
        #[cfg(feature = "approx-search")]
        {
            let index = HnswIndex::new(
                storage,
                config.vec_dim,
                config.overfetch_factor,
                config.vector_partitions,
            )?;
            return Ok(Arc::new(index));
        }
        #[cfg(not(feature = "approx-search"))]
        return Err(crate::error::EngineError::Config(
            "USE_APPROX_VECTOR=true requires the approx-search feature".to_string(),
        ));
    }
    Ok(Arc::new(ExactIndex::new(storage)))
}

/// Sort hits best-first with a stable id tie-break, then truncate.
pub(crate) fn sort_and_truncate(hits: &mut Vec<(String, f32)>, k: usize) {
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    hits.truncate(k);
}
