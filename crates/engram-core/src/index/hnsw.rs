//! Approximate Vector Backend (HNSW via USearch)
//!
//! One HNSW index per (sector, partition). The HNSW structure cannot
//! pre-filter by user, so:
//!
//! - searches over-fetch `k * F` neighbors and post-filter on user id;
//! - users are hash-partitioned (`crc32(user_id) mod P`) so each query
//!   routes to a single partition and post-filtering happens inside it.
//!
//! Results are capped at k and may come back short when the requesting
//! user's density inside the over-fetched neighborhood is too low. That is
//! reported through the `degraded` flag, not as an error.
//!
//! Vectors are durably stored in the `vectors` table; the HNSW structures
//! are in-memory and rebuilt from it at startup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::embedding::validate_vector;
use crate::error::{EngineError, Result};
use crate::memory::Sector;
use crate::storage::Storage;

use super::{sort_and_truncate, IndexSearchOutcome, VectorIndex, VectorRow};

/// HNSW connectivity parameter (higher = better recall, more memory)
const CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
const EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
const EXPANSION_SEARCH: usize = 64;

// ============================================================================
// PARTITION
// ============================================================================

/// One HNSW index plus its key bookkeeping.
struct Partition {
    index: Index,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    id_to_user: HashMap<u64, String>,
    next_id: u64,
}

impl Partition {
    fn new(dim: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions: dim,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: CONNECTIVITY,
            expansion_add: EXPANSION_ADD,
            expansion_search: EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options)
            .map_err(|e| EngineError::Internal(format!("hnsw index creation failed: {e}")))?;
        Ok(Self {
            index,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            id_to_user: HashMap::new(),
            next_id: 0,
        })
    }

    fn add(&mut self, key: &str, user_id: &str, vector: &[f32]) -> Result<()> {
        if let Some(&existing) = self.key_to_id.get(key) {
            // Update: usearch has no in-place replace.
            self.index
                .remove(existing)
                .map_err(|e| EngineError::Internal(format!("hnsw remove failed: {e}")))?;
            self.reserve(self.index.size() + 1)?;
            self.index
                .add(existing, vector)
                .map_err(|e| EngineError::Internal(format!("hnsw add failed: {e}")))?;
            self.id_to_user.insert(existing, user_id.to_string());
            return Ok(());
        }

        // usearch requires reserve() before add() or it may fault.
        if self.index.size() >= self.index.capacity() {
            let new_capacity = std::cmp::max(self.index.capacity() * 2, 64);
            self.reserve(new_capacity)?;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| EngineError::Internal(format!("hnsw add failed: {e}")))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        self.id_to_user.insert(id, user_id.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.id_to_user.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| EngineError::Internal(format!("hnsw remove failed: {e}")))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn reserve(&self, capacity: usize) -> Result<()> {
        self.index
            .reserve(capacity)
            .map_err(|e| EngineError::Internal(format!("hnsw reserve failed: {e}")))
    }

    /// Raw neighbors: (key, cosine similarity, owning user).
    fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32, &str)>> {
        if self.index.size() == 0 {
            return Ok(vec![]);
        }
        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| EngineError::Internal(format!("hnsw search failed: {e}")))?;
        let mut out = Vec::with_capacity(matches.keys.len());
        for (id, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let (Some(key), Some(user)) = (self.id_to_key.get(id), self.id_to_user.get(id)) {
                // Cosine distance -> similarity.
                out.push((key.clone(), 1.0 - distance, user.as_str()));
            }
        }
        Ok(out)
    }
}

// ============================================================================
// HNSW INDEX
// ============================================================================

/// Hash-partitioned approximate backend.
pub struct HnswIndex {
    storage: Arc<Storage>,
    dim: usize,
    overfetch: usize,
    partition_count: u32,
    partitions: Mutex<HashMap<(Sector, u32), Partition>>,
}

impl HnswIndex {
    /// Build the in-memory structures and hydrate them from the durable
    /// `vectors` table.
    pub fn new(
        storage: Arc<Storage>,
        dim: usize,
        overfetch: usize,
        partition_count: u32,
    ) -> Result<Self> {
        let index = Self {
            storage,
            dim,
            overfetch: overfetch.max(1),
            partition_count: partition_count.max(1),
            partitions: Mutex::new(HashMap::new()),
        };
        index.rebuild()?;
        Ok(index)
    }

    fn partitions(&self) -> Result<MutexGuard<'_, HashMap<(Sector, u32), Partition>>> {
        self.partitions
            .lock()
            .map_err(|_| EngineError::Internal("hnsw partition lock poisoned".to_string()))
    }

    fn partition_for(&self, user_id: &str) -> u32 {
        crc32fast::hash(user_id.as_bytes()) % self.partition_count
    }

    /// Reload every vector row from storage. Rows whose dimension does not
    /// match the configured system dimension are skipped with a warning.
    fn rebuild(&self) -> Result<()> {
        let rows = self.storage.all_vector_rows()?;
        let mut partitions = self.partitions()?;
        partitions.clear();
        let mut skipped = 0usize;
        for row in rows {
            if row.vector.len() != self.dim {
                skipped += 1;
                continue;
            }
            let slot = (row.sector, self.partition_for(&row.user_id));
            let partition = match partitions.entry(slot) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => e.insert(Partition::new(self.dim)?),
            };
            partition.add(&row.id, &row.user_id, &row.vector)?;
        }
        if skipped > 0 {
            tracing::warn!(skipped, "skipped off-dimension vector rows during hnsw rebuild");
        }
        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn upsert(&self, id: &str, sector: Sector, user_id: &str, vector: &[f32]) -> Result<()> {
        validate_vector(vector, self.dim)?;
        // Durable row first; the in-memory index can always be rebuilt.
        self.storage.upsert_vector(id, sector, user_id, vector)?;

        let slot = (sector, self.partition_for(user_id));
        let mut partitions = self.partitions()?;
        let partition = match partitions.entry(slot) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(Partition::new(self.dim)?),
        };
        partition.add(id, user_id, vector)
    }

    fn delete(&self, id: &str, sector: Option<Sector>) -> Result<()> {
        self.storage.delete_vectors(id, sector)?;
        // The owning partition is keyed by user, which we no longer know;
        // probe every partition of the affected sector(s).
        let mut partitions = self.partitions()?;
        for ((s, _), partition) in partitions.iter_mut() {
            if sector.is_none() || sector == Some(*s) {
                partition.remove(id)?;
            }
        }
        Ok(())
    }

    fn search(
        &self,
        sector: Sector,
        query: &[f32],
        k: usize,
        user: Option<&str>,
    ) -> Result<IndexSearchOutcome> {
        if k == 0 {
            return Ok(IndexSearchOutcome::default());
        }
        validate_vector(query, self.dim)?;
        let fetch = k.saturating_mul(self.overfetch);

        let partitions = self.partitions()?;
        let mut raw_total = 0usize;
        let mut hits: Vec<(String, f32)> = Vec::new();

        let mut scan = |partition: &Partition| -> Result<()> {
            let raw = partition.search(query, fetch)?;
            raw_total += raw.len();
            for (key, score, owner) in raw {
                if user.is_none_or(|u| u == owner) {
                    hits.push((key, score));
                }
            }
            Ok(())
        };

        match user {
            Some(u) => {
                // One partition holds everything this user owns in the sector.
                if let Some(partition) = partitions.get(&(sector, self.partition_for(u))) {
                    scan(partition)?;
                }
            }
            None => {
                for ((s, _), partition) in partitions.iter() {
                    if *s == sector {
                        scan(partition)?;
                    }
                }
            }
        }
        drop(partitions);

        sort_and_truncate(&mut hits, k);
        // Degraded only when the neighborhood was deep enough but the
        // post-filter starved the result; a small index is not degraded.
        let degraded = hits.len() < k && raw_total >= k;
        Ok(IndexSearchOutcome { hits, degraded })
    }

    fn get(&self, id: &str, sector: Sector) -> Result<Option<Vec<f32>>> {
        self.storage.get_vector(id, sector)
    }

    fn by_sector(&self, sector: Sector) -> Result<Vec<VectorRow>> {
        self.storage.vector_rows_by_sector(sector, None)
    }
}

// ============================================================================
// TESTS
// ============================================================================
