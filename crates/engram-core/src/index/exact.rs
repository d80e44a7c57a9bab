//! Exact-Linear Vector Backend
//!
//! Vectors live as BLOB rows keyed by (id, sector). A search pre-filters by
//! (sector, user) in SQL, loads the surviving candidates, computes cosine in
//! process, and takes the top k. Exact results; latency grows linearly with
//! candidate count.

use std::sync::Arc;

use crate::embedding::{cosine_similarity, validate_vector};
use crate::error::Result;
use crate::memory::Sector;
use crate::storage::Storage;

use super::{sort_and_truncate, IndexSearchOutcome, VectorIndex, VectorRow};

/// SQL-prefiltered exact backend.
pub struct ExactIndex {
    storage: Arc<Storage>,
}

impl ExactIndex {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl VectorIndex for ExactIndex {
    fn upsert(&self, id: &str, sector: Sector, user_id: &str, vector: &[f32]) -> Result<()> {
        validate_vector(vector, vector.len())?;
        self.storage.upsert_vector(id, sector, user_id, vector)
    }

    fn delete(&self, id: &str, sector: Option<Sector>) -> Result<()> {
        self.storage.delete_vectors(id, sector)?;
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
        let candidates = self.storage.vector_rows_by_sector(sector, user)?;

        let mut hits: Vec<(String, f32)> = candidates
            .into_iter()
            .filter(|row| row.vector.len() == query.len())
            .map(|row| {
                let score = cosine_similarity(query, &row.vector);
                (row.id, score)
            })
            .collect();

        sort_and_truncate(&mut hits, k);
        // Exact: a short result only means there were fewer matches than k.
        Ok(IndexSearchOutcome {
            hits,
            degraded: false,
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_index() -> (ExactIndex, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(Some(dir.path().join("test.db"))).unwrap());
        (ExactIndex::new(storage), dir)
    }

    #[test]
    fn test_upsert_and_search() {
        let (index, _dir) = test_index();
        index.upsert("m1", Sector::Semantic, "alice", &[1.0, 0.0]).unwrap();
        index.upsert("m2", Sector::Semantic, "alice", &[0.0, 1.0]).unwrap();

        let outcome = index
            .search(Sector::Semantic, &[1.0, 0.1], 2, Some("alice"))
            .unwrap();
        assert_eq!(outcome.hits.len(), 2);
        assert_eq!(outcome.hits[0].0, "m1");
        assert!(!outcome.degraded);
        assert!(outcome.hits[0].1 > outcome.hits[1].1);
    }

    #[test]
    fn test_search_prefilters_user() {
        let (index, _dir) = test_index();
        index.upsert("m1", Sector::Semantic, "alice", &[1.0, 0.0]).unwrap();
        index.upsert("m2", Sector::Semantic, "bob", &[1.0, 0.0]).unwrap();

        let outcome = index
            .search(Sector::Semantic, &[1.0, 0.0], 10, Some("alice"))
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].0, "m1");
    }

    #[test]
    fn test_search_scoped_by_sector() {
        let (index, _dir) = test_index();
        index.upsert("m1", Sector::Semantic, "alice", &[1.0, 0.0]).unwrap();
        index.upsert("m1", Sector::Episodic, "alice", &[1.0, 0.0]).unwrap();

        let outcome = index
            .search(Sector::Episodic, &[1.0, 0.0], 10, None)
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(index.by_sector(Sector::Semantic).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_one_sector_row() {
        let (index, _dir) = test_index();
        index.upsert("m1", Sector::Semantic, "alice", &[1.0, 0.0]).unwrap();
        index.upsert("m1", Sector::Episodic, "alice", &[1.0, 0.0]).unwrap();

        index.delete("m1", Some(Sector::Semantic)).unwrap();
        assert!(index.get("m1", Sector::Semantic).unwrap().is_none());
        assert!(index.get("m1", Sector::Episodic).unwrap().is_some());

        index.delete("m1", None).unwrap();
        assert!(index.get("m1", Sector::Episodic).unwrap().is_none());
    }

    #[test]
    fn test_scores_within_cosine_bounds() {
        let (index, _dir) = test_index();
        index.upsert("m1", Sector::Semantic, "alice", &[1.0, 0.0]).unwrap();
        index.upsert("m2", Sector::Semantic, "alice", &[-1.0, 0.0]).unwrap();

        let outcome = index.search(Sector::Semantic, &[1.0, 0.0], 10, None).unwrap();
        for (_, score) in &outcome.hits {
            assert!(*score >= -1.0 && *score <= 1.0);
        }
    }
}
