//! Hierarchical Semantic Graph Core
//!
//! Insert and query orchestration over the vector index and the waypoint
//! associative layer:
//!
//! - **Insert**: embed, classify, write the memory row, then one vector row
//!   per assigned sector, attaching each to the nearest waypoint (or seeding
//!   a new one when similarity falls below the sector threshold).
//! - **Query**: per-sector candidate retrieval with over-fetch, waypoint
//!   expansion bounded by a hard neighbor budget, lazy-decay re-ranking,
//!   path traces, and a coactivation publish on completion.
//!
//! Salience decays as `exp(-rate * days)` with a per-sector floor; reads
//! apply it lazily, and a periodic sweep persists it.

mod waypoint;

pub use waypoint::{nearest, WaypointRecord};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::coactivation::{CoactivationQueue, MemoryActivation};
use crate::config::EngineConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Deadline, EngineError, Result};
use crate::index::VectorIndex;
use crate::memory::{
    scope_user, InsertInput, InsertOutcome, MemoryRecord, SearchHit, SearchOptions,
    SearchResponse, Sector,
};
use crate::sector::SectorClassifier;
use crate::storage::Storage;

/// Initial salience for new memories.
const INITIAL_SALIENCE: f64 = 0.5;

/// How many top candidates seed the waypoint expansion.
const EXPANSION_SEEDS: usize = 5;

/// Page size for the decay sweep.
const DECAY_PAGE: usize = 500;

/// Salience changes below this are not written back by the sweep.
const DECAY_EPSILON: f64 = 1e-4;

// ============================================================================
// HSG
// ============================================================================

/// The HSG core: memory rows, waypoint graph, salience, orchestration.
pub struct Hsg {
    storage: Arc<Storage>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    classifier: SectorClassifier,
    queue: Arc<CoactivationQueue>,
    config: Arc<EngineConfig>,
}

/// A retrieval candidate before re-ranking.
struct Candidate {
    sector: Sector,
    cosine: f32,
    /// Waypoint ids traversed to reach this memory (empty for direct hits
    /// whose waypoint is unknown).
    path: Vec<String>,
    /// Waypoint hops from a direct hit (0 = nearest-neighbor candidate).
    hops: usize,
}

impl Hsg {
    pub fn new(
        storage: Arc<Storage>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        queue: Arc<CoactivationQueue>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            storage,
            index,
            embedder,
            classifier: SectorClassifier::new(),
            queue,
            config,
        }
    }

    // ========================================================================
    // INSERT
    // ========================================================================

    /// Store a memory: embed, classify, persist the row, then one vector row
    /// and waypoint attachment per assigned sector.
    ///
    /// The memory row lands first; a crash between it and the vector rows
    /// leaves a partial row that queries skip and a retry overwrites
    /// (inserts are at-least-once under id uniqueness).
    pub fn insert(&self, input: InsertInput, deadline: Deadline) -> Result<InsertOutcome> {
        let input = input.normalize()?;
        let user_id = scope_user(input.user.as_deref()).to_string();

        deadline.check()?;
        let vector = self.embedder.embed(&input.content)?;
        let assignment = self.classifier.classify(&input.content);

        let now = Utc::now();
        let memory = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            content: input.content,
            primary_sector: assignment.primary,
            sectors: assignment.sectors.clone(),
            tags: input.tags,
            metadata: input.metadata,
            salience: INITIAL_SALIENCE,
            created_at: now,
            last_seen_at: now,
        };

        deadline.check()?;
        self.storage.insert_memory(&memory)?;

        for &sector in &assignment.sectors {
            deadline.check()?;
            self.index.upsert(&memory.id, sector, &user_id, &vector)?;
            self.attach_to_waypoint(sector, &memory.id, &vector, now)?;
        }

        Ok(InsertOutcome {
            id: memory.id,
            primary_sector: assignment.primary,
            sectors: assignment.sectors,
        })
    }

    /// Join the nearest waypoint in the sector, or seed a new one when the
    /// best similarity is under the sector threshold.
    fn attach_to_waypoint(
        &self,
        sector: Sector,
        memory_id: &str,
        vector: &[f32],
        now: DateTime<Utc>,
    ) -> Result<String> {
        let params = self.config.params(sector);
        let waypoints = self.storage.waypoints_by_sector(sector)?;

        if let Some((best, score)) = nearest(&waypoints, vector) {
            // A full waypoint overflows into a new one.
            if score >= params.waypoint_threshold && best.member_ids.len() < params.max_members {
                let mut joined = best.clone();
                joined.absorb(memory_id, vector)?;
                self.storage
                    .update_waypoint(&joined.id, &joined.mean, &joined.member_ids)?;
                return Ok(joined.id);
            }
        }

        let seeded = WaypointRecord::seed(sector, memory_id, vector, now);
        self.storage.insert_waypoint(&seeded)?;
        Ok(seeded.id)
    }

    // ========================================================================
    // QUERY
    // ========================================================================

    /// Contextual query: retrieve, expand, re-rank, trace, publish.
    pub fn query(&self, query_text: &str, options: &SearchOptions) -> Result<SearchResponse> {
        let query_text = query_text.trim();
        if query_text.is_empty() {
            return Err(EngineError::InvalidInput("query must be non-empty".to_string()));
        }
        let k = options.limit.max(1);
        let user = options.user.as_deref();

        options.deadline.check()?;
        let query_vector = self.embedder.embed(query_text)?;

        let sectors: Vec<Sector> = options
            .sectors
            .clone()
            .unwrap_or_else(|| Sector::ALL.to_vec());

        // Candidate retrieval: over-fetched per sector, deduplicated by
        // memory id keeping the best cosine.
        let fetch = k.saturating_mul(self.config.overfetch_factor);
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut degraded = false;

        for &sector in &sectors {
            options.deadline.check()?;
            let outcome = self.index.search(sector, &query_vector, fetch, user)?;
            degraded |= outcome.degraded;
            for (id, cosine) in outcome.hits {
                match candidates.get_mut(&id) {
                    Some(existing) if existing.cosine >= cosine => {}
                    Some(existing) => {
                        existing.cosine = cosine;
                        existing.sector = sector;
                    }
                    None => {
                        candidates.insert(
                            id,
                            Candidate {
                                sector,
                                cosine,
                                path: Vec::new(),
                                hops: 0,
                            },
                        );
                    }
                }
            }
        }

        options.deadline.check()?;
        self.expand_candidates(&query_vector, &sectors, &mut candidates)?;

        // Resolve rows, enforce visibility, re-rank.
        let ids: Vec<String> = candidates.keys().cloned().collect();
        options.deadline.check()?;
        let rows = self.storage.memories_by_ids(&ids)?;

        let now = Utc::now();
        let weights = self.config.rank_weights;
        let mut hits: Vec<SearchHit> = Vec::with_capacity(rows.len());
        for memory in rows {
            // Waypoint expansion can surface other tenants' members; the
            // visibility check here is what the isolation property tests.
            if !memory.visible_to(user) {
                continue;
            }
            let candidate = match candidates.get(&memory.id) {
                Some(c) => c,
                None => continue,
            };
            let params = self.config.params(memory.primary_sector);
            let salience = effective_salience(
                memory.salience,
                memory.last_seen_at,
                params.decay_rate,
                params.salience_floor,
                now,
            );
            if let Some(min) = options.min_salience {
                if salience < min {
                    continue;
                }
            }
            let recency = recency_factor(memory.last_seen_at, params.decay_rate, now);
            let path_bonus = 1.0 / (1.0 + candidate.hops as f32);
            let score = weights.alpha * candidate.cosine
                + weights.beta * salience as f32
                + weights.gamma * recency
                + weights.delta * path_bonus;

            hits.push(SearchHit {
                score,
                cosine: candidate.cosine,
                path: candidate.path.clone(),
                memory,
            });
        }

        // Stable order: score descending, ties by id ascending.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        hits.truncate(k);

        // Publish the coactivation event; failure to enqueue must not fail
        // the query.
        let activations: Vec<MemoryActivation> = hits
            .iter()
            .map(|h| MemoryActivation {
                id: h.memory.id.clone(),
                sector: candidates
                    .get(&h.memory.id)
                    .map(|c| c.sector)
                    .unwrap_or(h.memory.primary_sector),
            })
            .collect();
        if !activations.is_empty() {
            if let Err(e) = self.queue.publish(activations, now) {
                tracing::warn!(error = %e, "failed to publish coactivation event");
            }
        }

        Ok(SearchResponse { hits, degraded })
    }

    /// Breadth-first waypoint expansion from the top candidates' waypoints.
    ///
    /// The neighbor budget is a hard cap: it is checked before admitting
    /// each neighbor, so a dense graph can never overshoot in one batch.
    fn expand_candidates(
        &self,
        query_vector: &[f32],
        sectors: &[Sector],
        candidates: &mut HashMap<String, Candidate>,
    ) -> Result<()> {
        let max_exp = self.config.max_expansion;
        if max_exp == 0 || candidates.is_empty() {
            return Ok(());
        }

        // Membership maps for the involved sectors.
        let mut waypoints_by_id: HashMap<String, WaypointRecord> = HashMap::new();
        let mut member_to_waypoint: HashMap<String, String> = HashMap::new();
        for &sector in sectors {
            for waypoint in self.storage.waypoints_by_sector(sector)? {
                for member in &waypoint.member_ids {
                    member_to_waypoint.insert(member.clone(), waypoint.id.clone());
                }
                waypoints_by_id.insert(waypoint.id.clone(), waypoint);
            }
        }

        // Seeds: waypoints of the best direct candidates, and the direct
        // hits get their path trace stamped on the way.
        let mut ranked: Vec<(&String, f32)> = candidates
            .iter()
            .map(|(id, c)| (id, c.cosine))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        let seed_ids: Vec<String> = ranked
            .iter()
            .take(EXPANSION_SEEDS)
            .filter_map(|(id, _)| member_to_waypoint.get(*id).cloned())
            .collect();

        for (member, waypoint_id) in &member_to_waypoint {
            if let Some(candidate) = candidates.get_mut(member) {
                if candidate.path.is_empty() {
                    candidate.path.push(waypoint_id.clone());
                }
            }
        }

        let mut visited: HashSet<String> = seed_ids.iter().cloned().collect();
        let mut frontier: VecDeque<(String, Vec<String>, usize)> = seed_ids
            .iter()
            .map(|id| (id.clone(), vec![id.clone()], 0))
            .collect();
        let mut admitted = 0usize;

        'expansion: while let Some((waypoint_id, path, hops)) = frontier.pop_front() {
            let per_hop = self
                .config
                .params(
                    waypoints_by_id
                        .get(&waypoint_id)
                        .map(|w| w.sector)
                        .unwrap_or(Sector::Semantic),
                )
                .max_neighbors;

            let neighbors = self.storage.edges_for_waypoint(&waypoint_id)?;
            for (neighbor_id, _weight) in neighbors.into_iter().take(per_hop) {
                if visited.contains(&neighbor_id) {
                    continue;
                }
                // Hard cap, checked before admission.
                if admitted >= max_exp {
                    break 'expansion;
                }
                admitted += 1;
                visited.insert(neighbor_id.clone());

                let mut neighbor_path = path.clone();
                neighbor_path.push(neighbor_id.clone());

                if let Some(neighbor) = waypoints_by_id.get(&neighbor_id) {
                    for member in &neighbor.member_ids {
                        if candidates.contains_key(member) {
                            continue;
                        }
                        // Partial rows (no vector yet) are skipped.
                        let Some(vector) = self.index.get(member, neighbor.sector)? else {
                            continue;
                        };
                        candidates.insert(
                            member.clone(),
                            Candidate {
                                sector: neighbor.sector,
                                cosine: cosine_similarity(query_vector, &vector),
                                path: neighbor_path.clone(),
                                hops: hops + 1,
                            },
                        );
                    }
                }
                frontier.push_back((neighbor_id, neighbor_path, hops + 1));
            }
        }

        Ok(())
    }

    // ========================================================================
    // REINFORCE / DECAY
    // ========================================================================

    /// Bump salience by the sector's reinforcement step (capped at 1.0) and
    /// refresh `last_seen_at`.
    pub fn reinforce(&self, id: &str, user: Option<&str>) -> Result<()> {
        let memory = self
            .storage
            .get_memory(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if let Some(u) = user {
            if memory.user_id != u {
                return Err(EngineError::not_found_for_user(id));
            }
        }
        let step = self.config.params(memory.primary_sector).reinforcement_step;
        self.storage.reinforce_memory(id, step, Utc::now())?;
        Ok(())
    }

    /// Persist decayed salience across all memories, sector by sector, in
    /// pages. Returns how many rows were updated.
    pub fn run_decay_sweep(&self) -> Result<u64> {
        let now = Utc::now();
        let mut updated = 0u64;
        for &sector in &Sector::ALL {
            let params = self.config.params(sector);
            let mut offset = 0usize;
            loop {
                let page = self.storage.salience_page(sector, DECAY_PAGE, offset)?;
                if page.is_empty() {
                    break;
                }
                let mut changes = Vec::new();
                for (id, salience, last_seen) in &page {
                    let decayed = effective_salience(
                        *salience,
                        *last_seen,
                        params.decay_rate,
                        params.salience_floor,
                        now,
                    );
                    if (salience - decayed).abs() > DECAY_EPSILON {
                        changes.push((id.clone(), decayed));
                    }
                }
                updated += changes.len() as u64;
                self.storage.update_salience_batch(&changes)?;
                if page.len() < DECAY_PAGE {
                    break;
                }
                offset += DECAY_PAGE;
            }
        }
        tracing::debug!(updated, "decay sweep complete");
        Ok(updated)
    }

    // ========================================================================
    // DELETE / WIPE
    // ========================================================================

    /// Cascaded delete: memory row, every sector vector row, and waypoint
    /// membership. Empty waypoints are removed.
    pub fn delete(&self, id: &str, user: Option<&str>) -> Result<bool> {
        let Some(memory) = self.storage.get_memory(id)? else {
            return Ok(false);
        };
        if let Some(u) = user {
            if memory.user_id != u {
                return Err(EngineError::not_found_for_user(id));
            }
        }

        for &sector in &memory.sectors {
            let vector = self.index.get(id, sector)?;
            self.detach_from_waypoints(sector, id, vector.as_deref())?;
        }
        self.index.delete(id, None)?;
        self.storage.delete_memory(id)
    }

    fn detach_from_waypoints(
        &self,
        sector: Sector,
        memory_id: &str,
        vector: Option<&[f32]>,
    ) -> Result<()> {
        for waypoint in self.storage.waypoints_by_sector(sector)? {
            if !waypoint.contains(memory_id) {
                continue;
            }
            let mut updated = waypoint;
            let empty = updated.release(memory_id, vector)?;
            if empty {
                self.storage.delete_waypoint(&updated.id)?;
            } else {
                self.storage
                    .update_waypoint(&updated.id, &updated.mean, &updated.member_ids)?;
            }
        }
        Ok(())
    }

    /// Remove all memories in scope (and everything when unscoped).
    pub fn wipe(&self, user: Option<&str>) -> Result<u64> {
        if user.is_none() {
            let ids = self.storage.wipe_memories(None)?;
            self.storage.wipe_vectors(None)?;
            self.storage.wipe_waypoints()?;
            return Ok(ids.len() as u64);
        }

        let ids = self.storage.wipe_memories(user)?;
        let removed: HashSet<&String> = ids.iter().collect();
        for &sector in &Sector::ALL {
            for waypoint in self.storage.waypoints_by_sector(sector)? {
                if !waypoint.member_ids.iter().any(|m| removed.contains(m)) {
                    continue;
                }
                let mut updated = waypoint;
                for id in ids.iter() {
                    if updated.contains(id) {
                        let vector = self.index.get(id, sector)?;
                        updated.release(id, vector.as_deref())?;
                    }
                }
                if updated.member_ids.is_empty() {
                    self.storage.delete_waypoint(&updated.id)?;
                } else {
                    self.storage
                        .update_waypoint(&updated.id, &updated.mean, &updated.member_ids)?;
                }
            }
        }
        for id in &ids {
            self.index.delete(id, None)?;
        }
        self.storage.wipe_vectors(user)?;
        Ok(ids.len() as u64)
    }
}

// ============================================================================
// SCORING HELPERS
// ============================================================================

/// Salience after lazy exponential decay since last access, floored.
pub fn effective_salience(
    salience: f64,
    last_seen: DateTime<Utc>,
    decay_rate: f64,
    floor: f64,
    now: DateTime<Utc>,
) -> f64 {
    let days = (now - last_seen).num_milliseconds().max(0) as f64 / 86_400_000.0;
    (salience * (-decay_rate * days).exp()).max(floor)
}

/// Recency component of the re-rank formula, in (0, 1].
fn recency_factor(last_seen: DateTime<Utc>, decay_rate: f64, now: DateTime<Utc>) -> f32 {
    let days = (now - last_seen).num_milliseconds().max(0) as f64 / 86_400_000.0;
    (-decay_rate * days).exp() as f32
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coactivation::CoactivationQueue;
    use crate::config::CoactivationMode;
    use crate::embedding::TieredEmbedder;
    use crate::index::ExactIndex;
    use tempfile::TempDir;

    const DIM: usize = 64;

    fn test_hsg() -> (Hsg, Arc<Storage>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(Some(dir.path().join("test.db"))).unwrap());
        let config = Arc::new(EngineConfig {
            vec_dim: DIM,
            ..Default::default()
        });
        let index = Arc::new(ExactIndex::new(storage.clone()));
        let embedder = Arc::new(TieredEmbedder::synthetic(DIM));
        let queue = Arc::new(CoactivationQueue::new(
            storage.clone(),
            CoactivationMode::Cron,
        ));
        (
            Hsg::new(storage.clone(), index, embedder, queue, config),
            storage,
            dir,
        )
    }

    fn insert(hsg: &Hsg, content: &str, user: &str) -> InsertOutcome {
        hsg.insert(
            InsertInput {
                content: content.to_string(),
                user: Some(user.to_string()),
                ..Default::default()
            },
            Deadline::NONE,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_creates_vector_rows_per_sector() {
        let (hsg, storage, _dir) = test_hsg();
        let outcome = insert(&hsg, "Yesterday I learned that Rust enums are sum types.", "alice");

        assert!(outcome.sectors.contains(&outcome.primary_sector));
        for sector in &outcome.sectors {
            assert!(storage.get_vector(&outcome.id, *sector).unwrap().is_some());
        }
        // Exactly one vector row per assigned sector.
        assert_eq!(storage.count_vectors().unwrap(), outcome.sectors.len() as u64);
    }

    #[test]
    fn test_insert_seeds_and_joins_waypoints() {
        let (hsg, storage, _dir) = test_hsg();
        insert(&hsg, "Rust ownership and borrowing rules", "alice");
        let first = storage.count_waypoints().unwrap();
        assert!(first >= 1);

        // Near-identical content joins the existing waypoint.
        insert(&hsg, "Rust ownership and borrowing rules explained", "alice");
        let second = storage.count_waypoints().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_insert_not_deduplicated() {
        let (hsg, _storage, _dir) = test_hsg();
        let a = insert(&hsg, "same text", "alice");
        let b = insert(&hsg, "same text", "alice");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_query_isolates_users() {
        let (hsg, _storage, _dir) = test_hsg();
        insert(&hsg, "alice likes python", "alice");
        insert(&hsg, "bob likes rust", "bob");

        let response = hsg
            .query(
                "programming",
                &SearchOptions {
                    user: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!response.hits.is_empty());
        for hit in &response.hits {
            assert_eq!(hit.memory.user_id, "alice");
        }
    }

    #[test]
    fn test_query_publishes_coactivation_job() {
        let (hsg, storage, _dir) = test_hsg();
        insert(&hsg, "the cache layer uses an lru map", "alice");
        hsg.query(
            "cache",
            &SearchOptions {
                user: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(storage.count_pending_coactivations().unwrap() >= 1);
    }

    #[test]
    fn test_reinforce_caps_and_scopes() {
        let (hsg, storage, _dir) = test_hsg();
        let outcome = insert(&hsg, "reinforce me", "alice");

        for _ in 0..20 {
            hsg.reinforce(&outcome.id, Some("alice")).unwrap();
        }
        let memory = storage.get_memory(&outcome.id).unwrap().unwrap();
        assert!(memory.salience <= 1.0);

        // Wrong user sees NotFound, not a different error.
        let err = hsg.reinforce(&outcome.id, Some("bob")).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_delete_cascades() {
        let (hsg, storage, _dir) = test_hsg();
        let outcome = insert(&hsg, "delete me soon", "alice");

        assert!(hsg.delete(&outcome.id, Some("alice")).unwrap());
        assert!(storage.get_memory(&outcome.id).unwrap().is_none());
        for sector in &outcome.sectors {
            assert!(storage.get_vector(&outcome.id, *sector).unwrap().is_none());
            for waypoint in storage.waypoints_by_sector(*sector).unwrap() {
                assert!(!waypoint.contains(&outcome.id));
            }
        }
    }

    #[test]
    fn test_wipe_scoped_to_user() {
        let (hsg, storage, _dir) = test_hsg();
        insert(&hsg, "alice memory one", "alice");
        insert(&hsg, "alice memory two", "alice");
        insert(&hsg, "bob memory", "bob");

        let wiped = hsg.wipe(Some("alice")).unwrap();
        assert_eq!(wiped, 2);
        assert_eq!(storage.count_memories().unwrap(), 1);
    }

    #[test]
    fn test_effective_salience_floors() {
        let now = Utc::now();
        let long_ago = now - chrono::Duration::days(3650);
        let decayed = effective_salience(0.9, long_ago, 0.05, 0.1, now);
        assert!((decayed - 0.1).abs() < 1e-9);

        // No time passed: unchanged.
        let fresh = effective_salience(0.9, now, 0.05, 0.1, now);
        assert!((fresh - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_decay_sweep_persists() {
        let (hsg, storage, _dir) = test_hsg();
        let outcome = insert(&hsg, "will decay", "alice");

        // Backdate last_seen_at by rewriting the row.
        let mut memory = storage.get_memory(&outcome.id).unwrap().unwrap();
        memory.last_seen_at = Utc::now() - chrono::Duration::days(365);
        storage.insert_memory(&memory).unwrap();

        let updated = hsg.run_decay_sweep().unwrap();
        assert!(updated >= 1);
        let after = storage.get_memory(&outcome.id).unwrap().unwrap();
        assert!(after.salience < 0.5);
    }

    #[test]
    fn test_expansion_budget_is_hard_cap() {
        let (hsg, storage, _dir) = test_hsg();
        // Build a dense waypoint graph by hand: one seed waypoint connected
        // to many neighbors, each holding one memory.
        let now = Utc::now();
        let embedder = TieredEmbedder::synthetic(DIM);
        let seed_outcome = insert(&hsg, "graph traversal seed memory", "alice");
        let seed_waypoint = storage
            .waypoints_by_sector(seed_outcome.primary_sector)
            .unwrap()
            .into_iter()
            .find(|w| w.contains(&seed_outcome.id))
            .unwrap();

        for i in 0..10 {
            let id = format!("n{i}");
            let v = embedder.embed(&format!("neighbor memory {i}")).unwrap();
            let memory = MemoryRecord {
                id: id.clone(),
                user_id: "alice".to_string(),
                content: format!("neighbor memory {i}"),
                primary_sector: seed_outcome.primary_sector,
                sectors: vec![seed_outcome.primary_sector],
                tags: vec![],
                metadata: serde_json::Map::new(),
                salience: 0.5,
                created_at: now,
                last_seen_at: now,
            };
            storage.insert_memory(&memory).unwrap();
            storage
                .upsert_vector(&id, seed_outcome.primary_sector, "alice", &v)
                .unwrap();
            let waypoint = WaypointRecord::seed(seed_outcome.primary_sector, &id, &v, now);
            storage.insert_waypoint(&waypoint).unwrap();
            storage
                .accumulate_waypoint_edge(&seed_waypoint.id, &waypoint.id, 1.0, now)
                .unwrap();
        }

        // max_expansion default is 12 > 10, so everything is reachable; now
        // shrink the budget and verify the cap binds even though the seed
        // waypoint has 10 neighbors.
        let config = Arc::new(EngineConfig {
            vec_dim: DIM,
            max_expansion: 3,
            ..Default::default()
        });
        let index = Arc::new(ExactIndex::new(storage.clone()));
        let queue = Arc::new(CoactivationQueue::new(
            storage.clone(),
            CoactivationMode::Disabled,
        ));
        let capped = Hsg::new(
            storage.clone(),
            index,
            Arc::new(TieredEmbedder::synthetic(DIM)),
            queue,
            config,
        );

        let query_vector = embedder.embed("graph traversal seed memory").unwrap();
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        candidates.insert(
            seed_outcome.id.clone(),
            Candidate {
                sector: seed_outcome.primary_sector,
                cosine: 1.0,
                path: Vec::new(),
                hops: 0,
            },
        );

        capped
            .expand_candidates(
                &query_vector,
                &[seed_outcome.primary_sector],
                &mut candidates,
            )
            .unwrap();

        // One member per neighbor waypoint, so at most budget + seed
        // candidates can exist afterwards; without the cap all 10 would.
        assert!(
            candidates.len() <= 1 + 3,
            "expansion admitted {} candidates, budget is 3",
            candidates.len() - 1
        );
        // And the cap really did some work.
        assert_eq!(candidates.len(), 4);
    }
}
