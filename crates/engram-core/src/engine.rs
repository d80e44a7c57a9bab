//! Engine Facade
//!
//! Owns every subsystem as one context object: storage, embedder, vector
//! index, classifier, HSG, temporal graph, coactivation queue, and the
//! query cache. Initialized once at startup, shared as `Arc<Engine>`,
//! torn down at shutdown. Nothing here is reachable through ambient state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{CacheKey, QueryCache};
use crate::coactivation::{spawn_worker, CoactivationQueue};
use crate::config::EngineConfig;
use crate::embedding::{Embedder, TieredEmbedder};
use crate::error::{Deadline, EngineError, Result};
use crate::hsg::Hsg;
use crate::index::build_index;
use crate::memory::{
    scope_user, EngineStats, InsertInput, InsertOutcome, ListOptions, MemoryRecord,
    MemoryWithVectors, SearchOptions, SearchResponse,
};
use crate::storage::Storage;
use crate::temporal::{
    FactField, FactInput, FactPattern, FactUpdate, TemporalEdge, TemporalFact, TemporalGraph,
};

/// Worker poll cadence for the coactivation queue.
const COACTIVATION_POLL: Duration = Duration::from_secs(5);

// ============================================================================
// ENGINE
// ============================================================================

/// The cognitive memory engine.
pub struct Engine {
    config: Arc<EngineConfig>,
    storage: Arc<Storage>,
    hsg: Hsg,
    temporal: TemporalGraph,
    queue: Arc<CoactivationQueue>,
    cache: QueryCache,
}

impl Engine {
    /// Construct every subsystem from configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let storage = Arc::new(Storage::open(config.db_path.clone())?);
        let embedder: Arc<dyn Embedder> = Arc::new(TieredEmbedder::from_config(&config)?);
        let index = build_index(&config, storage.clone())?;
        let queue = Arc::new(CoactivationQueue::new(
            storage.clone(),
            config.coactivation_mode,
        ));
        let hsg = Hsg::new(
            storage.clone(),
            index,
            embedder,
            queue.clone(),
            config.clone(),
        );
        let temporal = TemporalGraph::new(storage.clone());
        let cache = QueryCache::new(
            config.cache_enabled,
            Duration::from_secs(config.cache_ttl_secs),
        );

        tracing::info!(
            approx = config.use_approx_vector,
            dim = config.vec_dim,
            coactivation = ?config.coactivation_mode,
            "engine initialized"
        );

        Ok(Self {
            config,
            storage,
            hsg,
            temporal,
            queue,
            cache,
        })
    }

    /// Engine from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the coactivation worker for the configured mode. Must be
    /// called from within a tokio runtime. Returns `None` when disabled.
    pub fn spawn_coactivation_worker(&self) -> Option<tokio::task::JoinHandle<()>> {
        spawn_worker(self.queue.clone(), COACTIVATION_POLL)
    }

    /// The queue, for tests and external job runners.
    pub fn coactivation(&self) -> &Arc<CoactivationQueue> {
        &self.queue
    }

    // ========================================================================
    // MEMORY API
    // ========================================================================

    /// Store a memory; returns its id and sector assignment.
    pub fn add(&self, input: InsertInput, deadline: Deadline) -> Result<InsertOutcome> {
        self.hsg.insert(input, deadline)
    }

    /// Fetch a memory, optionally with its per-sector vectors. Rows owned
    /// by another user surface as NotFound.
    pub fn get(
        &self,
        id: &str,
        user: Option<&str>,
        include_vectors: bool,
    ) -> Result<MemoryWithVectors> {
        let memory = self
            .storage
            .get_memory(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if let Some(u) = user {
            if memory.user_id != u {
                return Err(EngineError::not_found_for_user(id));
            }
        }
        let mut vectors = Vec::new();
        if include_vectors {
            for &sector in &memory.sectors {
                if let Some(v) = self.storage.get_vector(id, sector)? {
                    vectors.push((sector, v));
                }
            }
        }
        Ok(MemoryWithVectors { memory, vectors })
    }

    /// Page through memories.
    pub fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>> {
        self.storage.list_memories(
            options.user.as_deref(),
            options.sector,
            options.limit,
            options.offset,
        )
    }

    /// Contextual search through the HSG, with the scoped result cache in
    /// front. Salience-filtered queries bypass the cache (the filter is not
    /// part of the key).
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        let cacheable = options.min_salience.is_none();
        let key = CacheKey::new(
            options.user.as_deref(),
            options.sectors.as_deref(),
            query,
            options.limit,
        );
        if cacheable {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached);
            }
        }
        let response = self.hsg.query(query, options)?;
        if cacheable {
            self.cache.put(key, response.clone());
        }
        Ok(response)
    }

    /// Bump a memory's salience.
    pub fn reinforce(&self, id: &str, user: Option<&str>) -> Result<()> {
        self.hsg.reinforce(id, user)
    }

    /// Cascaded delete of one memory.
    pub fn delete(&self, id: &str, user: Option<&str>) -> Result<bool> {
        let deleted = self.hsg.delete(id, user)?;
        if deleted {
            self.cache.clear();
        }
        Ok(deleted)
    }

    /// Remove all memories and facts in scope. Dangerous; scoped when a
    /// user id is supplied.
    pub fn wipe(&self, user: Option<&str>) -> Result<()> {
        self.hsg.wipe(user)?;
        self.temporal.wipe(user)?;
        self.cache.clear();
        tracing::info!(user = scope_user(user), "wipe complete");
        Ok(())
    }

    /// Persist decayed salience; returns rows updated.
    pub fn run_decay_sweep(&self) -> Result<u64> {
        self.hsg.run_decay_sweep()
    }

    // ========================================================================
    // FACT API
    // ========================================================================

    pub fn add_fact(
        &self,
        input: FactInput,
        user: Option<&str>,
        deadline: Deadline,
    ) -> Result<TemporalFact> {
        self.temporal.add_fact(input, user, deadline)
    }

    pub fn add_facts(
        &self,
        inputs: Vec<FactInput>,
        user: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<TemporalFact>> {
        self.temporal.add_facts(inputs, user, deadline)
    }

    pub fn update_fact(
        &self,
        id: &str,
        update: FactUpdate,
        user: Option<&str>,
    ) -> Result<TemporalFact> {
        self.temporal.update_fact(id, update, user)
    }

    pub fn invalidate_fact(
        &self,
        id: &str,
        valid_to: Option<DateTime<Utc>>,
        user: Option<&str>,
    ) -> Result<TemporalFact> {
        self.temporal.invalidate_fact(id, valid_to, user)
    }

    pub fn delete_fact(&self, id: &str, user: Option<&str>) -> Result<()> {
        self.temporal.delete_fact(id, user)
    }

    pub fn query_facts(
        &self,
        user: Option<&str>,
        pattern: &FactPattern,
        at: Option<DateTime<Utc>>,
        min_confidence: f64,
    ) -> Result<Vec<TemporalFact>> {
        self.temporal
            .query_at(user, pattern, at.unwrap_or_else(Utc::now), min_confidence)
    }

    pub fn query_facts_in_range(
        &self,
        user: Option<&str>,
        pattern: &FactPattern,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TemporalFact>> {
        self.temporal.in_range(user, pattern, from, to)
    }

    pub fn get_current_fact(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
    ) -> Result<Option<TemporalFact>> {
        self.temporal.get_current(user, subject, predicate)
    }

    pub fn get_facts_by_subject(
        &self,
        user: Option<&str>,
        subject: &str,
    ) -> Result<Vec<TemporalFact>> {
        self.temporal.by_subject(user, subject)
    }

    pub fn search_facts(
        &self,
        user: Option<&str>,
        pattern: &str,
        field: FactField,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TemporalFact>> {
        self.temporal
            .search(user, pattern, field, at.unwrap_or_else(Utc::now))
    }

    pub fn find_conflicting_facts(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<TemporalFact>> {
        self.temporal
            .find_conflicts(user, subject, predicate, at.unwrap_or_else(Utc::now))
    }

    pub fn add_fact_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        weight: f64,
        user: Option<&str>,
    ) -> Result<TemporalEdge> {
        self.temporal
            .add_edge(source_id, target_id, relation_type, weight, user)
    }

    pub fn get_related_facts(
        &self,
        id: &str,
        user: Option<&str>,
    ) -> Result<Vec<(TemporalEdge, TemporalFact)>> {
        self.temporal.related_facts(id, user)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            memories: self.storage.count_memories()?,
            vectors: self.storage.count_vectors()?,
            waypoints: self.storage.count_waypoints()?,
            waypoint_edges: self.storage.count_waypoint_edges()?,
            temporal_facts: self.storage.count_facts()?,
            pending_coactivations: self.storage.count_pending_coactivations()?,
            memories_by_sector: self.storage.count_memories_by_sector()?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
