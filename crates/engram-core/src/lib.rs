//! # Engram Core
//!
//! Cognitive memory engine for language-model agents. One node, two graphs:
//!
//! - **Hierarchical Semantic Graph (HSG)**: free-form memories classified
//!   into cognitive sectors, embedded, stored in a pluggable vector index,
//!   and linked through a waypoint associative layer that supports
//!   path-based recall beyond raw nearest-neighbor.
//! - **Temporal Knowledge Graph (TKG)**: subject-predicate-object facts with
//!   validity intervals and confidence, answering as-of, range, and conflict
//!   queries.
//!
//! Around them: per-user isolation enforced in every persistence path, a
//! salience/decay model with query-time reinforcement, and a durable
//! coactivation queue that turns co-recalled memories into waypoint edges.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{Deadline, Engine, EngineConfig, InsertInput, SearchOptions};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//!
//! let outcome = engine.add(
//!     InsertInput {
//!         content: "Yesterday I migrated the cache to the new cluster".into(),
//!         user: Some("alice".into()),
//!         ..Default::default()
//!     },
//!     Deadline::NONE,
//! )?;
//!
//! let results = engine.search(
//!     "cache migration",
//!     &SearchOptions { user: Some("alice".into()), ..Default::default() },
//! )?;
//! ```
//!
//! ## Feature Flags
//!
//! - `approx-search` (default): HNSW vector backend via USearch
//! - `bundled-sqlite` (default): compile SQLite in-tree
//! - `remote-embeddings`: OpenAI / Gemini / Ollama embedding adapters
//! - `full`: everything

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod cache;
pub mod coactivation;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod hsg;
pub mod index;
pub mod memory;
pub mod router;
pub mod sector;
pub mod storage;
pub mod temporal;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Engine facade
pub use engine::Engine;

// Errors and deadlines
pub use error::{Deadline, EngineError, ErrorKind, Result};

// Configuration
pub use config::{
    CoactivationMode, EmbeddingProvider, EmbeddingTier, EngineConfig, MetadataBackend,
    RankWeights, SectorParams,
};

// Memory types
pub use memory::{
    dedup_tags, EngineStats, InsertInput, InsertOutcome, ListOptions, MemoryRecord,
    MemoryWithVectors, SearchHit, SearchOptions, SearchResponse, Sector, ANONYMOUS_USER,
};

// Classifier
pub use sector::{SectorAssignment, SectorClassifier};

// Embedding facade
pub use embedding::{
    cosine_similarity, l2_normalize, EmbedError, Embedder, SyntheticEmbedder, TieredEmbedder,
};

#[cfg(feature = "remote-embeddings")]
pub use embedding::RemoteEmbedder;

// Vector index
pub use index::{build_index, ExactIndex, IndexSearchOutcome, VectorIndex, VectorRow};

#[cfg(feature = "approx-search")]
pub use index::HnswIndex;

// HSG associative layer
pub use hsg::{Hsg, WaypointRecord};

// Temporal graph
pub use temporal::{
    FactField, FactInput, FactPattern, FactUpdate, TemporalEdge, TemporalFact, TemporalGraph,
};

// Coactivation
pub use coactivation::{
    spawn_worker, CoactivationJob, CoactivationPayload, CoactivationQueue, JobStatus,
    MemoryActivation,
};

// Query router
pub use router::{
    RecallKind, RecallRequest, RecallResponse, StoreKind, StoreRequest, StoreResponse,
    SOURCE_MEMORY_KEY,
};

// Storage
pub use storage::Storage;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Deadline, Engine, EngineConfig, EngineError, FactInput, FactPattern, InsertInput,
        ListOptions, RecallKind, RecallRequest, Result, SearchOptions, Sector, StoreKind,
        StoreRequest, TemporalFact,
    };
}
