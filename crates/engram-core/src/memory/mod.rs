//! Memory types: records, inputs, and query results.

mod record;

pub use record::{dedup_tags, scope_user, MemoryRecord, Sector, ANONYMOUS_USER};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Deadline, EngineError, Result};

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for storing a new memory.
///
/// Uses `deny_unknown_fields` to prevent field injection through the tool
/// surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InsertInput {
    /// The content to store
    pub content: String,
    /// Owning user; absent means the anonymous sentinel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Tags, de-duplicated with order preserved
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form string-keyed metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InsertInput {
    /// Validate and normalize: trims content (must be non-empty afterwards),
    /// de-duplicates tags.
    pub fn normalize(mut self) -> Result<Self> {
        self.content = self.content.trim().to_string();
        if self.content.is_empty() {
            return Err(EngineError::InvalidInput(
                "content must be non-empty after normalization".to_string(),
            ));
        }
        self.tags = dedup_tags(self.tags);
        Ok(self)
    }
}

/// Options for `search`.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Scope results to this user
    pub user: Option<String>,
    /// Maximum results to return
    pub limit: usize,
    /// Restrict candidate retrieval to these sectors; `None` means all
    pub sectors: Option<Vec<Sector>>,
    /// Drop results whose decayed salience is below this
    pub min_salience: Option<f64>,
    /// Optional operation deadline
    pub deadline: Deadline,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            user: None,
            limit: 10,
            sectors: None,
            min_salience: None,
            deadline: Deadline::NONE,
        }
    }
}

/// Options for `list`.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub user: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub sector: Option<Sector>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            user: None,
            limit: 50,
            offset: 0,
            sector: None,
        }
    }
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One ranked search result with its explainability trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// The matched memory
    pub memory: MemoryRecord,
    /// Final re-ranked score
    pub score: f32,
    /// Raw cosine similarity component, in [-1, 1]
    pub cosine: f32,
    /// Waypoint ids visited to reach this result (empty for direct
    /// nearest-neighbor hits with no waypoint)
    pub path: Vec<String>,
}

/// Search results plus the degraded-recall flag for approximate backends
/// that returned fewer than `k` rows after post-filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// True when the backend could not fill `k` results; not an error.
    pub degraded: bool,
}

/// A memory row joined with its per-sector vector rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryWithVectors {
    pub memory: MemoryRecord,
    /// (sector, vector) pairs; present only when requested
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vectors: Vec<(Sector, Vec<f32>)>,
}

/// Result of inserting a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub id: String,
    pub primary_sector: Sector,
    pub sectors: Vec<Sector>,
}

/// Engine-wide statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub memories: u64,
    pub vectors: u64,
    pub waypoints: u64,
    pub waypoint_edges: u64,
    pub temporal_facts: u64,
    pub pending_coactivations: u64,
    pub memories_by_sector: Vec<(Sector, u64)>,
}

/// Millisecond timestamp helpers shared by the storage layer.
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| EngineError::Internal(format!("timestamp out of range: {ms}")))
}

// ============================================================================
// TESTS
// ============================================================================
