//! Memory Record - The unit the hierarchical semantic graph stores
//!
//! A memory is a free-form text chunk owned by a user (or the anonymous
//! sentinel), classified into one primary and up to two secondary cognitive
//! sectors, carrying tags, free-form metadata, and a salience score that
//! rises with reinforcement and decays over time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner recorded for memories stored without a user id.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Resolve an optional caller user id to the stored owner string.
pub fn scope_user(user: Option<&str>) -> &str {
    match user {
        Some(u) if !u.is_empty() => u,
        _ => ANONYMOUS_USER,
    }
}

// ============================================================================
// SECTORS
// ============================================================================

/// The five cognitive sectors a memory can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    /// Events and experiences anchored in time
    Episodic,
    /// Facts, concepts, declarative knowledge
    Semantic,
    /// How-to knowledge, procedures, instructions
    Procedural,
    /// Affect-laden content
    Emotional,
    /// Self-referential thoughts, lessons, judgments
    Reflective,
}

impl Sector {
    /// All sectors, in classifier preference order (used for tie-breaks:
    /// semantic > episodic > procedural > reflective > emotional).
    pub const ALL: [Sector; 5] = [
        Sector::Semantic,
        Sector::Episodic,
        Sector::Procedural,
        Sector::Reflective,
        Sector::Emotional,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Episodic => "episodic",
            Sector::Semantic => "semantic",
            Sector::Procedural => "procedural",
            Sector::Emotional => "emotional",
            Sector::Reflective => "reflective",
        }
    }

    /// Parse from a string name; unknown names are rejected rather than
    /// defaulted so that a corrupted row never silently changes sector.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "episodic" => Some(Sector::Episodic),
            "semantic" => Some(Sector::Semantic),
            "procedural" => Some(Sector::Procedural),
            "emotional" => Some(Sector::Emotional),
            "reflective" => Some(Sector::Reflective),
            _ => None,
        }
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A stored memory row.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning user, or the anonymous sentinel
    pub user_id: String,
    /// The memory text
    pub content: String,
    /// Primary cognitive sector (argmax of the classifier)
    pub primary_sector: Sector,
    /// All assigned sectors; always contains the primary
    pub sectors: Vec<Sector>,
    /// De-duplicated tags, insertion order preserved
    pub tags: Vec<String>,
    /// Free-form string-keyed metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Salience in [0, 1]; reinforced on recall, decayed over time
    pub salience: f64,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last recall/reinforcement instant
    pub last_seen_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Whether this record belongs to the given scope. An unscoped caller
    /// (no user id) sees everything.
    pub fn visible_to(&self, user: Option<&str>) -> bool {
        match user {
            Some(u) => self.user_id == u,
            None => true,
        }
    }
}

/// De-duplicate tags while preserving first-occurrence order.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
