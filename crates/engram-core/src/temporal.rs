//! Temporal Knowledge Graph
//!
//! Subject-predicate-object facts with validity intervals and confidence.
//! Inserting an open fact auto-closes the previous open fact for the same
//! (user, subject, predicate); point-in-time, range, substring, and
//! conflict queries run over the validity windows.
//!
//! Facts are immutable in (subject, predicate, object): updates may touch
//! confidence and metadata only, and changing the triple requires a new
//! fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Deadline, EngineError, Result};
use crate::memory::scope_user;
use crate::storage::Storage;
use std::sync::Arc;

/// Default cap for list-shaped fact queries.
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// TYPES
// ============================================================================

/// A stored temporal fact.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalFact {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub valid_from: DateTime<Utc>,
    /// `None` while the fact is current.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TemporalFact {
    /// Whether the validity interval contains `t`.
    pub fn active_at(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_to.map(|end| t < end).unwrap_or(true)
    }
}

/// A typed relation between two facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    pub user_id: String,
}

/// Input for inserting a fact.
///
/// Uses `deny_unknown_fields` to prevent field injection through the tool
/// surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactInput {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Defaults to now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// Usually absent: new facts are open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_confidence() -> f64 {
    1.0
}

/// Equality patterns for fact queries; `None` fields are wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactPattern {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

/// Which column a substring search scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactField {
    Subject,
    Predicate,
    Object,
}

impl FactField {
    pub fn column(&self) -> &'static str {
        match self {
            FactField::Subject => "subject",
            FactField::Predicate => "predicate",
            FactField::Object => "object",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "subject" => Some(FactField::Subject),
            "predicate" => Some(FactField::Predicate),
            "object" => Some(FactField::Object),
            _ => None,
        }
    }
}

/// Mutable fields of a fact. The triple itself is immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

// ============================================================================
// TEMPORAL GRAPH
// ============================================================================

/// The TKG over shared storage.
pub struct TemporalGraph {
    storage: Arc<Storage>,
}

impl TemporalGraph {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    fn validate(input: &FactInput) -> Result<()> {
        if input.subject.trim().is_empty()
            || input.predicate.trim().is_empty()
            || input.object.trim().is_empty()
        {
            return Err(EngineError::InvalidInput(
                "subject, predicate and object must be non-empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&input.confidence) {
            return Err(EngineError::InvalidInput(format!(
                "confidence must be in [0, 1], got {}",
                input.confidence
            )));
        }
        if let (Some(from), Some(to)) = (input.valid_from, input.valid_to) {
            if from > to {
                return Err(EngineError::InvalidInput(
                    "valid_from must not exceed valid_to".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn build_fact(input: FactInput, user: Option<&str>, now: DateTime<Utc>) -> TemporalFact {
        TemporalFact {
            id: Uuid::new_v4().to_string(),
            user_id: scope_user(user).to_string(),
            subject: input.subject,
            predicate: input.predicate,
            object: input.object,
            valid_from: input.valid_from.unwrap_or(now),
            valid_to: input.valid_to,
            confidence: input.confidence,
            last_updated: now,
            metadata: input.metadata,
        }
    }

    /// Insert one fact, auto-closing any prior open fact for the same
    /// (user, subject, predicate) at the new fact's `valid_from`.
    pub fn add_fact(
        &self,
        input: FactInput,
        user: Option<&str>,
        deadline: Deadline,
    ) -> Result<TemporalFact> {
        Self::validate(&input)?;
        deadline.check()?;
        let now = Utc::now();
        let fact = Self::build_fact(input, user, now);
        if fact.valid_to.is_none() {
            self.storage.close_open_facts(
                &fact.user_id,
                &fact.subject,
                &fact.predicate,
                fact.valid_from,
            )?;
        }
        self.storage.insert_fact(&fact)?;
        Ok(fact)
    }

    /// Atomic batch insert: either every fact lands or none do.
    pub fn add_facts(
        &self,
        inputs: Vec<FactInput>,
        user: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<TemporalFact>> {
        if inputs.is_empty() {
            return Err(EngineError::InvalidInput(
                "facts array must be non-empty".to_string(),
            ));
        }
        for input in &inputs {
            Self::validate(input)?;
        }
        deadline.check()?;
        let now = Utc::now();
        let facts: Vec<TemporalFact> = inputs
            .into_iter()
            .map(|input| Self::build_fact(input, user, now))
            .collect();
        self.storage.insert_facts_batch(&facts)?;
        Ok(facts)
    }

    /// As-of query: facts active at `t`, filtered by pattern and minimum
    /// confidence, ordered by (confidence desc, valid_from desc).
    pub fn query_at(
        &self,
        user: Option<&str>,
        pattern: &FactPattern,
        t: DateTime<Utc>,
        min_confidence: f64,
    ) -> Result<Vec<TemporalFact>> {
        self.storage.facts_at(
            user,
            pattern.subject.as_deref(),
            pattern.predicate.as_deref(),
            pattern.object.as_deref(),
            t,
            min_confidence,
            DEFAULT_LIMIT,
        )
    }

    /// The current (open) fact for (user?, subject, predicate).
    pub fn get_current(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
    ) -> Result<Option<TemporalFact>> {
        self.storage.current_fact(user, subject, predicate, Utc::now())
    }

    /// Facts whose validity interval overlaps `[from, to]`.
    pub fn in_range(
        &self,
        user: Option<&str>,
        pattern: &FactPattern,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TemporalFact>> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(EngineError::InvalidInput(
                    "range start must not exceed range end".to_string(),
                ));
            }
        }
        self.storage.facts_in_range(
            user,
            pattern.subject.as_deref(),
            pattern.predicate.as_deref(),
            from,
            to,
            DEFAULT_LIMIT,
        )
    }

    /// Case-sensitive substring search on one field, as of `t`, capped at
    /// 100 results.
    pub fn search(
        &self,
        user: Option<&str>,
        pattern: &str,
        field: FactField,
        t: DateTime<Utc>,
    ) -> Result<Vec<TemporalFact>> {
        if pattern.is_empty() {
            return Err(EngineError::InvalidInput(
                "search pattern must be non-empty".to_string(),
            ));
        }
        self.storage.search_facts(user, pattern, field, t)
    }

    /// All facts active at `t` for (subject, predicate); two or more means
    /// the knowledge base disagrees with itself.
    pub fn find_conflicts(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
        t: DateTime<Utc>,
    ) -> Result<Vec<TemporalFact>> {
        self.storage.conflicting_facts(user, subject, predicate, t)
    }

    pub fn by_subject(&self, user: Option<&str>, subject: &str) -> Result<Vec<TemporalFact>> {
        self.storage.facts_by_subject(user, subject, DEFAULT_LIMIT)
    }

    /// Load a fact, enforcing ownership opaquely when a scope is given.
    fn get_owned(&self, id: &str, user: Option<&str>) -> Result<TemporalFact> {
        let fact = self
            .storage
            .get_fact(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if let Some(u) = user {
            if fact.user_id != u {
                return Err(EngineError::not_found_for_user(id));
            }
        }
        Ok(fact)
    }

    /// Update confidence and/or metadata. The triple is immutable.
    pub fn update_fact(
        &self,
        id: &str,
        update: FactUpdate,
        user: Option<&str>,
    ) -> Result<TemporalFact> {
        self.get_owned(id, user)?;
        if let Some(c) = update.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(EngineError::InvalidInput(format!(
                    "confidence must be in [0, 1], got {c}"
                )));
            }
        }
        if update.confidence.is_none() && update.metadata.is_none() {
            return Err(EngineError::InvalidInput(
                "update must set confidence or metadata".to_string(),
            ));
        }
        self.storage
            .update_fact_row(id, update.confidence, update.metadata.as_ref(), Utc::now())?;
        self.get_owned(id, user)
    }

    /// Close a fact's validity window (defaults to now).
    pub fn invalidate_fact(
        &self,
        id: &str,
        valid_to: Option<DateTime<Utc>>,
        user: Option<&str>,
    ) -> Result<TemporalFact> {
        let fact = self.get_owned(id, user)?;
        let end = valid_to.unwrap_or_else(Utc::now);
        if end < fact.valid_from {
            return Err(EngineError::InvalidInput(
                "valid_to must not precede valid_from".to_string(),
            ));
        }
        self.storage.invalidate_fact_row(id, end, Utc::now())?;
        self.get_owned(id, user)
    }

    /// Irreversible delete.
    pub fn delete_fact(&self, id: &str, user: Option<&str>) -> Result<()> {
        self.get_owned(id, user)?;
        self.storage.delete_fact_row(id)?;
        Ok(())
    }

    /// Link two facts. Both endpoints must exist and be visible in scope.
    pub fn add_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        weight: f64,
        user: Option<&str>,
    ) -> Result<TemporalEdge> {
        if source_id == target_id {
            return Err(EngineError::InvalidInput(
                "edge endpoints must differ".to_string(),
            ));
        }
        self.get_owned(source_id, user)?;
        self.get_owned(target_id, user)?;
        let edge = TemporalEdge {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation_type: relation_type.to_string(),
            weight,
            valid_from: Some(Utc::now()),
            valid_to: None,
            user_id: scope_user(user).to_string(),
        };
        self.storage.insert_temporal_edge(&edge)?;
        Ok(edge)
    }

    /// Facts connected to `id` by an edge in either direction.
    ///
    /// Edges are traversed unscoped; the user scope filters the facts that
    /// come back, so another tenant's fact is never returned even when an
    /// edge points at it.
    pub fn related_facts(
        &self,
        id: &str,
        user: Option<&str>,
    ) -> Result<Vec<(TemporalEdge, TemporalFact)>> {
        self.get_owned(id, user)?;
        let edges = self.storage.edges_for_fact(id)?;
        let mut out = Vec::new();
        for edge in edges {
            let other = if edge.source_id == id {
                &edge.target_id
            } else {
                &edge.source_id
            };
            if let Some(fact) = self.storage.get_fact(other)? {
                if user.map(|u| fact.user_id == u).unwrap_or(true) {
                    out.push((edge, fact));
                }
            }
        }
        Ok(out)
    }

    /// Wipe facts (and their edges) in scope.
    pub fn wipe(&self, user: Option<&str>) -> Result<usize> {
        self.storage.wipe_facts(user)
    }
}

// ============================================================================
// TESTS
// ============================================================================
