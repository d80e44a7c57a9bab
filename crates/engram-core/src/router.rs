//! Unified Query Router
//!
//! `recall` dispatches a query to the HSG (contextual), the temporal graph
//! (factual), or both (unified, the default). No cross-system re-ranking:
//! the two blocks come back side by side and the caller merges by
//! semantics.
//!
//! `store` writes to one or both subsystems; when both, the facts carry a
//! `source_memory_id` metadata key pointing at the new memory row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{Deadline, EngineError, Result};
use crate::memory::{InsertInput, InsertOutcome, SearchOptions, SearchResponse, Sector};
use crate::temporal::{FactInput, FactPattern, TemporalFact};

/// Metadata key cross-linking facts to the memory stored alongside them.
pub const SOURCE_MEMORY_KEY: &str = "source_memory_id";

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Which subsystems a recall touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallKind {
    Contextual,
    Factual,
    #[default]
    Unified,
}

/// Parameters for `recall`.
#[derive(Debug, Clone, Default)]
pub struct RecallRequest {
    pub kind: RecallKind,
    /// Pattern for the factual block.
    pub fact_pattern: FactPattern,
    /// As-of instant for the factual block; now when absent.
    pub at: Option<DateTime<Utc>>,
    /// Result count per block.
    pub k: Option<usize>,
    /// Sector restriction for the contextual block.
    pub sectors: Option<Vec<Sector>>,
    pub min_salience: Option<f64>,
    pub user: Option<String>,
    pub deadline: Deadline,
}

/// The two result blocks. Absent blocks were not requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contextual: Option<SearchResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factual: Option<Vec<TemporalFact>>,
}

/// Which subsystems a store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Contextual,
    Factual,
    Both,
}

/// Parameters for `store`.
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub kind: StoreKind,
    /// Facts for the factual/both kinds.
    pub facts: Vec<FactInput>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub user: Option<String>,
    pub deadline: Deadline,
}

/// What landed where.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsg: Option<InsertOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub temporal: Vec<TemporalFact>,
}

// ============================================================================
// ROUTER
// ============================================================================

impl Engine {
    /// Unified recall across the HSG and the temporal graph.
    pub fn recall(&self, query: &str, request: &RecallRequest) -> Result<RecallResponse> {
        let mut response = RecallResponse::default();

        if matches!(request.kind, RecallKind::Contextual | RecallKind::Unified) {
            let options = SearchOptions {
                user: request.user.clone(),
                limit: request.k.unwrap_or(10),
                sectors: request.sectors.clone(),
                min_salience: request.min_salience,
                deadline: request.deadline,
            };
            response.contextual = Some(self.search(query, &options)?);
        }

        if matches!(request.kind, RecallKind::Factual | RecallKind::Unified) {
            request.deadline.check()?;
            // When no explicit pattern is given, the query text matches as
            // the subject so bare factual recalls still land somewhere.
            let pattern = if request.fact_pattern.subject.is_none()
                && request.fact_pattern.predicate.is_none()
                && request.fact_pattern.object.is_none()
            {
                FactPattern {
                    subject: Some(query.to_string()),
                    ..Default::default()
                }
            } else {
                request.fact_pattern.clone()
            };
            response.factual = Some(self.query_facts(
                request.user.as_deref(),
                &pattern,
                request.at,
                0.0,
            )?);
        }

        Ok(response)
    }

    /// Unified store into one or both subsystems.
    pub fn store(&self, content: &str, request: &StoreRequest) -> Result<StoreResponse> {
        let mut response = StoreResponse::default();

        let memory_id = if matches!(request.kind, StoreKind::Contextual | StoreKind::Both) {
            if content.trim().is_empty() {
                return Err(EngineError::InvalidInput(
                    "content is required for contextual store".to_string(),
                ));
            }
            let outcome = self.add(
                InsertInput {
                    content: content.to_string(),
                    user: request.user.clone(),
                    tags: request.tags.clone(),
                    metadata: request.metadata.clone(),
                },
                request.deadline,
            )?;
            let id = outcome.id.clone();
            response.hsg = Some(outcome);
            Some(id)
        } else {
            None
        };

        if matches!(request.kind, StoreKind::Factual | StoreKind::Both) {
            if request.facts.is_empty() {
                return Err(EngineError::InvalidInput(
                    "facts array is required for factual store".to_string(),
                ));
            }
            let mut facts = request.facts.clone();
            if let Some(id) = &memory_id {
                for fact in &mut facts {
                    fact.metadata.insert(
                        SOURCE_MEMORY_KEY.to_string(),
                        serde_json::Value::String(id.clone()),
                    );
                }
            }
            response.temporal =
                self.add_facts(facts, request.user.as_deref(), request.deadline)?;
        }

        Ok(response)
    }
}

// ============================================================================
// TESTS
// ============================================================================
