//! Query Tool
//!
//! Unified recall over the semantic graph and the temporal facts.

use chrono::{DateTime, Utc};
use engram_core::{
    Deadline, Engine, EngineError, FactPattern, RecallKind, RecallRequest, Result, Sector,
};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

/// Input schema for the query tool
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search text (also the subject for bare factual recalls)"
            },
            "type": {
                "type": "string",
                "enum": ["contextual", "factual", "unified"],
                "default": "unified"
            },
            "subject": { "type": "string", "description": "Fact pattern: exact subject" },
            "predicate": { "type": "string", "description": "Fact pattern: exact predicate" },
            "object": { "type": "string", "description": "Fact pattern: exact object" },
            "at": {
                "type": "string",
                "description": "As-of instant for the factual block (RFC 3339, default now)"
            },
            "limit": {
                "type": "integer",
                "default": 10,
                "minimum": 1,
                "maximum": 100
            },
            "sectors": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["episodic", "semantic", "procedural", "emotional", "reflective"]
                }
            },
            "minSalience": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "user": { "type": "string" }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryArgs {
    query: String,
    #[serde(default, rename = "type")]
    kind: Option<RecallKind>,
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
    at: Option<DateTime<Utc>>,
    limit: Option<i64>,
    sectors: Option<Vec<String>>,
    min_salience: Option<f64>,
    user: Option<String>,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: QueryArgs = parse_args(args)?;
    if args.query.trim().is_empty() {
        return Err(EngineError::InvalidInput("query must be non-empty".to_string()));
    }

    let sectors = match args.sectors {
        Some(names) => {
            let mut parsed = Vec::with_capacity(names.len());
            for name in &names {
                let sector = Sector::parse_name(name).ok_or_else(|| {
                    EngineError::InvalidInput(format!("unknown sector '{name}'"))
                })?;
                parsed.push(sector);
            }
            Some(parsed)
        }
        None => None,
    };

    let request = RecallRequest {
        kind: args.kind.unwrap_or_default(),
        fact_pattern: FactPattern {
            subject: args.subject,
            predicate: args.predicate,
            object: args.object,
        },
        at: args.at,
        k: Some(args.limit.unwrap_or(10).clamp(1, 100) as usize),
        sectors,
        min_salience: args.min_salience.map(|s| s.clamp(0.0, 1.0)),
        user: args.user,
        deadline: Deadline::NONE,
    };

    let response = engine.recall(&args.query, &request)?;
    serde_json::to_value(&response)
        .map_err(|e| EngineError::Internal(format!("response encode: {e}")))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests_support::test_engine;
    use crate::tools::store;

    #[test]
    fn test_query_empty_rejected() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({ "query": "   " });
        assert!(execute(&engine, Some(args)).is_err());
    }

    #[test]
    fn test_unified_query_returns_both_blocks() {
        let (engine, _dir) = test_engine();
        store::execute(
            &engine,
            Some(serde_json::json!({
                "content": "the cache TTL is sixty seconds",
                "user": "alice"
            })),
        )
        .unwrap();

        let result = execute(
            &engine,
            Some(serde_json::json!({ "query": "cache", "user": "alice" })),
        )
        .unwrap();
        assert!(result["contextual"]["hits"].is_array());
        assert!(result["factual"].is_array());
    }

    #[test]
    fn test_contextual_only() {
        let (engine, _dir) = test_engine();
        let result = execute(
            &engine,
            Some(serde_json::json!({ "query": "anything", "type": "contextual" })),
        )
        .unwrap();
        assert!(result["contextual"].is_object());
        assert!(result.get("factual").is_none());
    }

    #[test]
    fn test_unknown_sector_rejected() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({ "query": "x", "sectors": ["limbic"] });
        assert!(execute(&engine, Some(args)).is_err());
    }

    #[test]
    fn test_factual_pattern_query() {
        let (engine, _dir) = test_engine();
        store::execute(
            &engine,
            Some(serde_json::json!({
                "type": "factual",
                "facts": [{ "subject": "alice", "predicate": "works_at", "object": "Acme" }],
                "user": "alice"
            })),
        )
        .unwrap();

        let result = execute(
            &engine,
            Some(serde_json::json!({
                "query": "ignored",
                "type": "factual",
                "subject": "alice",
                "user": "alice"
            })),
        )
        .unwrap();
        let facts = result["factual"].as_array().unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0]["object"], "Acme");
    }
}
