//! Update-Fact Tool
//!
//! Mutates only confidence and metadata. Attempts to rewrite the triple
//! itself are rejected: that history belongs to a new fact.

use engram_core::{Engine, EngineError, FactUpdate, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Fact id" },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "metadata": { "type": "object" },
            "user": { "type": "string" }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFactArgs {
    id: String,
    confidence: Option<f64>,
    metadata: Option<serde_json::Map<String, Value>>,
    user: Option<String>,
    // Immutable columns, accepted here only to produce a precise error.
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: UpdateFactArgs = parse_args(args)?;

    if args.subject.is_some() || args.predicate.is_some() || args.object.is_some() {
        return Err(EngineError::ConflictingFact(
            "subject/predicate/object are immutable; insert a new fact to change them".to_string(),
        ));
    }

    let updated = engine.update_fact(
        &args.id,
        FactUpdate {
            confidence: args.confidence,
            metadata: args.metadata,
        },
        args.user.as_deref(),
    )?;
    serde_json::to_value(&updated)
        .map_err(|e| EngineError::Internal(format!("response encode: {e}")))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::store;
    use crate::tools::tests_support::test_engine;

    fn insert_fact(engine: &Engine) -> String {
        let stored = store::execute(
            engine,
            Some(serde_json::json!({
                "type": "factual",
                "facts": [{ "subject": "svc", "predicate": "owner", "object": "infra" }],
                "user": "alice"
            })),
        )
        .unwrap();
        stored["stored"]["temporal"][0]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_update_confidence() {
        let (engine, _dir) = test_engine();
        let id = insert_fact(&engine);

        let result = execute(
            &engine,
            Some(serde_json::json!({ "id": id, "confidence": 0.3, "user": "alice" })),
        )
        .unwrap();
        assert_eq!(result["confidence"], 0.3);
    }

    #[test]
    fn test_immutable_columns_rejected() {
        let (engine, _dir) = test_engine();
        let id = insert_fact(&engine);

        let err = execute(
            &engine,
            Some(serde_json::json!({
                "id": id,
                "object": "platform",
                "user": "alice"
            })),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ConflictingFact(_)));
    }

    #[test]
    fn test_wrong_user_not_found() {
        let (engine, _dir) = test_engine();
        let id = insert_fact(&engine);

        let err = execute(
            &engine,
            Some(serde_json::json!({ "id": id, "confidence": 0.9, "user": "bob" })),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
