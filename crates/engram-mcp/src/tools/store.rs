//! Store Tool
//!
//! Writes a memory, a set of temporal facts, or both (cross-linked).

use engram_core::{Deadline, Engine, FactInput, Result, StoreKind, StoreRequest};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

/// Input schema for the store tool
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "Memory text (required unless type='factual')"
            },
            "type": {
                "type": "string",
                "enum": ["contextual", "factual", "both"],
                "description": "Which subsystems to write (default: contextual)",
                "default": "contextual"
            },
            "facts": {
                "type": "array",
                "description": "Facts for type='factual'/'both'",
                "items": {
                    "type": "object",
                    "properties": {
                        "subject": { "type": "string" },
                        "predicate": { "type": "string" },
                        "object": { "type": "string" },
                        "validFrom": { "type": "string", "description": "RFC 3339 instant" },
                        "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                    },
                    "required": ["subject", "predicate", "object"]
                }
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" }
            },
            "metadata": {
                "type": "object",
                "description": "Free-form string-keyed metadata"
            },
            "user": {
                "type": "string",
                "description": "Owning user id"
            }
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreArgs {
    #[serde(default)]
    content: String,
    #[serde(default, rename = "type")]
    kind: Option<StoreKind>,
    #[serde(default)]
    facts: Vec<FactInput>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
    user: Option<String>,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: StoreArgs = parse_args(args)?;

    let request = StoreRequest {
        kind: args.kind.unwrap_or_default(),
        facts: args.facts,
        tags: args.tags,
        metadata: args.metadata,
        user: args.user,
        deadline: Deadline::NONE,
    };
    let response = engine.store(&args.content, &request)?;

    Ok(serde_json::json!({
        "stored": response,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
