//! Get Tool

use engram_core::{Engine, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory id" },
            "user": { "type": "string" },
            "includeVectors": {
                "type": "boolean",
                "description": "Also return the per-sector embedding vectors",
                "default": false
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetArgs {
    id: String,
    user: Option<String>,
    #[serde(default)]
    include_vectors: bool,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: GetArgs = parse_args(args)?;
    let loaded = engine.get(&args.id, args.user.as_deref(), args.include_vectors)?;
    serde_json::to_value(&loaded)
        .map_err(|e| engram_core::EngineError::Internal(format!("response encode: {e}")))
}

// ============================================================================
// TESTS
// ============================================================================
