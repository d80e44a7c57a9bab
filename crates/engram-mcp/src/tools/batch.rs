//! Batch Tools: store_batch and delete_batch

use engram_core::{Deadline, Engine, EngineError, InsertInput, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

/// Largest accepted batch.
const MAX_BATCH: usize = 20;

pub fn store_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "maxItems": MAX_BATCH,
                "items": {
                    "type": "object",
                    "properties": {
                        "content": { "type": "string" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "metadata": { "type": "object" }
                    },
                    "required": ["content"]
                }
            },
            "user": { "type": "string" }
        },
        "required": ["items"]
    })
}

pub fn delete_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "ids": {
                "type": "array",
                "items": { "type": "string" }
            },
            "user": { "type": "string" }
        },
        "required": ["ids"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreBatchItem {
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreBatchArgs {
    items: Vec<StoreBatchItem>,
    user: Option<String>,
}

pub fn execute_store(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: StoreBatchArgs = parse_args(args)?;
    if args.items.is_empty() {
        return Err(EngineError::InvalidInput("items must be non-empty".to_string()));
    }
    if args.items.len() > MAX_BATCH {
        return Err(EngineError::InvalidInput(format!(
            "at most {MAX_BATCH} items per batch, got {}",
            args.items.len()
        )));
    }

    let mut stored = Vec::with_capacity(args.items.len());
    let mut errors = Vec::new();
    for (index, item) in args.items.into_iter().enumerate() {
        let input = InsertInput {
            content: item.content,
            user: args.user.clone(),
            tags: item.tags,
            metadata: item.metadata,
        };
        match engine.add(input, Deadline::NONE) {
            Ok(outcome) => stored.push(outcome),
            Err(e) => errors.push(serde_json::json!({ "index": index, "error": e.to_string() })),
        }
    }

    Ok(serde_json::json!({
        "stored": stored,
        "errors": errors,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBatchArgs {
    ids: Vec<String>,
    user: Option<String>,
}

pub fn execute_delete(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: DeleteBatchArgs = parse_args(args)?;
    if args.ids.is_empty() {
        return Err(EngineError::InvalidInput("ids must be non-empty".to_string()));
    }

    let mut deleted = Vec::new();
    let mut missing = Vec::new();
    for id in &args.ids {
        match engine.delete(id, args.user.as_deref()) {
            Ok(true) => deleted.push(id.clone()),
            Ok(false) => missing.push(id.clone()),
            // Ownership mismatches read as missing, same as single delete.
            Err(EngineError::NotFound(_)) => missing.push(id.clone()),
            Err(e) => return Err(e),
        }
    }

    Ok(serde_json::json!({
        "deleted": deleted,
        "missing": missing,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
