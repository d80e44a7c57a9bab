//! Tool handlers: thin projections of the engine's programmatic API.
//!
//! Every tool follows the same shape: a `schema()` returning the JSON input
//! schema and a synchronous `execute(engine, args)` returning a JSON value.
//! The server runs handlers on the blocking pool and retries
//! `BackendUnavailable` once at this boundary.

pub mod batch;
pub mod fact;
pub mod get;
pub mod list;
pub mod query;
pub mod reinforce;
pub mod store;

use engram_core::{Engine, EngineError, Result};
use serde_json::Value;

use crate::protocol::types::ToolDescription;

/// Tool registry for tools/list.
pub fn descriptions() -> Vec<ToolDescription> {
    vec![
        ToolDescription {
            name: "store".to_string(),
            description: Some(
                "Store a memory and/or temporal facts. type='contextual' (default) stores free text, \
                 type='factual' stores subject/predicate/object facts, type='both' stores text and \
                 cross-links the facts to it."
                    .to_string(),
            ),
            input_schema: store::schema(),
        },
        ToolDescription {
            name: "query".to_string(),
            description: Some(
                "Recall memories and/or facts. type='unified' (default) returns both blocks; \
                 'contextual' searches the semantic graph, 'factual' answers point-in-time fact \
                 queries."
                    .to_string(),
            ),
            input_schema: query::schema(),
        },
        ToolDescription {
            name: "list".to_string(),
            description: Some("Page through stored memories, optionally by user and sector.".to_string()),
            input_schema: list::schema(),
        },
        ToolDescription {
            name: "get".to_string(),
            description: Some("Fetch one memory by id, optionally with its vectors.".to_string()),
            input_schema: get::schema(),
        },
        ToolDescription {
            name: "reinforce".to_string(),
            description: Some(
                "Mark a memory as useful: bumps its salience and refreshes recency.".to_string(),
            ),
            input_schema: reinforce::schema(),
        },
        ToolDescription {
            name: "store_batch".to_string(),
            description: Some("Store up to 20 memories in one call.".to_string()),
            input_schema: batch::store_schema(),
        },
        ToolDescription {
            name: "delete_batch".to_string(),
            description: Some("Delete memories by id (cascades vectors and waypoint membership).".to_string()),
            input_schema: batch::delete_schema(),
        },
        ToolDescription {
            name: "update_fact".to_string(),
            description: Some(
                "Update a fact's confidence and/or metadata. Subject, predicate and object are \
                 immutable; store a new fact to change them."
                    .to_string(),
            ),
            input_schema: fact::schema(),
        },
    ]
}

/// Route one tools/call to its handler.
pub fn dispatch(engine: &Engine, name: &str, args: Option<Value>) -> Result<Value> {
    match name {
        "store" => store::execute(engine, args),
        "query" => query::execute(engine, args),
        "list" => list::execute(engine, args),
        "get" => get::execute(engine, args),
        "reinforce" => reinforce::execute(engine, args),
        "store_batch" => batch::execute_store(engine, args),
        "delete_batch" => batch::execute_delete(engine, args),
        "update_fact" => fact::execute(engine, args),
        other => Err(EngineError::InvalidInput(format!("unknown tool '{other}'"))),
    }
}

/// Parse tool arguments into a typed struct.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Option<Value>) -> Result<T> {
    let value = args.ok_or_else(|| EngineError::InvalidInput("missing arguments".to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| EngineError::InvalidInput(format!("invalid arguments: {e}")))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests_support {
    use engram_core::{Engine, EngineConfig};
    use tempfile::TempDir;

    /// Engine over a throwaway database with a small synthetic embedder.
    pub(crate) fn test_engine() -> (Engine, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            vec_dim: 64,
            db_path: Some(dir.path().join("test.db")),
            ..Default::default()
        };
        (Engine::new(config).unwrap(), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tool_has_object_schema() {
        for tool in descriptions() {
            assert_eq!(tool.input_schema["type"], "object", "tool {}", tool.name);
            assert!(tool.description.is_some());
        }
    }

    #[test]
    fn test_registry_matches_dispatch() {
        let names: Vec<String> = descriptions().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "store",
                "query",
                "list",
                "get",
                "reinforce",
                "store_batch",
                "delete_batch",
                "update_fact"
            ]
        );
    }
}
