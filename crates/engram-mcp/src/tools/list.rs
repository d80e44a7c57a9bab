//! List Tool

use engram_core::{Engine, EngineError, ListOptions, Result, Sector};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "user": { "type": "string" },
            "limit": { "type": "integer", "default": 50, "minimum": 1, "maximum": 200 },
            "offset": { "type": "integer", "default": 0, "minimum": 0 },
            "sector": {
                "type": "string",
                "enum": ["episodic", "semantic", "procedural", "emotional", "reflective"]
            }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListArgs {
    user: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    sector: Option<String>,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> Result<Value> {
    // Listing with no arguments is a valid call.
    let args: ListArgs = match args {
        Some(v) => parse_args(Some(v))?,
        None => ListArgs::default(),
    };

    let sector = match &args.sector {
        Some(name) => Some(
            Sector::parse_name(name)
                .ok_or_else(|| EngineError::InvalidInput(format!("unknown sector '{name}'")))?,
        ),
        None => None,
    };

    let options = ListOptions {
        user: args.user,
        limit: args.limit.unwrap_or(50).clamp(1, 200) as usize,
        offset: args.offset.unwrap_or(0).max(0) as usize,
        sector,
    };
    let memories = engine.list(&options)?;

    Ok(serde_json::json!({
        "total": memories.len(),
        "memories": memories,
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::store;
    use crate::tools::tests_support::test_engine;

    #[test]
    fn test_list_no_args() {
        let (engine, _dir) = test_engine();
        let result = execute(&engine, None).unwrap();
        assert_eq!(result["total"], 0);
    }

    #[test]
    fn test_list_scoped() {
        let (engine, _dir) = test_engine();
        for (content, user) in [("a", "alice"), ("b", "alice"), ("c", "bob")] {
            store::execute(
                &engine,
                Some(serde_json::json!({ "content": content, "user": user })),
            )
            .unwrap();
        }

        let result = execute(&engine, Some(serde_json::json!({ "user": "alice" }))).unwrap();
        assert_eq!(result["total"], 2);
    }

    #[test]
    fn test_list_pagination() {
        let (engine, _dir) = test_engine();
        for i in 0..5 {
            store::execute(
                &engine,
                Some(serde_json::json!({ "content": format!("memory {i}") })),
            )
            .unwrap();
        }

        let page = execute(&engine, Some(serde_json::json!({ "limit": 2, "offset": 4 }))).unwrap();
        assert_eq!(page["total"], 1);
    }
}
