//! Reinforce Tool

use engram_core::{Engine, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "Memory id" },
            "user": { "type": "string" }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReinforceArgs {
    id: String,
    user: Option<String>,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> Result<Value> {
    let args: ReinforceArgs = parse_args(args)?;
    engine.reinforce(&args.id, args.user.as_deref())?;
    Ok(serde_json::json!({ "reinforced": args.id }))
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
    fn test_reinforce_bumps_salience() {
        let (engine, _dir) = test_engine();
        let stored = store::execute(
            &engine,
            Some(serde_json::json!({ "content": "useful memory", "user": "alice" })),
        )
        .unwrap();
        let id = stored["stored"]["hsg"]["id"].as_str().unwrap().to_string();

        execute(&engine, Some(serde_json::json!({ "id": id, "user": "alice" }))).unwrap();

        let loaded = engine.get(&id, Some("alice"), false).unwrap();
        assert!(loaded.memory.salience > 0.5);
    }

    #[test]
    fn test_reinforce_unknown_id() {
        let (engine, _dir) = test_engine();
        assert!(execute(&engine, Some(serde_json::json!({ "id": "missing" }))).is_err());
    }
}
