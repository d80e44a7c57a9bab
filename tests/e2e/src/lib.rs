//! Shared harness for the end-to-end journey tests.

use engram_core::{Deadline, Engine, EngineConfig, InsertInput, InsertOutcome};
use tempfile::TempDir;

/// Embedding dimension for tests; small keeps the suites fast.
pub const TEST_DIM: usize = 64;

/// Engine over a throwaway database (exact-linear backend).
pub fn test_engine() -> (Engine, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let config = EngineConfig {
        vec_dim: TEST_DIM,
        db_path: Some(dir.path().join("e2e.db")),
        ..Default::default()
    };
    (Engine::new(config).expect("engine"), dir)
}

/// Engine with the approximate (HNSW) backend.
pub fn test_engine_approx() -> (Engine, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let config = EngineConfig {
        vec_dim: TEST_DIM,
        use_approx_vector: true,
        db_path: Some(dir.path().join("e2e.db")),
        ..Default::default()
    };
    (Engine::new(config).expect("engine"), dir)
}

/// Store one memory for a user.
pub fn remember(engine: &Engine, content: &str, user: &str) -> InsertOutcome {
    engine
        .add(
            InsertInput {
                content: content.to_string(),
                user: Some(user.to_string()),
                ..Default::default()
            },
            Deadline::NONE,
        )
        .expect("add")
}
