//! Recall journeys: store → recall round-trips, reinforcement,
//! coactivation reconciliation into waypoint edges, and the unified router.

use engram_core::{
    FactInput, FactPattern, RecallKind, RecallRequest, SearchOptions, StoreKind, StoreRequest,
    SOURCE_MEMORY_KEY,
};
use engram_e2e_tests::{remember, test_engine};

#[test]
fn add_then_get_preserves_content_and_sectors() {
    let (engine, _dir) = test_engine();
    let outcome = remember(
        &engine,
        "Yesterday I finally fixed the flaky integration test.",
        "alice",
    );

    let loaded = engine.get(&outcome.id, Some("alice"), true).unwrap();
    assert_eq!(
        loaded.memory.content,
        "Yesterday I finally fixed the flaky integration test."
    );
    assert_eq!(loaded.memory.primary_sector, outcome.primary_sector);
    assert!(loaded.memory.sectors.contains(&loaded.memory.primary_sector));
    // One vector row per assigned sector.
    assert_eq!(loaded.vectors.len(), loaded.memory.sectors.len());
}

#[test]
fn search_ranks_closer_content_higher_with_stable_ties() {
    let (engine, _dir) = test_engine();
    remember(&engine, "postgres connection pool exhaustion", "alice");
    remember(&engine, "postgres connection pool tuning guide", "alice");
    remember(&engine, "weekend hiking trip photos", "alice");

    let response = engine
        .search(
            "postgres connection pool",
            &SearchOptions {
                user: Some("alice".to_string()),
                limit: 3,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(response.hits.len(), 3);
    assert!(response.hits[0].memory.content.contains("postgres"));
    // Scores are sorted descending, ties broken by id ascending.
    for pair in response.hits.windows(2) {
        assert!(
            pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].memory.id < pair[1].memory.id)
        );
        assert!(pair[0].cosine >= -1.0 && pair[0].cosine <= 1.0);
    }
}

#[test]
fn reinforcement_raises_ranking_signal() {
    let (engine, _dir) = test_engine();
    let outcome = remember(&engine, "the deploy runbook lives in the wiki", "alice");

    let before = engine.get(&outcome.id, Some("alice"), false).unwrap();
    engine.reinforce(&outcome.id, Some("alice")).unwrap();
    let after = engine.get(&outcome.id, Some("alice"), false).unwrap();

    assert!(after.memory.salience > before.memory.salience);
    assert!(after.memory.last_seen_at >= before.memory.last_seen_at);
}

#[test]
fn coactivation_jobs_reconcile_into_waypoint_edges() {
    let (engine, _dir) = test_engine();
    // Two distinct topics so they land in different waypoints, then a
    // query that returns both.
    remember(&engine, "kafka consumer group rebalancing", "alice");
    remember(&engine, "weekend sourdough baking schedule", "alice");

    for _ in 0..3 {
        engine
            .search(
                "kafka rebalancing sourdough schedule",
                &SearchOptions {
                    user: Some("alice".to_string()),
                    limit: 10,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    let pending_before = engine.stats().unwrap().pending_coactivations;
    assert!(pending_before >= 1);

    // Drain the durable queue the way the worker does.
    let mut processed = 0;
    for _ in 0..5 {
        processed += engine.coactivation().process_batch().unwrap();
    }
    assert!(processed >= 1);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.pending_coactivations, 0);
    assert!(stats.waypoint_edges >= 1);
}

#[test]
fn unified_recall_returns_both_blocks_without_cross_ranking() {
    let (engine, _dir) = test_engine();
    let stored = engine
        .store(
            "alice now leads the storage team",
            &StoreRequest {
                kind: StoreKind::Both,
                facts: vec![FactInput {
                    subject: "alice".to_string(),
                    predicate: "leads".to_string(),
                    object: "storage".to_string(),
                    valid_from: None,
                    valid_to: None,
                    confidence: 1.0,
                    metadata: serde_json::Map::new(),
                }],
                user: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    // The fact is cross-linked to the memory that carried it.
    let memory_id = stored.hsg.as_ref().unwrap().id.clone();
    assert_eq!(
        stored.temporal[0].metadata.get(SOURCE_MEMORY_KEY),
        Some(&serde_json::Value::String(memory_id))
    );

    let response = engine
        .recall(
            "storage team",
            &RecallRequest {
                kind: RecallKind::Unified,
                fact_pattern: FactPattern {
                    subject: Some("alice".to_string()),
                    ..Default::default()
                },
                user: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let contextual = response.contextual.unwrap();
    let factual = response.factual.unwrap();
    assert!(!contextual.hits.is_empty());
    assert_eq!(factual.len(), 1);
    assert_eq!(factual[0].object, "storage");
}

#[test]
fn expansion_surfaces_waypoint_neighbors_with_paths() {
    let (engine, _dir) = test_engine();
    // A cluster of related notes, recalled together repeatedly so their
    // waypoints get wired up.
    remember(&engine, "tokio select loops cancel pending branches", "alice");
    remember(&engine, "tokio spawn_blocking for sync database calls", "alice");
    remember(&engine, "tokio channels backpressure with bounded mpsc", "alice");

    for _ in 0..3 {
        engine
            .search(
                "tokio spawn select channels",
                &SearchOptions {
                    user: Some("alice".to_string()),
                    limit: 10,
                    ..Default::default()
                },
            )
            .unwrap();
        engine.coactivation().process_batch().unwrap();
    }

    let response = engine
        .search(
            "tokio select loops",
            &SearchOptions {
                user: Some("alice".to_string()),
                limit: 10,
                ..Default::default()
            },
        )
        .unwrap();

    // Every hit carries a path trace once waypoints exist for its sector.
    assert!(!response.hits.is_empty());
    assert!(response.hits.iter().any(|h| !h.path.is_empty()));
}

#[test]
fn duplicate_content_yields_distinct_rows() {
    let (engine, _dir) = test_engine();
    let a = remember(&engine, "identical content", "alice");
    let b = remember(&engine, "identical content", "alice");

    assert_ne!(a.id, b.id);
    assert_eq!(engine.stats().unwrap().memories, 2);
}
