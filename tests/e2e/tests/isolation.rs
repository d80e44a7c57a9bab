//! Multi-user isolation journeys: one tenant's memories and facts must
//! never surface for another, through search, cache replays, substring
//! fact search, or waypoint expansion.

use engram_core::{Deadline, FactField, FactInput, SearchOptions};
use engram_e2e_tests::{remember, test_engine};

fn fact(subject: &str, predicate: &str, object: &str) -> FactInput {
    FactInput {
        subject: subject.to_string(),
        predicate: predicate.to_string(),
        object: object.to_string(),
        valid_from: None,
        valid_to: None,
        confidence: 1.0,
        metadata: serde_json::Map::new(),
    }
}

#[test]
fn search_returns_only_own_memories_across_cache_states() {
    let (engine, _dir) = test_engine();
    remember(&engine, "alice likes python", "alice");
    remember(&engine, "bob likes rust", "bob");

    let alice = SearchOptions {
        user: Some("alice".to_string()),
        ..Default::default()
    };
    let bob = SearchOptions {
        user: Some("bob".to_string()),
        ..Default::default()
    };

    // bob primes the cache with the identical query text first.
    let bob_hits = engine.search("programming", &bob).unwrap();
    assert!(!bob_hits.hits.is_empty());
    assert!(bob_hits.hits.iter().all(|h| h.memory.user_id == "bob"));

    // alice's identical query must not hit bob's cache entry.
    let alice_hits = engine.search("programming", &alice).unwrap();
    assert_eq!(alice_hits.hits.len(), 1);
    assert!(alice_hits.hits[0].memory.content.contains("python"));

    // Warm replay stays scoped.
    let replay = engine.search("programming", &alice).unwrap();
    assert!(replay.hits.iter().all(|h| h.memory.user_id == "alice"));
}

#[test]
fn list_and_wipe_are_user_scoped() {
    let (engine, _dir) = test_engine();
    remember(&engine, "alice one", "alice");
    remember(&engine, "alice two", "alice");
    remember(&engine, "bob one", "bob");

    let listed = engine
        .list(&engram_core::ListOptions {
            user: Some("alice".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(listed.len(), 2);

    engine.wipe(Some("alice")).unwrap();
    assert_eq!(engine.stats().unwrap().memories, 1);

    // bob's data is untouched.
    let bob_left = engine
        .list(&engram_core::ListOptions {
            user: Some("bob".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(bob_left.len(), 1);
}

#[test]
fn substring_fact_search_is_scoped() {
    let (engine, _dir) = test_engine();
    engine
        .add_fact(fact("alice", "works_at", "Acme"), Some("alice"), Deadline::NONE)
        .unwrap();
    engine
        .add_fact(fact("bob", "works_at", "Acme"), Some("bob"), Deadline::NONE)
        .unwrap();

    let hits = engine
        .search_facts(Some("alice"), "Ac", FactField::Object, None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].user_id, "alice");

    // bob's "Acme" facts never appear for alice, under any pattern length.
    for pattern in ["A", "Ac", "Acme"] {
        let hits = engine
            .search_facts(Some("alice"), pattern, FactField::Object, None)
            .unwrap();
        assert!(hits.iter().all(|f| f.user_id == "alice"));
    }
}

#[test]
fn cross_user_content_never_leaks_through_expansion() {
    let (engine, _dir) = test_engine();
    // Same wording: both land near the same waypoint geometry.
    for i in 0..5 {
        remember(&engine, &format!("database index tuning note {i}"), "alice");
        remember(&engine, &format!("database index tuning note {i}"), "bob");
    }

    let response = engine
        .search(
            "database index tuning",
            &SearchOptions {
                user: Some("alice".to_string()),
                limit: 20,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!response.hits.is_empty());
    assert!(response.hits.iter().all(|h| h.memory.user_id == "alice"));
}

#[test]
fn anonymous_and_named_users_are_distinct_tenants() {
    let (engine, _dir) = test_engine();
    remember(&engine, "anonymous note", "");

    let named = engine
        .search(
            "note",
            &SearchOptions {
                user: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(named.hits.is_empty());

    let anonymous = engine
        .search(
            "note",
            &SearchOptions {
                user: Some("anonymous".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(anonymous.hits.len(), 1);
}
