//! Temporal graph journeys: supersession, point-in-time queries, conflict
//! detection, and the as-of / range containment relation.

use chrono::{DateTime, Utc};
use engram_core::{Deadline, FactInput, FactPattern};
use engram_e2e_tests::test_engine;

fn fact_at(subject: &str, predicate: &str, object: &str, valid_from: &str) -> FactInput {
    FactInput {
        subject: subject.to_string(),
        predicate: predicate.to_string(),
        object: object.to_string(),
        valid_from: Some(date(valid_from)),
        valid_to: None,
        confidence: 1.0,
        metadata: serde_json::Map::new(),
    }
}

fn date(s: &str) -> DateTime<Utc> {
    format!("{s}T00:00:00Z").parse().unwrap()
}

#[test]
fn supersession_auto_closes_previous_employer() {
    let (engine, _dir) = test_engine();
    engine
        .add_fact(
            fact_at("alice", "works_at", "Acme", "2023-01-01"),
            Some("alice"),
            Deadline::NONE,
        )
        .unwrap();
    engine
        .add_fact(
            fact_at("alice", "works_at", "Globex", "2024-06-01"),
            Some("alice"),
            Deadline::NONE,
        )
        .unwrap();

    let current = engine
        .get_current_fact(Some("alice"), "alice", "works_at")
        .unwrap()
        .unwrap();
    assert_eq!(current.object, "Globex");

    let pattern = FactPattern {
        subject: Some("alice".to_string()),
        predicate: Some("works_at".to_string()),
        object: None,
    };

    let mid_2023 = engine
        .query_facts(Some("alice"), &pattern, Some(date("2023-07-01")), 0.0)
        .unwrap();
    assert_eq!(mid_2023.len(), 1);
    assert_eq!(mid_2023[0].object, "Acme");

    let switch_day = engine
        .query_facts(Some("alice"), &pattern, Some(date("2024-06-01")), 0.0)
        .unwrap();
    assert_eq!(switch_day.len(), 1);
    assert_eq!(switch_day[0].object, "Globex");
}

#[test]
fn add_fact_then_current_roundtrip() {
    let (engine, _dir) = test_engine();
    let inserted = engine
        .add_fact(
            FactInput {
                subject: "service".to_string(),
                predicate: "status".to_string(),
                object: "green".to_string(),
                valid_from: None,
                valid_to: None,
                confidence: 0.9,
                metadata: serde_json::Map::new(),
            },
            Some("ops"),
            Deadline::NONE,
        )
        .unwrap();

    let current = engine
        .get_current_fact(Some("ops"), "service", "status")
        .unwrap()
        .unwrap();
    assert_eq!(current.id, inserted.id);
    assert!((current.confidence - 0.9).abs() < 1e-9);
}

#[test]
fn concurrent_same_instant_facts_both_remain_as_conflict() {
    let (engine, _dir) = test_engine();
    let t = "2024-01-01";
    engine
        .add_fact(fact_at("svc", "owner", "team-a", t), None, Deadline::NONE)
        .unwrap();
    engine
        .add_fact(
            FactInput {
                confidence: 0.8,
                ..fact_at("svc", "owner", "team-b", t)
            },
            None,
            Deadline::NONE,
        )
        .unwrap();

    let conflicts = engine
        .find_conflicting_facts(None, "svc", "owner", Some(date("2024-03-01")))
        .unwrap();
    assert_eq!(conflicts.len(), 2);
    // Ordered by confidence descending.
    assert_eq!(conflicts[0].object, "team-a");
    assert_eq!(conflicts[1].object, "team-b");
}

#[test]
fn as_of_results_are_subset_of_point_range() {
    let (engine, _dir) = test_engine();
    for (object, from) in [("v1", "2023-01-01"), ("v2", "2024-01-01"), ("v3", "2025-01-01")] {
        engine
            .add_fact(fact_at("api", "version", object, from), None, Deadline::NONE)
            .unwrap();
    }

    let t = date("2024-05-01");
    let as_of = engine
        .query_facts(None, &FactPattern::default(), Some(t), 0.0)
        .unwrap();
    let range = engine
        .query_facts_in_range(None, &FactPattern::default(), Some(t), Some(t))
        .unwrap();

    let range_ids: Vec<&str> = range.iter().map(|f| f.id.as_str()).collect();
    assert!(!as_of.is_empty());
    for fact in &as_of {
        assert!(
            range_ids.contains(&fact.id.as_str()),
            "as-of fact {} missing from in_range(t, t)",
            fact.id
        );
    }
}

#[test]
fn batch_insert_is_atomic() {
    let (engine, _dir) = test_engine();
    let inputs = vec![
        fact_at("a", "b", "c", "2024-01-01"),
        FactInput {
            confidence: 5.0, // out of range
            ..fact_at("d", "e", "f", "2024-01-01")
        },
    ];
    assert!(engine.add_facts(inputs, None, Deadline::NONE).is_err());
    assert_eq!(engine.stats().unwrap().temporal_facts, 0);
}

#[test]
fn invalidate_then_delete_lifecycle() {
    let (engine, _dir) = test_engine();
    let inserted = engine
        .add_fact(fact_at("a", "b", "c", "2023-01-01"), Some("alice"), Deadline::NONE)
        .unwrap();

    let closed = engine
        .invalidate_fact(&inserted.id, Some(date("2024-01-01")), Some("alice"))
        .unwrap();
    assert_eq!(closed.valid_to, Some(date("2024-01-01")));
    assert!(engine
        .get_current_fact(Some("alice"), "a", "b")
        .unwrap()
        .is_none());

    engine.delete_fact(&inserted.id, Some("alice")).unwrap();
    assert!(engine
        .query_facts(Some("alice"), &FactPattern::default(), Some(date("2023-06-01")), 0.0)
        .unwrap()
        .is_empty());
}

#[test]
fn facts_by_subject_and_related_edges() {
    let (engine, _dir) = test_engine();
    let job = engine
        .add_fact(
            fact_at("alice", "works_at", "Acme", "2023-01-01"),
            Some("alice"),
            Deadline::NONE,
        )
        .unwrap();
    let city = engine
        .add_fact(
            fact_at("alice", "lives_in", "Berlin", "2023-01-01"),
            Some("alice"),
            Deadline::NONE,
        )
        .unwrap();

    let by_subject = engine.get_facts_by_subject(Some("alice"), "alice").unwrap();
    assert_eq!(by_subject.len(), 2);

    engine
        .add_fact_edge(&job.id, &city.id, "implies", 0.8, Some("alice"))
        .unwrap();
    let related = engine.get_related_facts(&job.id, Some("alice")).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].1.id, city.id);
    assert_eq!(related[0].0.relation_type, "implies");
}
