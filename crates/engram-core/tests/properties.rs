//! Property tests for the core invariants: unit-norm vectors, cosine
//! bounds, deterministic classification, and waypoint centroid stability
//! under arbitrary membership churn.

use chrono::Utc;
use proptest::prelude::*;

use engram_core::{
    cosine_similarity, dedup_tags, Embedder, SectorClassifier, Sector, SyntheticEmbedder,
    WaypointRecord,
};

const DIM: usize = 64;

fn vector_strategy() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0, DIM)
}

fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?']{1,200}"
}

proptest! {
    /// Every embedding is the configured dimension, finite, and unit norm.
    #[test]
    fn embeddings_are_unit_norm(text in text_strategy()) {
        let embedder = SyntheticEmbedder::new(DIM);
        let v = embedder.embed(&text).unwrap();
        prop_assert_eq!(v.len(), DIM);
        prop_assert!(v.iter().all(|x| x.is_finite()));
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        prop_assert!((norm - 1.0).abs() < 1e-3);
    }

    /// Cosine similarity never leaves [-1, 1], whatever the inputs.
    #[test]
    fn cosine_stays_bounded(a in vector_strategy(), b in vector_strategy()) {
        let score = cosine_similarity(&a, &b);
        prop_assert!((-1.0..=1.0).contains(&score));
        prop_assert!(score.is_finite());
    }

    /// Classification is deterministic, assigns 1-3 sectors, and the
    /// primary is always among them (and first).
    #[test]
    fn classifier_assignment_invariants(text in text_strategy()) {
        let classifier = SectorClassifier::new();
        let a = classifier.classify(&text);
        let b = classifier.classify(&text);

        prop_assert_eq!(a.primary, b.primary);
        prop_assert_eq!(a.sectors.clone(), b.sectors.clone());
        prop_assert!(!a.sectors.is_empty() && a.sectors.len() <= 3);
        prop_assert_eq!(a.sectors[0], a.primary);
    }

    /// The waypoint centroid stays unit norm through any absorb sequence.
    #[test]
    fn waypoint_mean_stays_unit_norm(vectors in proptest::collection::vec(vector_strategy(), 1..12)) {
        // Skip degenerate all-zero members.
        let vectors: Vec<Vec<f32>> = vectors
            .into_iter()
            .filter(|v| v.iter().any(|x| x.abs() > 1e-3))
            .collect();
        prop_assume!(!vectors.is_empty());

        let mut waypoint =
            WaypointRecord::seed(Sector::Semantic, "m0", &vectors[0], Utc::now());
        for (i, v) in vectors.iter().enumerate().skip(1) {
            waypoint.absorb(&format!("m{i}"), v).unwrap();
        }

        let norm: f32 = waypoint.mean.iter().map(|x| x * x).sum::<f32>().sqrt();
        prop_assert!((norm - 1.0).abs() < 1e-3, "norm was {}", norm);
        prop_assert_eq!(waypoint.member_ids.len(), vectors.len());
    }

    /// Tag de-duplication preserves first-occurrence order and uniqueness.
    #[test]
    fn tag_dedup_invariants(tags in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
        let deduped = dedup_tags(tags.clone());

        // Unique.
        let mut seen = std::collections::HashSet::new();
        for tag in &deduped {
            prop_assert!(seen.insert(tag.clone()));
        }
        // Order preserved: deduped is a subsequence of the input.
        let mut input = tags.iter();
        for tag in &deduped {
            prop_assert!(input.any(|t| t == tag));
        }
    }
}
