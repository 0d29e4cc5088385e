//! Property-based tests
//!
//! Invariants that must hold for all inputs:
//! - Sanitization is idempotent and never panics
//! - The decay-state mapping is total and monotone
//! - Vector primitives stay in their documented ranges
//! - DBSCAN is deterministic
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

mod sanitization {
    use super::*;
    use memoria::types::{sanitize_tag, sanitize_tags, sanitize_text, MAX_TAG_LENGTH};

    proptest! {
        #[test]
        fn sanitize_text_never_panics(s in ".*") {
            let _ = sanitize_text(&s);
        }

        #[test]
        fn sanitize_text_idempotent(s in ".*") {
            let once = sanitize_text(&s);
            prop_assert_eq!(sanitize_text(&once), once);
        }

        #[test]
        fn sanitize_text_strips_control_chars(s in ".*") {
            let cleaned = sanitize_text(&s);
            prop_assert!(cleaned
                .chars()
                .all(|c| !c.is_ascii_control() || c == '\n' || c == '\t'));
        }

        #[test]
        fn sanitize_tag_charset(s in ".{0,100}") {
            let tag = sanitize_tag(&s);
            prop_assert!(tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-'));
        }

        #[test]
        fn sanitize_tag_idempotent(s in ".{0,100}") {
            let once = sanitize_tag(&s);
            prop_assert_eq!(sanitize_tag(&once), once);
        }

        #[test]
        fn sanitized_tag_lists_respect_limits(
            tags in prop::collection::vec("[a-z0-9 _-]{1,50}", 0..20)
        ) {
            let input: Vec<String> = tags;
            let cleaned = sanitize_tags(&input).unwrap();
            prop_assert!(cleaned.len() <= input.len());
            prop_assert!(cleaned.iter().all(|t| t.len() <= MAX_TAG_LENGTH));
            // No duplicates survive
            let mut seen = std::collections::HashSet::new();
            prop_assert!(cleaned.iter().all(|t| seen.insert(t.clone())));
        }
    }
}

mod decay_states {
    use super::*;
    use memoria::lifecycle::{state_for_score, DecayConfig};
    use memoria::types::MemoryState;

    proptest! {
        /// Every score in [0, 1] maps to exactly one state
        #[test]
        fn mapping_is_total(score in 0.0f64..=1.0) {
            let config = DecayConfig::default();
            let _ = state_for_score(score, &config);
        }

        /// Higher scores never map to a "more decayed" state
        #[test]
        fn mapping_is_monotone(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let config = DecayConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let rank = |s: MemoryState| match s {
                MemoryState::Active => 3,
                MemoryState::Dormant => 2,
                MemoryState::Archived => 1,
                MemoryState::Expired => 0,
            };
            prop_assert!(rank(state_for_score(hi, &config)) >= rank(state_for_score(lo, &config)));
        }
    }

    #[test]
    fn thresholds_land_exactly() {
        let config = DecayConfig::default();
        assert_eq!(state_for_score(0.5, &config), MemoryState::Active);
        assert_eq!(state_for_score(0.1, &config), MemoryState::Dormant);
        assert_eq!(state_for_score(0.01, &config), MemoryState::Archived);
    }
}

mod decay_scores {
    use super::*;
    use chrono::{Duration, Utc};
    use memoria::lifecycle::{calculate_decay_score, DecayConfig};
    use memoria::types::{Memory, MemoryState, MemoryType};

    fn memory(importance: f64, confidence: f64, access_count: i64, age_days: i64) -> Memory {
        let now = Utc::now();
        Memory {
            id: "p".into(),
            user_context: "default".into(),
            content: serde_json::json!("x"),
            content_hash: "h".into(),
            embedding: None,
            embedding_dimension: None,
            tags: vec![],
            memory_type: MemoryType::Fact,
            source: "t".into(),
            confidence,
            importance_score: importance,
            similarity_threshold: 0.7,
            decay_rate: 0.01,
            access_count,
            parent_id: None,
            relation_type: None,
            cluster_id: None,
            state: MemoryState::Active,
            decay_score: 1.0,
            is_compressed: false,
            metadata: Default::default(),
            created_at: now - Duration::days(age_days),
            updated_at: now,
            accessed_at: Some(now - Duration::days(age_days)),
            deleted_at: None,
            last_decay_update: None,
            similarity: None,
        }
    }

    proptest! {
        /// Scores stay in [0, 1] for any reasonable memory shape
        #[test]
        fn score_is_clamped(
            importance in 0.0f64..=1.0,
            confidence in 0.0f64..=1.0,
            access_count in 0i64..100_000,
            age_days in 0i64..10_000,
        ) {
            let config = DecayConfig::default();
            let m = memory(importance, confidence, access_count, age_days);
            let score = calculate_decay_score(&m, Some(3), &config, Utc::now());
            prop_assert!((0.0..=1.0).contains(&score));
        }

        /// More age never raises the score (all else equal)
        #[test]
        fn older_scores_lower(
            importance in 0.1f64..=1.0,
            confidence in 0.1f64..=1.0,
            age in 0i64..1000,
        ) {
            let config = DecayConfig { relationship_boost: None, ..DecayConfig::default() };
            let now = Utc::now();
            let young = calculate_decay_score(&memory(importance, confidence, 0, age), None, &config, now);
            let old = calculate_decay_score(&memory(importance, confidence, 0, age + 100), None, &config, now);
            prop_assert!(old <= young + 1e-9);
        }
    }
}

mod vectors {
    use super::*;
    use memoria::vector::{centroid, coherence, cosine_distance, cosine_similarity};

    proptest! {
        #[test]
        fn similarity_is_bounded(
            a in prop::collection::vec(-10.0f32..10.0, 8),
            b in prop::collection::vec(-10.0f32..10.0, 8),
        ) {
            let sim = cosine_similarity(&a, &b);
            prop_assert!((-1.0 - 1e-6..=1.0 + 1e-6).contains(&sim));
            let dist = cosine_distance(&a, &b);
            prop_assert!((-1e-6..=2.0 + 1e-6).contains(&dist));
        }

        #[test]
        fn similarity_is_symmetric(
            a in prop::collection::vec(-10.0f32..10.0, 8),
            b in prop::collection::vec(-10.0f32..10.0, 8),
        ) {
            prop_assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
        }

        #[test]
        fn centroid_preserves_dimension(
            vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 1..10)
        ) {
            let refs: Vec<&[f32]> = vectors.iter().map(|v| v.as_slice()).collect();
            prop_assert_eq!(centroid(&refs).len(), 4);
        }

        #[test]
        fn coherence_of_identical_vectors_is_one(
            v in prop::collection::vec(0.1f32..1.0, 4),
            n in 2usize..6,
        ) {
            let refs: Vec<&[f32]> = (0..n).map(|_| v.as_slice()).collect();
            prop_assert!((coherence(&refs) - 1.0).abs() < 1e-5);
        }
    }
}

mod clustering_props {
    use super::*;
    use memoria::clustering::{dbscan, ClusterPoint, DbscanParams};

    proptest! {
        /// Same input, same output, and every point lands in exactly one
        /// bucket (a cluster or noise)
        #[test]
        fn dbscan_is_deterministic_and_total(
            raw in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..20)
        ) {
            let points: Vec<ClusterPoint> = raw
                .iter()
                .enumerate()
                .map(|(i, v)| ClusterPoint { id: format!("p{i}"), vector: v.clone() })
                .collect();
            let params = DbscanParams::default();

            let a = dbscan(&points, &params);
            let b = dbscan(&points, &params);
            prop_assert_eq!(&a.clusters, &b.clusters);
            prop_assert_eq!(&a.noise, &b.noise);

            let assigned: usize = a.clusters.values().map(|m| m.len()).sum();
            prop_assert_eq!(assigned + a.noise.len(), points.len());
        }
    }
}

mod token_estimates {
    use super::*;
    use memoria::scoring::estimate_tokens;

    proptest! {
        #[test]
        fn tokens_scale_with_chars(s in "\\PC{0,400}") {
            let tokens = estimate_tokens(&s);
            let chars = s.chars().count();
            prop_assert_eq!(tokens, chars.div_ceil(4));
        }
    }
}
