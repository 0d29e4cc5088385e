//! Composite memory scoring
//!
//! Blends recency, importance, access frequency, and query relevance into a
//! single score used for context-window eviction and rescoring. Weights
//! renormalize to sum to 1 so adaptation never changes the score scale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Memory;

/// Component weights; normalized to sum to 1
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub recency: f64,
    pub importance: f64,
    pub access: f64,
    pub relevance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: 0.3,
            importance: 0.3,
            access: 0.2,
            relevance: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Scale weights so they sum to 1. A degenerate all-zero set resets to
    /// the defaults.
    pub fn normalize(&mut self) {
        let sum = self.recency + self.importance + self.access + self.relevance;
        if sum <= 0.0 {
            *self = Self::default();
            return;
        }
        self.recency /= sum;
        self.importance /= sum;
        self.access /= sum;
        self.relevance /= sum;
    }
}

/// Task-derived preferences for weight adaptation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AdaptPreferences {
    pub is_recent: bool,
    pub is_important: bool,
    pub is_frequent: bool,
    pub is_relevant: bool,
}

/// Scorer with adaptive weights and recency decay rate
#[derive(Debug, Clone)]
pub struct MemoryScorer {
    pub weights: ScoringWeights,
    /// Recency decay per hour
    pub lambda: f64,
    /// Normalization ceiling for access counts
    pub access_ceiling: i64,
}

impl Default for MemoryScorer {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            lambda: 0.1,
            access_ceiling: 100,
        }
    }
}

impl MemoryScorer {
    /// Score a memory against an optional query similarity
    pub fn score(&self, memory: &Memory, relevance_sim: Option<f64>, now: DateTime<Utc>) -> f64 {
        let w = self.weights;

        let recency = self.recency_component(memory, now);
        let importance = memory.importance_score.clamp(0.0, 1.0);
        let access = self.access_component(memory.access_count);
        let relevance = relevance_sim
            .map(|sim| sim.max(0.0).powf(0.7))
            .unwrap_or(0.0);

        (w.recency * recency + w.importance * importance + w.access * access
            + w.relevance * relevance)
            .clamp(0.0, 1.0)
    }

    fn recency_component(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        let age_hours =
            (now - memory.effective_accessed_at()).num_seconds().max(0) as f64 / 3600.0;
        (-self.lambda * age_hours).exp().clamp(0.0, 1.0)
    }

    fn access_component(&self, count: i64) -> f64 {
        let capped = count.clamp(0, self.access_ceiling) as f64;
        ((capped + 1.0).ln() / (self.access_ceiling as f64 + 1.0).ln()).clamp(0.0, 1.0)
    }

    /// Multiply preferred weights by 1.5 and renormalize. A recency
    /// preference also halves the decay rate so older entries stay
    /// competitive longer.
    pub fn adapt_weights(&mut self, prefs: AdaptPreferences) {
        if prefs.is_recent {
            self.weights.recency *= 1.5;
            self.lambda /= 2.0;
        }
        if prefs.is_important {
            self.weights.importance *= 1.5;
        }
        if prefs.is_frequent {
            self.weights.access *= 1.5;
        }
        if prefs.is_relevant {
            self.weights.relevance *= 1.5;
        }
        self.weights.normalize();
    }
}

/// Rough token estimate used for context-window budgeting
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryState, MemoryType};

    fn memory_with(access_count: i64, importance: f64, age_hours: i64) -> Memory {
        let now = Utc::now();
        Memory {
            id: "m".into(),
            user_context: "default".into(),
            content: serde_json::json!({"text": "x"}),
            content_hash: "h".into(),
            embedding: None,
            embedding_dimension: None,
            tags: vec![],
            memory_type: MemoryType::Fact,
            source: "test".into(),
            confidence: 1.0,
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
            created_at: now - chrono::Duration::hours(age_hours),
            updated_at: now,
            accessed_at: Some(now - chrono::Duration::hours(age_hours)),
            deleted_at: None,
            last_decay_update: None,
            similarity: None,
        }
    }

    #[test]
    fn test_weights_normalize() {
        let mut w = ScoringWeights {
            recency: 2.0,
            importance: 2.0,
            access: 2.0,
            relevance: 2.0,
        };
        w.normalize();
        assert!((w.recency - 0.25).abs() < 1e-9);
        let sum = w.recency + w.importance + w.access + w.relevance;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_beats_stale() {
        let scorer = MemoryScorer::default();
        let now = Utc::now();
        let fresh = scorer.score(&memory_with(0, 0.5, 0), None, now);
        let stale = scorer.score(&memory_with(0, 0.5, 72), None, now);
        assert!(fresh > stale);
    }

    #[test]
    fn test_access_is_log_scaled() {
        let scorer = MemoryScorer::default();
        let low = scorer.access_component(1);
        let mid = scorer.access_component(10);
        let high = scorer.access_component(100);
        assert!(low < mid && mid < high);
        // Log scale: 10x count far less than 10x score
        assert!(high < low * 10.0);
        assert!((high - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_relevance_power_curve() {
        let scorer = MemoryScorer::default();
        let now = Utc::now();
        let m = memory_with(0, 0.0, 1000);
        let weak = scorer.score(&m, Some(0.2), now);
        let strong = scorer.score(&m, Some(0.9), now);
        assert!(strong > weak);
        // Negative similarity clamps to zero contribution
        let negative = scorer.score(&m, Some(-0.5), now);
        assert!(negative.abs() < 1e-6);
    }

    #[test]
    fn test_adapt_weights_boosts_and_renormalizes() {
        let mut scorer = MemoryScorer::default();
        let lambda_before = scorer.lambda;
        scorer.adapt_weights(AdaptPreferences {
            is_recent: true,
            ..Default::default()
        });

        assert!((scorer.lambda - lambda_before / 2.0).abs() < 1e-12);
        let w = scorer.weights;
        let sum = w.recency + w.importance + w.access + w.relevance;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(w.recency > w.importance);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }
}
