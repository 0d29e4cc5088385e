//! Per-session context window
//!
//! A token-bounded working set of memories per user. Crossing the
//! compression threshold summarizes the oldest third; filling the window
//! evicts the lowest-scoring entry. Scores refresh lazily on a fixed
//! interval.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cache::TieredCache;
use crate::compress::CompressionEngine;
use crate::error::{MemoriaError, Result};
use crate::lifecycle::content_text;
use crate::scoring::{estimate_tokens, AdaptPreferences, MemoryScorer};
use crate::storage::{self, Storage};

/// Window sizing and cadence
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub max_window_size: usize,
    pub max_tokens: usize,
    /// Fraction of `max_tokens` that triggers compression of old entries
    pub compression_threshold: f64,
    /// Seconds between rescoring passes
    pub scoring_interval_secs: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_window_size: 10,
            max_tokens: 8000,
            compression_threshold: 0.7,
            scoring_interval_secs: 60,
        }
    }
}

/// Task profiles with preset window sizes and weight preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Coding,
    Conversation,
    Analysis,
    Creative,
}

impl TaskType {
    fn window_size(&self) -> usize {
        match self {
            Self::Coding => 15,
            Self::Conversation => 10,
            Self::Analysis => 20,
            Self::Creative => 8,
        }
    }

    fn preferences(&self) -> AdaptPreferences {
        match self {
            Self::Coding => AdaptPreferences {
                is_relevant: true,
                is_frequent: true,
                ..Default::default()
            },
            Self::Conversation => AdaptPreferences {
                is_recent: true,
                ..Default::default()
            },
            Self::Analysis => AdaptPreferences {
                is_important: true,
                is_relevant: true,
                ..Default::default()
            },
            Self::Creative => AdaptPreferences {
                is_recent: true,
                is_relevant: true,
                ..Default::default()
            },
        }
    }
}

/// One memory held in a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowEntry {
    pub memory_id: String,
    /// Working copy of the content text; may be a compressed summary
    pub text: String,
    pub tokens: usize,
    pub score: f64,
    pub compressed: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Window {
    entries: Vec<WindowEntry>,
    last_scored: Option<DateTime<Utc>>,
}

impl Window {
    fn total_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.tokens).sum()
    }
}

/// Snapshot returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub user_context: String,
    pub entries: Vec<WindowEntry>,
    pub total_tokens: usize,
    pub max_tokens: usize,
    pub max_window_size: usize,
}

/// Manager for every per-user window
pub struct ContextWindowManager {
    storage: Storage,
    #[allow(dead_code)]
    cache: Arc<TieredCache>,
    compressor: CompressionEngine,
    scorer: RwLock<MemoryScorer>,
    windows: RwLock<HashMap<String, Window>>,
    config: RwLock<WindowConfig>,
}

impl ContextWindowManager {
    pub fn new(
        storage: Storage,
        cache: Arc<TieredCache>,
        compressor: CompressionEngine,
        config: WindowConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            compressor,
            scorer: RwLock::new(MemoryScorer::default()),
            windows: RwLock::new(HashMap::new()),
            config: RwLock::new(config),
        }
    }

    /// Add a memory to a user's window, compressing or evicting as needed
    pub fn add_to_window(&self, user_context: &str, memory_id: &str) -> Result<WindowSnapshot> {
        let memory = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, user_context, memory_id))?
            .ok_or_else(|| MemoriaError::NotFound(memory_id.to_string()))?;

        let now = Utc::now();
        let text = content_text(&memory.content);
        let tokens = estimate_tokens(&text);
        let score = self.scorer.read().score(&memory, None, now);
        let config = self.config.read().clone();

        {
            let mut windows = self.windows.write();
            let window = windows.entry(user_context.to_string()).or_default();

            self.rescore_if_due(user_context, window, now);

            // Duplicate adds refresh the entry instead of growing the window
            window.entries.retain(|e| e.memory_id != memory_id);

            let budget = (config.max_tokens as f64 * config.compression_threshold) as usize;
            if window.total_tokens() + tokens > budget {
                self.compress_oldest_third(window, now);
            }

            while window.entries.len() >= config.max_window_size {
                evict_lowest_score(window);
            }

            window.entries.push(WindowEntry {
                memory_id: memory_id.to_string(),
                text,
                tokens,
                score,
                compressed: false,
                added_at: now,
            });
        }

        self.storage
            .with_connection(|conn| storage::bump_access(conn, &[memory_id.to_string()]))?;

        Ok(self.snapshot(user_context))
    }

    /// Drop a memory from a user's window
    pub fn remove_from_window(&self, user_context: &str, memory_id: &str) -> WindowSnapshot {
        {
            let mut windows = self.windows.write();
            if let Some(window) = windows.get_mut(user_context) {
                window.entries.retain(|e| e.memory_id != memory_id);
            }
        }
        self.snapshot(user_context)
    }

    /// Adapt scoring weights and window size to a task profile
    pub fn adapt_window(
        &self,
        user_context: &str,
        task_type: TaskType,
        token_budget: Option<usize>,
    ) -> WindowSnapshot {
        {
            let mut scorer = self.scorer.write();
            scorer.adapt_weights(task_type.preferences());
        }
        {
            let mut config = self.config.write();
            config.max_window_size = task_type.window_size();
            if let Some(budget) = token_budget {
                config.max_tokens = budget;
            }
        }
        {
            // Shrink windows that exceed the new size
            let max = self.config.read().max_window_size;
            let mut windows = self.windows.write();
            if let Some(window) = windows.get_mut(user_context) {
                while window.entries.len() > max {
                    evict_lowest_score(window);
                }
            }
        }
        self.snapshot(user_context)
    }

    /// Current window contents for a user
    pub fn snapshot(&self, user_context: &str) -> WindowSnapshot {
        let config = self.config.read();
        let windows = self.windows.read();
        let window = windows.get(user_context);
        WindowSnapshot {
            user_context: user_context.to_string(),
            entries: window.map(|w| w.entries.clone()).unwrap_or_default(),
            total_tokens: window.map(|w| w.total_tokens()).unwrap_or(0),
            max_tokens: config.max_tokens,
            max_window_size: config.max_window_size,
        }
    }

    fn rescore_if_due(&self, user_context: &str, window: &mut Window, now: DateTime<Utc>) {
        let interval = Duration::seconds(self.config.read().scoring_interval_secs);
        let due = window
            .last_scored
            .map(|t| now - t >= interval)
            .unwrap_or(true);
        if !due {
            return;
        }
        window.last_scored = Some(now);

        let scorer = self.scorer.read();
        for entry in &mut window.entries {
            let memory = self
                .storage
                .with_connection(|conn| storage::get_memory(conn, user_context, &entry.memory_id))
                .ok()
                .flatten();
            if let Some(memory) = memory {
                entry.score = scorer.score(&memory, None, now);
            }
        }
    }

    fn compress_oldest_third(&self, window: &mut Window, now: DateTime<Utc>) {
        let mut order: Vec<usize> = (0..window.entries.len()).collect();
        order.sort_by_key(|&i| window.entries[i].added_at);
        let third = (window.entries.len() / 3).max(1);

        for &i in order.iter().take(third) {
            let entry = &mut window.entries[i];
            if entry.compressed {
                continue;
            }
            let age_days = (now - entry.added_at).num_seconds().max(0) as f64 / 86_400.0;
            let result = self.compressor.hierarchical_compress(
                &entry.text,
                crate::compress::CompressionKind::Generic,
                age_days,
                &[1.0, 7.0, 30.0],
            );
            entry.text = result.compressed;
            entry.tokens = estimate_tokens(&entry.text);
            entry.compressed = true;
        }
    }
}

fn evict_lowest_score(window: &mut Window) {
    if window.entries.is_empty() {
        return;
    }
    let lowest = window
        .entries
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    window.entries.remove(lowest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::queries::{insert_memory, new_memory_row};
    use crate::types::{CacheConfig, MemoryType, StoreInput};

    fn manager(config: WindowConfig) -> ContextWindowManager {
        ContextWindowManager::new(
            Storage::open_in_memory().unwrap(),
            Arc::new(TieredCache::new(&CacheConfig::default())),
            CompressionEngine::default(),
            config,
        )
    }

    fn seed(manager: &ContextWindowManager, id: &str, text: &str, importance: f64) {
        let input = StoreInput {
            content: serde_json::json!({ "text": text }),
            memory_type: MemoryType::Fact,
            source: "test".into(),
            confidence: 1.0,
            user_context: None,
            tags: vec![],
            importance_score: Some(importance),
            similarity_threshold: None,
            decay_rate: None,
            parent_id: None,
            relation_type: None,
            metadata: None,
            relate_to: None,
        };
        let memory = new_memory_row(
            id.to_string(),
            "default".into(),
            input.content.clone(),
            crate::embedding::content_hash(&input.content),
            &input,
            vec![],
            None,
            Utc::now(),
        );
        manager
            .storage
            .with_connection(|conn| insert_memory(conn, &memory))
            .unwrap();
    }

    #[test]
    fn test_add_and_remove() {
        let manager = manager(WindowConfig::default());
        seed(&manager, "m1", "first entry", 0.5);

        let snapshot = manager.add_to_window("default", "m1").unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert!(snapshot.total_tokens > 0);

        let snapshot = manager.remove_from_window("default", "m1");
        assert!(snapshot.entries.is_empty());
    }

    #[test]
    fn test_add_bumps_access() {
        let manager = manager(WindowConfig::default());
        seed(&manager, "m1", "counted", 0.5);
        manager.add_to_window("default", "m1").unwrap();

        let m = manager
            .storage
            .with_connection(|conn| storage::get_memory(conn, "default", "m1"))
            .unwrap()
            .unwrap();
        assert_eq!(m.access_count, 1);
    }

    #[test]
    fn test_unknown_memory_fails() {
        let manager = manager(WindowConfig::default());
        assert!(manager.add_to_window("default", "missing").is_err());
    }

    #[test]
    fn test_size_eviction_drops_lowest_score() {
        let manager = manager(WindowConfig {
            max_window_size: 2,
            ..WindowConfig::default()
        });
        seed(&manager, "low", "low importance entry", 0.0);
        seed(&manager, "high", "high importance entry", 1.0);
        seed(&manager, "next", "another high entry", 0.9);

        manager.add_to_window("default", "low").unwrap();
        manager.add_to_window("default", "high").unwrap();
        let snapshot = manager.add_to_window("default", "next").unwrap();

        let ids: Vec<&str> = snapshot
            .entries
            .iter()
            .map(|e| e.memory_id.as_str())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"low"));
    }

    #[test]
    fn test_token_pressure_compresses_oldest() {
        let long_text = "A sentence about systems. ".repeat(200);
        let manager = manager(WindowConfig {
            max_window_size: 10,
            max_tokens: estimate_tokens(&long_text) * 2,
            compression_threshold: 0.7,
            scoring_interval_secs: 60,
        });
        seed(&manager, "old", &long_text, 0.5);
        seed(&manager, "new", &long_text, 0.5);

        manager.add_to_window("default", "old").unwrap();
        let snapshot = manager.add_to_window("default", "new").unwrap();

        let old_entry = snapshot
            .entries
            .iter()
            .find(|e| e.memory_id == "old")
            .unwrap();
        assert!(old_entry.compressed);
        assert!(old_entry.tokens < estimate_tokens(&long_text));
    }

    #[test]
    fn test_adapt_window_presets() {
        let manager = manager(WindowConfig::default());
        let snapshot = manager.adapt_window("default", TaskType::Analysis, Some(16_000));
        assert_eq!(snapshot.max_window_size, 20);
        assert_eq!(snapshot.max_tokens, 16_000);

        let snapshot = manager.adapt_window("default", TaskType::Creative, None);
        assert_eq!(snapshot.max_window_size, 8);
    }
}
