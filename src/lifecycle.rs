//! Memory lifecycle: decay scoring, state transitions, preservation,
//! and retention cleanup
//!
//! Each memory carries a decay score in `[0, 1]` recomputed from age,
//! importance, access history, and confidence. The score maps onto the
//! state machine `active -> dormant -> archived -> expired`; entering
//! `archived` compresses the content, entering `expired` soft-deletes it.
//! Preservation tags pin a memory to `active` with a score floor of 0.95.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::TieredCache;
use crate::compress::CompressionEngine;
use crate::error::{MemoriaError, Result};
use crate::storage::{self, Storage};
use crate::types::*;

/// Decay engine configuration
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Fallback decay rate per day when a memory has none
    pub base_rate: f64,
    /// Weight of `log(1 + access_count)` on the score
    pub access_boost: f64,
    /// Optional weight of `log(1 + degree)`; disabled when `None`
    pub relationship_boost: Option<f64>,
    /// Tags that pin a memory to the active state (matched
    /// case-insensitively)
    pub preservation_tags: Vec<String>,
    /// Score at or above which a memory is active
    pub active_threshold: f64,
    /// Score at or above which a memory is dormant rather than archived
    pub archival_threshold: f64,
    /// Score at or above which a memory is archived rather than expired
    pub expiration_threshold: f64,
    /// Days a tombstoned expired memory survives before hard deletion
    pub retention_days: i64,
    /// A memory is reprocessed only after this long since its last pass
    pub reprocess_after: Duration,
    /// Age thresholds (days) for hierarchical compression levels
    pub compression_age_thresholds: Vec<f64>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            base_rate: 0.01,
            access_boost: 0.1,
            relationship_boost: Some(0.05),
            preservation_tags: vec![
                "permanent".into(),
                "important".into(),
                "bookmark".into(),
                "favorite".into(),
                "pinned".into(),
                "preserved".into(),
            ],
            active_threshold: 0.5,
            archival_threshold: 0.1,
            expiration_threshold: 0.01,
            retention_days: 30,
            reprocess_after: Duration::hours(1),
            compression_age_thresholds: vec![7.0, 30.0, 90.0],
        }
    }
}

/// Whether a preservation tag is active for this memory. An expired
/// `metadata.preservedUntil` cancels the tags.
pub fn is_preserved(memory: &Memory, config: &DecayConfig, now: DateTime<Utc>) -> bool {
    let tagged = memory.tags.iter().any(|tag| {
        config
            .preservation_tags
            .iter()
            .any(|p| p.eq_ignore_ascii_case(tag))
    });
    if !tagged {
        return false;
    }

    match memory.metadata.get("preservedUntil").and_then(|v| v.as_str()) {
        Some(until) => parse_timestamp(until).map(|t| t > now).unwrap_or(true),
        None => true,
    }
}

/// Recompute the decay score for a memory.
///
/// ```text
/// base  = importance * exp(-rate * days_since_access)
/// score = (base + access_boost * ln(1 + accesses)) * confidence
///         [+ rel_boost * ln(1 + degree)]
/// preserved memories floor at 0.95; everything clamps to [0, 1]
/// ```
pub fn calculate_decay_score(
    memory: &Memory,
    degree: Option<usize>,
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> f64 {
    let days = (now - memory.effective_accessed_at())
        .num_seconds()
        .max(0) as f64
        / 86_400.0;
    let rate = if memory.decay_rate > 0.0 {
        memory.decay_rate
    } else {
        config.base_rate
    };

    let base = memory.importance_score * (-rate * days).exp();
    let mut score = base + config.access_boost * (1.0 + memory.access_count as f64).ln();
    score *= memory.confidence;

    if let (Some(boost), Some(degree)) = (config.relationship_boost, degree) {
        score += boost * (1.0 + degree as f64).ln();
    }

    if is_preserved(memory, config, now) {
        score = score.max(0.95);
    }

    score.clamp(0.0, 1.0)
}

/// Map a decay score onto a lifecycle state
pub fn state_for_score(score: f64, config: &DecayConfig) -> MemoryState {
    if score >= config.active_threshold {
        MemoryState::Active
    } else if score >= config.archival_threshold {
        MemoryState::Dormant
    } else if score >= config.expiration_threshold {
        MemoryState::Archived
    } else {
        MemoryState::Expired
    }
}

/// Result of one decay batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayBatchResult {
    pub processed: usize,
    pub transitioned: usize,
    pub errors: usize,
}

/// Point-in-time decay report for a single memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayStatus {
    pub memory_id: MemoryId,
    pub decay_score: f64,
    pub stored_decay_score: f64,
    pub state: MemoryState,
    pub projected_state: MemoryState,
    pub preserved: bool,
    pub days_since_access: f64,
    pub access_count: i64,
    pub last_decay_update: Option<DateTime<Utc>>,
}

/// The lifecycle engine: scoring plus the side-effecting transitions
pub struct LifecycleEngine {
    storage: Storage,
    cache: Arc<TieredCache>,
    compressor: CompressionEngine,
    config: DecayConfig,
}

impl LifecycleEngine {
    pub fn new(
        storage: Storage,
        cache: Arc<TieredCache>,
        compressor: CompressionEngine,
        config: DecayConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            compressor,
            config,
        }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Current decay report for a memory; `NotFound` for unknown ids
    pub fn decay_status(&self, user_context: &str, id: &str) -> Result<DecayStatus> {
        let now = Utc::now();
        let memory = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, user_context, id))?
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))?;

        let degree = self.degree_if_enabled(user_context, id)?;
        let score = calculate_decay_score(&memory, degree, &self.config, now);

        Ok(DecayStatus {
            memory_id: memory.id.clone(),
            decay_score: score,
            stored_decay_score: memory.decay_score,
            state: memory.state,
            projected_state: state_for_score(score, &self.config),
            preserved: is_preserved(&memory, &self.config, now),
            days_since_access: (now - memory.effective_accessed_at()).num_seconds().max(0)
                as f64
                / 86_400.0,
            access_count: memory.access_count,
            last_decay_update: memory.last_decay_update,
        })
    }

    /// Rescore up to `size` stale memories in a context and apply any state
    /// transitions. Individual failures increment `errors` and never abort
    /// the batch.
    pub fn process_batch(&self, user_context: &str, size: usize) -> Result<DecayBatchResult> {
        let now = Utc::now();
        let cutoff = now - self.config.reprocess_after;
        let batch = self
            .storage
            .with_connection(|conn| storage::select_decay_batch(conn, user_context, cutoff, size))?;

        let mut result = DecayBatchResult::default();
        for memory in batch {
            result.processed += 1;
            match self.process_one(user_context, &memory, now) {
                Ok(true) => result.transitioned += 1,
                Ok(false) => {}
                Err(e) => {
                    result.errors += 1;
                    tracing::warn!(memory_id = %memory.id, error = %e, "decay pass failed");
                }
            }
        }
        Ok(result)
    }

    fn degree_if_enabled(&self, user_context: &str, id: &str) -> Result<Option<usize>> {
        if self.config.relationship_boost.is_none() {
            return Ok(None);
        }
        let degree = self
            .storage
            .with_connection(|conn| storage::degree(conn, user_context, id))?;
        Ok(Some(degree))
    }

    /// Rescore one memory and apply transition side effects. Returns true if
    /// the state changed.
    fn process_one(
        &self,
        user_context: &str,
        memory: &Memory,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let degree = self.degree_if_enabled(user_context, &memory.id)?;
        let score = calculate_decay_score(memory, degree, &self.config, now);
        let new_state = state_for_score(score, &self.config);
        let transitioned = new_state != memory.state;

        let mut metadata = memory.metadata.clone();
        if transitioned {
            let entry = json!({
                "from": memory.state.as_str(),
                "to": new_state.as_str(),
                "timestamp": format_timestamp(now),
            });
            match metadata.get_mut("transitions") {
                Some(serde_json::Value::Array(log)) => log.push(entry),
                _ => {
                    metadata.insert("transitions".into(), json!([entry]));
                }
            }
        }

        self.storage.with_transaction(|conn| {
            if transitioned && new_state == MemoryState::Archived && !memory.is_compressed {
                let text = content_text(&memory.content);
                let kind = CompressionEngine::kind_for(memory.memory_type, &text);
                let age_days =
                    (now - memory.created_at).num_seconds().max(0) as f64 / 86_400.0;
                let compressed = self.compressor.hierarchical_compress(
                    &text,
                    kind,
                    age_days,
                    &self.config.compression_age_thresholds,
                );
                metadata.insert("compressed".into(), json!(true));
                metadata.insert("originalSize".into(), json!(compressed.original_size));
                metadata.insert("compressionRatio".into(), json!(compressed.ratio));
                metadata.insert(
                    "compressionType".into(),
                    json!(compressed.kind.as_str()),
                );
                storage::replace_content_compressed(
                    conn,
                    &memory.id,
                    &serde_json::Value::String(compressed.compressed),
                    &metadata,
                )?;
            }

            storage::update_lifecycle(conn, &memory.id, score, new_state, &metadata)?;

            if transitioned && new_state == MemoryState::Expired {
                storage::soft_delete(conn, &[memory.id.clone()])?;
            }
            Ok(())
        })?;

        self.cache.invalidate_memory(&memory.id);
        if transitioned {
            tracing::debug!(
                memory_id = %memory.id,
                from = %memory.state,
                to = %new_state,
                score,
                "memory state transition"
            );
        }
        Ok(transitioned)
    }

    /// Pin a memory: score 1.0, active state, `preserved` tag, optional
    /// expiry recorded in `metadata.preservedUntil`.
    pub fn preserve_memory(
        &self,
        user_context: &str,
        id: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Memory> {
        let now = Utc::now();
        let memory = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, user_context, id))?
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))?;

        let mut tags = memory.tags.clone();
        if !tags.iter().any(|t| t.eq_ignore_ascii_case("preserved")) && tags.len() < MAX_TAGS {
            tags.push("preserved".to_string());
        }

        let mut metadata = memory.metadata.clone();
        match until {
            Some(until) => {
                metadata.insert("preservedUntil".into(), json!(format_timestamp(until)));
            }
            None => {
                metadata.remove("preservedUntil");
            }
        }

        self.storage.with_connection(|conn| {
            conn.execute(
                "UPDATE memories
                 SET decay_score = 1.0, state = 'active', tags = ?1, metadata = ?2,
                     last_decay_update = ?3
                 WHERE id = ?4 AND user_context = ?5 AND deleted_at IS NULL",
                rusqlite::params![
                    serde_json::to_string(&tags)?,
                    serde_json::to_string(&metadata)?,
                    format_timestamp(now),
                    id,
                    user_context
                ],
            )?;
            Ok(())
        })?;

        self.cache.invalidate_memory(id);
        self.storage
            .with_connection(|conn| storage::get_memory(conn, user_context, id))?
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))
    }

    /// Hard-delete expired memories tombstoned longer than the retention
    /// window, edges first, batch by batch in separate transactions.
    pub fn cleanup_expired_memories(
        &self,
        retention_days: Option<i64>,
        batch: usize,
    ) -> Result<usize> {
        let retention = retention_days.unwrap_or(self.config.retention_days);
        let cutoff = Utc::now() - Duration::days(retention);
        let batch = batch.max(1);

        let mut total = 0usize;
        loop {
            let deleted = self
                .storage
                .with_transaction(|conn| storage::hard_delete_expired(conn, cutoff, batch))?;
            total += deleted;
            if deleted < batch {
                break;
            }
        }
        if total > 0 {
            tracing::info!(deleted = total, retention_days = retention, "retention cleanup");
        }
        Ok(total)
    }
}

/// Flatten arbitrary content into text for compression
pub fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        other => {
            if let Some(text) = other.get("text").and_then(|t| t.as_str()) {
                text.to_string()
            } else {
                canonical_json(other)
            }
        }
    }
}
