//! Memory engine: ingestion, retrieval, and maintenance operations
//!
//! Every operation is scoped by user context and honors soft-delete
//! tombstones. Writes invalidate the memory cache entry and clear the
//! search namespace; reads go through the cache where one applies.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::cache::{Namespace, TieredCache};
use crate::clustering::{self, ClusterPoint, DbscanParams};
use crate::compress::CompressionEngine;
use crate::embedding::{content_hash, EmbeddingProvider};
use crate::error::{MemoriaError, Result};
use crate::jobs::{JobDispatcher, Topic};
use crate::lifecycle::content_text;
use crate::storage::{self, KnnQuery, ListQuery, MemoryStats, Storage};
use crate::types::*;
use crate::vector::coherence;

/// Report for `batch_store`: the batch always finishes, failures are
/// reported per item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStoreReport {
    pub stored: Vec<Memory>,
    pub failed: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemError {
    pub index: usize,
    pub error: String,
}

/// Report for `batch_delete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeleteReport {
    pub deleted: usize,
    pub requested: usize,
}

/// Report for `consolidate`. `memories_archived` counts memories assigned
/// to clusters; the cluster path does not state-transition members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateReport {
    #[serde(rename = "clustersCreated")]
    pub clusters_created: usize,
    #[serde(rename = "memoriesArchived")]
    pub memories_archived: usize,
}

/// On-demand cluster description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_id: String,
    pub size: usize,
    pub coherence: f64,
}

/// The memory engine
pub struct MemoryEngine {
    storage: Storage,
    embedder: Arc<EmbeddingProvider>,
    cache: Arc<TieredCache>,
    compressor: CompressionEngine,
    dispatcher: Option<JobDispatcher>,
    config: EngineConfig,
}

impl MemoryEngine {
    pub fn new(
        storage: Storage,
        embedder: Arc<EmbeddingProvider>,
        cache: Arc<TieredCache>,
        compressor: CompressionEngine,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            embedder,
            cache,
            compressor,
            dispatcher: None,
            config,
        }
    }

    /// Attach the job system; without it every store embeds synchronously
    pub fn with_dispatcher(mut self, dispatcher: JobDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn embedder(&self) -> &Arc<EmbeddingProvider> {
        &self.embedder
    }

    // -----------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------

    /// Ingest a memory. Duplicate content within a user context resolves as
    /// a dedup hit: the existing row is access-bumped and returned.
    pub fn store(&self, input: &StoreInput, async_mode: bool) -> Result<Memory> {
        let user_context = normalize_user_context(input.user_context.as_deref())?;
        validate_store_input(input)?;
        let tags = sanitize_tags(&input.tags)?;

        let hash = content_hash(&input.content);
        if let Some(hit) = self
            .storage
            .with_connection(|conn| storage::find_by_hash(conn, &user_context, &hash))?
        {
            return self.resolve_dedup_hit(&user_context, &hit.id);
        }

        let serialized = canonical_json(&input.content);
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        // Oversized content is compressed before it ever hits a row
        let (content, metadata_extra, is_compressed) =
            if serialized.len() > COMPRESSION_THRESHOLD_BYTES {
                let text = content_text(&input.content);
                let kind = CompressionEngine::kind_for(input.memory_type, &text);
                let result = self.compressor.compress(&text, kind);
                let mut extra = serde_json::Map::new();
                extra.insert("compressed".into(), json!(true));
                extra.insert("originalSize".into(), json!(result.original_size));
                extra.insert("compressedSize".into(), json!(result.compressed_size));
                extra.insert("compressionRatio".into(), json!(result.ratio));
                extra.insert("compressionType".into(), json!("adaptive"));
                (
                    serde_json::Value::String(result.compressed),
                    Some(extra),
                    true,
                )
            } else {
                (input.content.clone(), None, false)
            };

        let go_async =
            async_mode && self.config.enable_async_processing && self.dispatcher.is_some();
        let embedding = if go_async {
            None
        } else {
            Some(self.embedder.embed(&serialized)?)
        };

        let mut memory = storage::new_memory_row(
            id.clone(),
            user_context.clone(),
            content,
            hash.clone(),
            input,
            tags,
            embedding,
            now,
        );
        memory.is_compressed = is_compressed;
        if let Some(extra) = metadata_extra {
            memory.metadata.extend(extra);
        }

        let inserted = self
            .storage
            .with_connection(|conn| match storage::insert_memory(conn, &memory) {
                Ok(()) => Ok(true),
                Err(MemoriaError::Database(e)) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e),
            })?;
        if !inserted {
            // A concurrent store won the unique race; collapse to dedup
            let hit = self
                .storage
                .with_connection(|conn| storage::find_by_hash(conn, &user_context, &hash))?
                .ok_or_else(|| MemoriaError::Conflict("dedup race lost twice".into()))?;
            return self.resolve_dedup_hit(&user_context, &hit.id);
        }

        if go_async {
            if let Some(dispatcher) = &self.dispatcher {
                let priority = input
                    .importance_score
                    .map(|i| (i * 10.0).round().clamp(0.0, 10.0) as u8)
                    .unwrap_or(5);
                if let Err(e) = dispatcher.enqueue(
                    Topic::Embedding,
                    json!({
                        "memory_id": id,
                        "content": serialized,
                        "priority": priority,
                    }),
                    priority,
                ) {
                    tracing::warn!(memory_id = %id, error = %e, "embedding enqueue failed");
                }
            }
        }

        if let Some(relate_to) = &input.relate_to {
            self.apply_relate_to(&user_context, &id, relate_to);
        }

        self.cache
            .set_json(Namespace::Memory, &memory.id, &memory, None);
        self.cache.clear_namespace(Namespace::Search);

        Ok(memory)
    }

    fn resolve_dedup_hit(&self, user_context: &str, id: &str) -> Result<Memory> {
        self.storage
            .with_connection(|conn| storage::bump_access(conn, &[id.to_string()]))?;
        self.cache.invalidate_memory(id);
        let refreshed = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, user_context, id))?
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))?;
        self.cache
            .set_json(Namespace::Memory, id, &refreshed, None);
        Ok(refreshed)
    }

    /// Best-effort relation creation during store: a missing endpoint fails
    /// that item alone.
    fn apply_relate_to(&self, user_context: &str, from_id: &str, targets: &[RelateTo]) {
        for target in targets {
            let relation_type = target
                .relation_type
                .as_deref()
                .map(RelationType::normalize)
                .unwrap_or(RelationType::RelatesTo);
            let strength = target.strength.unwrap_or(0.5).clamp(0.0, 1.0);
            let result = self.storage.with_connection(|conn| {
                if storage::get_memory(conn, user_context, &target.memory_id)?.is_none() {
                    return Err(MemoriaError::NotFound(target.memory_id.clone()));
                }
                storage::upsert_relation(conn, from_id, &target.memory_id, relation_type, strength)
            });
            if let Err(e) = result {
                tracing::warn!(
                    from = from_id,
                    to = %target.memory_id,
                    error = %e,
                    "relate_to entry skipped"
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // Search / list / get
    // -----------------------------------------------------------------

    /// Semantic search with result caching and access bumping
    pub fn search(&self, input: &SearchInput) -> Result<Vec<Memory>> {
        let user_context = normalize_user_context(input.user_context.as_deref())?;
        validate_search_input(input)?;

        let threshold = input.threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        let limit = input.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let tags = input
            .tags
            .as_deref()
            .map(sanitize_tags)
            .transpose()?
            .unwrap_or_default();

        let cache_id = TieredCache::hash_identifier(&canonical_json(&json!({
            "query": input.query,
            "ctx": user_context,
            "type": input.memory_type.map(|t| t.as_str()),
            "tags": tags,
            "threshold": threshold,
            "limit": limit,
        })));
        if let Some(cached) = self.cache.get_json::<Vec<Memory>>(Namespace::Search, &cache_id) {
            return Ok(cached);
        }

        let query_vector = self.embedder.embed(&input.query)?;
        let results = self.storage.with_connection(|conn| {
            storage::knn_search(
                conn,
                &KnnQuery {
                    user_context: &user_context,
                    vector: &query_vector,
                    memory_type: input.memory_type,
                    tags: &tags,
                    threshold,
                    limit,
                },
            )
        })?;

        let ids: Vec<String> = results.iter().map(|m| m.id.clone()).collect();
        self.storage
            .with_connection(|conn| storage::bump_access(conn, &ids))?;

        self.cache
            .set_json(Namespace::Search, &cache_id, &results, None);
        Ok(results)
    }

    /// Paged listing, newest first. Compressed rows are rehydrated for
    /// display; the stored rows stay compressed.
    pub fn list(&self, input: &ListInput) -> Result<Vec<Memory>> {
        let user_context = normalize_user_context(input.user_context.as_deref())?;
        let limit = input.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(MemoriaError::InvalidParams(format!(
                "limit: must be between 1 and {MAX_SEARCH_LIMIT}"
            )));
        }
        let tags = input
            .tags
            .as_deref()
            .map(sanitize_tags)
            .transpose()?
            .unwrap_or_default();

        let rows = self.storage.with_connection(|conn| {
            storage::list_memories(
                conn,
                &ListQuery {
                    user_context: &user_context,
                    memory_type: input.memory_type,
                    tags: &tags,
                    limit,
                    offset: input.offset.unwrap_or(0),
                },
            )
        })?;

        Ok(rows
            .into_iter()
            .map(|mut memory| {
                if memory.is_compressed {
                    let summary = self.compressor.decompress(&content_text(&memory.content));
                    memory.content = json!({ "text": summary });
                    memory.is_compressed = false;
                }
                memory
            })
            .collect())
    }

    /// Fetch one memory, trying the cache first
    pub fn get_memory(&self, user_context: &str, id: &str) -> Result<Option<Memory>> {
        if let Some(cached) = self.cache.get_json::<Memory>(Namespace::Memory, id) {
            if cached.user_context == user_context {
                return Ok(Some(cached));
            }
            return Ok(None);
        }
        let memory = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, user_context, id))?;
        if let Some(memory) = &memory {
            self.cache.set_json(Namespace::Memory, id, memory, None);
        }
        Ok(memory)
    }

    // -----------------------------------------------------------------
    // Update / delete
    // -----------------------------------------------------------------

    /// Update whitelisted fields. With `preserve_timestamps` the previous
    /// `updated_at` is restored inside the same transaction.
    pub fn update(&self, input: &UpdateInput) -> Result<Memory> {
        let user_context = normalize_user_context(input.user_context.as_deref())?;
        validate_update_input(input)?;

        let existing = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, &user_context, &input.id))?
            .ok_or_else(|| MemoriaError::NotFound(input.id.clone()))?;

        let mut fields = input.updates.clone();
        if let Some(tags) = &fields.tags {
            fields.tags = Some(sanitize_tags(tags)?);
        }

        self.storage.with_transaction(|conn| {
            storage::update_fields(conn, &user_context, &input.id, &fields)?;
            if input.preserve_timestamps {
                storage::restore_updated_at(conn, &input.id, existing.updated_at)?;
            }
            Ok(())
        })?;

        self.cache.invalidate_memory(&input.id);
        self.storage
            .with_connection(|conn| storage::get_memory(conn, &user_context, &input.id))?
            .ok_or_else(|| MemoriaError::NotFound(input.id.clone()))
    }

    /// Soft-delete by id or content hash. Returns false when nothing was
    /// live to delete.
    pub fn delete(&self, input: &DeleteInput) -> Result<bool> {
        let user_context = normalize_user_context(input.user_context.as_deref())?;

        let id = match (&input.id, &input.content_hash) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(hash)) => self
                .storage
                .with_connection(|conn| storage::find_by_hash(conn, &user_context, hash))?
                .map(|m| m.id),
            (None, None) => {
                return Err(MemoriaError::InvalidParams(
                    "id: either id or content_hash is required".into(),
                ))
            }
        };

        let Some(id) = id else { return Ok(false) };

        // Confirm the row is visible in this context before touching it
        let visible = self
            .storage
            .with_connection(|conn| storage::get_memory(conn, &user_context, &id))?;
        if visible.is_none() {
            return Ok(false);
        }

        let deleted = self
            .storage
            .with_connection(|conn| storage::soft_delete(conn, &[id.clone()]))?;
        self.cache.invalidate_memory(&id);
        Ok(deleted > 0)
    }

    /// Per-item store; the batch never aborts
    pub fn batch_store(&self, input: &BatchStoreInput) -> Result<BatchStoreReport> {
        if input.memories.is_empty() || input.memories.len() > 100 {
            return Err(MemoriaError::InvalidParams(
                "memories: batch size must be between 1 and 100".into(),
            ));
        }

        let mut report = BatchStoreReport {
            stored: Vec::new(),
            failed: Vec::new(),
        };
        for (index, item) in input.memories.iter().enumerate() {
            let mut item = item.clone();
            if item.user_context.is_none() {
                item.user_context = input.user_context.clone();
            }
            match self.store(&item, true) {
                Ok(memory) => report.stored.push(memory),
                Err(e) => report.failed.push(BatchItemError {
                    index,
                    error: e.to_string(),
                }),
            }
        }
        Ok(report)
    }

    /// Bulk soft-delete
    pub fn batch_delete(&self, input: &BatchDeleteInput) -> Result<BatchDeleteReport> {
        if input.ids.is_empty() {
            return Err(MemoriaError::InvalidParams(
                "ids: at least one id is required".into(),
            ));
        }
        let user_context = normalize_user_context(input.user_context.as_deref())?;

        let mut visible: Vec<String> = Vec::new();
        self.storage.with_connection(|conn| {
            for id in &input.ids {
                if storage::get_memory(conn, &user_context, id)?.is_some() {
                    visible.push(id.clone());
                }
            }
            Ok(())
        })?;

        let deleted = self
            .storage
            .with_connection(|conn| storage::soft_delete(conn, &visible))?;
        for id in &visible {
            self.cache.invalidate_memory(id);
        }
        Ok(BatchDeleteReport {
            deleted,
            requested: input.ids.len(),
        })
    }

    // -----------------------------------------------------------------
    // Graph search
    // -----------------------------------------------------------------

    /// Seeded search plus breadth expansion over relations and parent
    /// links. Each returned node carries `metadata.relationships`.
    pub fn graph_search(&self, input: &GraphSearchInput) -> Result<Vec<Memory>> {
        let depth = input.depth.unwrap_or(1).clamp(1, 3);
        let user_context = normalize_user_context(input.search.user_context.as_deref())?;

        let seeds = self.search(&input.search)?;
        let mut seen: HashSet<String> = seeds.iter().map(|m| m.id.clone()).collect();
        let mut result: Vec<Memory> = seeds;

        let mut frontier: VecDeque<(String, usize)> = result
            .iter()
            .map(|m| (m.id.clone(), 0usize))
            .collect();

        self.storage.with_connection(|conn| {
            while let Some((id, level)) = frontier.pop_front() {
                if level >= depth {
                    continue;
                }
                let mut neighbors: Vec<String> = Vec::new();
                for edge in storage::outgoing_relations(conn, &id)? {
                    neighbors.push(edge.to_memory_id);
                }
                for edge in storage::incoming_relations(conn, &id)? {
                    neighbors.push(edge.from_memory_id);
                }
                neighbors.extend(storage::children_of(conn, &user_context, &id)?);
                if let Some(parent) = storage::parent_of(conn, &user_context, &id)? {
                    neighbors.push(parent);
                }

                for neighbor in neighbors {
                    if seen.contains(&neighbor) {
                        continue;
                    }
                    seen.insert(neighbor.clone());
                    if let Some(memory) = storage::get_memory(conn, &user_context, &neighbor)? {
                        result.push(memory);
                        frontier.push_back((neighbor, level + 1));
                    }
                }
            }
            Ok(())
        })?;

        // Attach relationship metadata to every node
        self.storage.with_connection(|conn| {
            for memory in &mut result {
                let edges = storage::relations_for(conn, &memory.id)?;
                let relationships: Vec<serde_json::Value> = edges
                    .iter()
                    .map(|e| {
                        let related = if e.from_memory_id == memory.id {
                            &e.to_memory_id
                        } else {
                            &e.from_memory_id
                        };
                        json!({
                            "relatedId": related,
                            "type": e.relation_type.as_str(),
                            "strength": e.strength,
                        })
                    })
                    .collect();
                memory
                    .metadata
                    .insert("relationships".into(), json!(relationships));
            }
            Ok(())
        })?;

        Ok(result)
    }

    // -----------------------------------------------------------------
    // Consolidation
    // -----------------------------------------------------------------

    /// Full DBSCAN over the context's embeddings; persists assignments.
    /// `memories_archived` means assigned-to-cluster.
    pub fn consolidate(&self, input: &ConsolidateInput) -> Result<ConsolidateReport> {
        if !self.config.enable_clustering {
            return Err(MemoriaError::Config("clustering is disabled".into()));
        }
        let user_context = normalize_user_context(input.user_context.as_deref())?;
        let threshold = input.threshold.unwrap_or(0.8);
        if !(0.5..=0.95).contains(&threshold) {
            return Err(MemoriaError::InvalidParams(
                "threshold: must be between 0.5 and 0.95".into(),
            ));
        }
        let min_cluster_size = input.min_cluster_size.unwrap_or(3);
        if min_cluster_size < 2 {
            return Err(MemoriaError::InvalidParams(
                "min_cluster_size: must be at least 2".into(),
            ));
        }

        let points: Vec<ClusterPoint> = self
            .storage
            .with_connection(|conn| storage::load_embedding_points(conn, &user_context))?
            .into_iter()
            .map(|p| ClusterPoint {
                id: p.id,
                vector: p.vector,
            })
            .collect();

        let params = DbscanParams {
            epsilon: 1.0 - threshold,
            min_points: min_cluster_size,
            min_cluster_size: 2,
        };
        let assignments = clustering::dbscan(&points, &params);

        self.persist_assignments(&assignments.clusters)?;

        Ok(ConsolidateReport {
            clusters_created: assignments.clusters.len(),
            memories_archived: assignments.clustered_count(),
        })
    }

    /// Write cluster assignments and invalidate affected cache entries
    pub fn persist_assignments(
        &self,
        clusters: &std::collections::BTreeMap<i64, Vec<String>>,
    ) -> Result<()> {
        self.storage.with_transaction(|conn| {
            for (cluster_id, members) in clusters {
                let label = cluster_id.to_string();
                for member in members {
                    storage::set_cluster(conn, member, Some(&label))?;
                }
            }
            Ok(())
        })?;
        for members in clusters.values() {
            for member in members {
                self.cache.invalidate_memory(member);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Relations
    // -----------------------------------------------------------------

    /// Create or update a relation; both endpoints must be live in context
    pub fn create_relation(&self, input: &RelateInput) -> Result<MemoryRelation> {
        let user_context = normalize_user_context(input.user_context.as_deref())?;
        let relation_type = RelationType::normalize(&input.relation_type);
        let strength = input.strength.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&strength) {
            return Err(MemoriaError::InvalidParams(
                "strength: must be between 0 and 1".into(),
            ));
        }

        let relation = self.storage.with_connection(|conn| {
            for id in [&input.from_memory_id, &input.to_memory_id] {
                if storage::get_memory(conn, &user_context, id)?.is_none() {
                    return Err(MemoriaError::NotFound(id.clone()));
                }
            }
            storage::upsert_relation(
                conn,
                &input.from_memory_id,
                &input.to_memory_id,
                relation_type,
                strength,
            )
        })?;

        self.cache.invalidate_memory(&input.from_memory_id);
        self.cache.invalidate_memory(&input.to_memory_id);
        Ok(relation)
    }

    /// Create `from -> to` plus the reverse edge with the reverse type
    pub fn create_bidirectional_relation(
        &self,
        input: &RelateInput,
    ) -> Result<(MemoryRelation, MemoryRelation)> {
        let forward = self.create_relation(input)?;
        let reverse_input = RelateInput {
            from_memory_id: input.to_memory_id.clone(),
            to_memory_id: input.from_memory_id.clone(),
            relation_type: RelationType::normalize(&input.relation_type)
                .reverse()
                .as_str()
                .to_string(),
            strength: input.strength,
            user_context: input.user_context.clone(),
        };
        let reverse = self.create_relation(&reverse_input)?;
        Ok((forward, reverse))
    }

    /// Delete a relation; true when an edge existed
    pub fn delete_relation(&self, input: &UnrelateInput) -> Result<bool> {
        let deleted = self.storage.with_connection(|conn| {
            storage::delete_relation(conn, &input.from_memory_id, &input.to_memory_id)
        })?;
        if deleted {
            self.cache.invalidate_memory(&input.from_memory_id);
            self.cache.invalidate_memory(&input.to_memory_id);
        }
        Ok(deleted)
    }

    /// Every edge touching a memory
    pub fn get_memory_relations(
        &self,
        user_context: &str,
        id: &str,
    ) -> Result<Vec<MemoryRelation>> {
        self.storage.with_connection(|conn| {
            if storage::get_memory(conn, user_context, id)?.is_none() {
                return Err(MemoriaError::NotFound(id.to_string()));
            }
            storage::relations_for(conn, id)
        })
    }

    // -----------------------------------------------------------------
    // Aggregations
    // -----------------------------------------------------------------

    pub fn stats(&self, user_context: Option<&str>) -> Result<MemoryStats> {
        let user_context = normalize_user_context(user_context)?;
        self.storage
            .with_connection(|conn| storage::get_stats(conn, &user_context))
    }

    pub fn tag_counts(&self, user_context: Option<&str>) -> Result<Vec<(String, i64)>> {
        let user_context = normalize_user_context(user_context)?;
        self.storage
            .with_connection(|conn| storage::tag_counts(conn, &user_context))
    }

    /// Clusters with size and on-demand coherence
    pub fn clusters(&self, user_context: Option<&str>) -> Result<Vec<ClusterInfo>> {
        let user_context = normalize_user_context(user_context)?;
        let counts = self
            .storage
            .with_connection(|conn| storage::cluster_counts(conn, &user_context))?;
        let points = self
            .storage
            .with_connection(|conn| storage::load_embedding_points(conn, &user_context))?;

        let mut by_cluster: HashMap<String, Vec<&[f32]>> = HashMap::new();
        for point in &points {
            if let Some(cluster) = &point.cluster_id {
                by_cluster
                    .entry(cluster.clone())
                    .or_default()
                    .push(&point.vector);
            }
        }

        Ok(counts
            .into_iter()
            .map(|(cluster_id, size)| {
                let coherence = by_cluster
                    .get(&cluster_id)
                    .map(|vectors| coherence(vectors))
                    .unwrap_or(1.0);
                ClusterInfo {
                    cluster_id,
                    size: size as usize,
                    coherence,
                }
            })
            .collect())
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

fn validate_store_input(input: &StoreInput) -> Result<()> {
    if !input.memory_type.is_user_storable() {
        return Err(MemoriaError::InvalidParams(format!(
            "type: '{}' is reserved for the consolidation engine",
            input.memory_type
        )));
    }
    if !(0.0..=1.0).contains(&input.confidence) {
        return Err(MemoriaError::InvalidParams(
            "confidence: must be between 0 and 1".into(),
        ));
    }
    if let Some(importance) = input.importance_score {
        if !(0.0..=1.0).contains(&importance) {
            return Err(MemoriaError::InvalidParams(
                "importance_score: must be between 0 and 1".into(),
            ));
        }
    }
    if let Some(rate) = input.decay_rate {
        if rate < 0.0 {
            return Err(MemoriaError::InvalidParams(
                "decay_rate: must be non-negative".into(),
            ));
        }
    }
    let size = canonical_json(&input.content).len();
    if size > MAX_CONTENT_SIZE {
        return Err(MemoriaError::InvalidParams(format!(
            "content: exceeds {MAX_CONTENT_SIZE} bytes ({size})"
        )));
    }
    Ok(())
}

fn validate_search_input(input: &SearchInput) -> Result<()> {
    if input.query.is_empty() || input.query.len() > MAX_QUERY_LENGTH {
        return Err(MemoriaError::InvalidParams(format!(
            "query: must be between 1 and {MAX_QUERY_LENGTH} characters"
        )));
    }
    if let Some(limit) = input.limit {
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(MemoriaError::InvalidParams(format!(
                "limit: must be between 1 and {MAX_SEARCH_LIMIT}"
            )));
        }
    }
    if let Some(threshold) = input.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MemoriaError::InvalidParams(
                "threshold: must be between 0 and 1".into(),
            ));
        }
    }
    Ok(())
}

fn validate_update_input(input: &UpdateInput) -> Result<()> {
    if let Some(confidence) = input.updates.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MemoriaError::InvalidParams(
                "updates.confidence: must be between 0 and 1".into(),
            ));
        }
    }
    if let Some(importance) = input.updates.importance_score {
        if !(0.0..=1.0).contains(&importance) {
            return Err(MemoriaError::InvalidParams(
                "updates.importance_score: must be between 0 and 1".into(),
            ));
        }
    }
    if let Some(memory_type) = input.updates.memory_type {
        if !memory_type.is_user_storable() {
            return Err(MemoriaError::InvalidParams(format!(
                "updates.type: '{memory_type}' is reserved for the consolidation engine"
            )));
        }
    }
    Ok(())
}
