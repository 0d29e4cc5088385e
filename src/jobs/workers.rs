//! Background workers for every job topic
//!
//! Each topic runs its configured number of tasks over the two queue lanes
//! (high lane drained first). Retryable failures re-enqueue with backoff up
//! to the attempt limit; permanent failures are recorded on the source row
//! where the topic calls for it. Shutdown closes the queues, lets in-flight
//! jobs finish, and joins every task.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{Namespace, TieredCache};
use crate::clustering::{self, ClusterPoint, DbscanParams};
use crate::embedding::EmbeddingProvider;
use crate::engine::MemoryEngine;
use crate::error::{MemoriaError, Result};
use crate::lifecycle::LifecycleEngine;
use crate::storage::{self, Storage};
use crate::types::*;
use crate::vector::silhouette;

use super::{Job, JobDispatcher, RateLimiter, Topic, MAX_ATTEMPTS};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Kill switch for the decay schedule
    pub decay_enabled: bool,
    /// Seconds between decay sweeps per user context
    pub decay_interval_secs: u64,
    /// Memories per decay batch
    pub decay_batch_size: usize,
    /// Items per batch-import chunk
    pub import_chunk_size: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            decay_enabled: true,
            decay_interval_secs: 3600,
            decay_batch_size: 100,
            import_chunk_size: 10,
        }
    }
}

/// Shared state handed to every worker
pub struct WorkerContext {
    pub storage: Storage,
    pub cache: Arc<TieredCache>,
    pub embedder: Arc<EmbeddingProvider>,
    pub engine: Arc<MemoryEngine>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub dispatcher: JobDispatcher,
    pub config: JobsConfig,
    /// Pauses the decay schedule without tearing workers down
    pub decay_paused: Arc<AtomicBool>,
}

impl Clone for WorkerContext {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            cache: self.cache.clone(),
            embedder: self.embedder.clone(),
            engine: self.engine.clone(),
            lifecycle: self.lifecycle.clone(),
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
            decay_paused: self.decay_paused.clone(),
        }
    }
}

/// Handle over the spawned worker tasks
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    dispatcher: JobDispatcher,
    decay_paused: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Pause the decay schedule (already-queued jobs still drain)
    pub fn pause_decay(&self) {
        self.decay_paused.store(true, Ordering::Relaxed);
    }

    pub fn resume_decay(&self) {
        self.decay_paused.store(false, Ordering::Relaxed);
    }

    /// Manually trigger a decay sweep for one user context
    pub fn trigger_decay(&self, user_context: &str) -> Result<Job> {
        self.dispatcher
            .enqueue(Topic::Decay, json!({ "user_context": user_context }), 5)
    }

    /// Close the queues, let in-flight jobs finish, join all tasks
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.dispatcher.close();
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("job workers stopped");
    }
}

/// Spawn all topic workers plus the decay scheduler
pub fn spawn_workers(ctx: WorkerContext) -> WorkerPool {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for topic in Topic::all() {
        let limiter = topic
            .rate_limit()
            .map(|(jobs, per)| Arc::new(RateLimiter::new(jobs, per)));
        for worker_idx in 0..topic.concurrency() {
            let ctx = ctx.clone();
            let limiter = limiter.clone();
            let topic = *topic;
            handles.push(tokio::spawn(async move {
                run_topic_worker(topic, worker_idx, ctx, limiter).await;
            }));
        }
    }

    if ctx.config.decay_enabled {
        let scheduler_ctx = ctx.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            run_decay_scheduler(scheduler_ctx, rx).await;
        }));
    } else {
        tracing::info!("decay schedule disabled by configuration");
    }

    WorkerPool {
        handles,
        dispatcher: ctx.dispatcher.clone(),
        decay_paused: ctx.decay_paused.clone(),
        shutdown_tx,
    }
}

async fn run_topic_worker(
    topic: Topic,
    worker_idx: usize,
    ctx: WorkerContext,
    limiter: Option<Arc<RateLimiter>>,
) {
    let (high, normal) = ctx.dispatcher.receivers(topic);
    tracing::debug!(%topic, worker_idx, "worker started");

    loop {
        // Drain the high lane first, then wait on both
        let job = if let Ok(job) = high.try_recv() {
            job
        } else {
            tokio::select! {
                biased;
                result = high.recv() => match result {
                    Ok(job) => job,
                    Err(_) => break,
                },
                result = normal.recv() => match result {
                    Ok(job) => job,
                    Err(_) => break,
                },
            }
        };

        if let Some(limiter) = &limiter {
            limiter.acquire().await;
        }

        let metrics = ctx.dispatcher.metrics();
        let started = Instant::now();
        match process_job(topic, &ctx, &job) {
            Ok(()) => {
                metrics.topic(topic).processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_retryable() && job.attempts + 1 < MAX_ATTEMPTS => {
                tracing::warn!(%topic, job_id = %job.id, attempts = job.attempts, error = %e, "job retrying");
                tokio::time::sleep(job.backoff()).await;
                if ctx.dispatcher.requeue(job.clone()).is_err() {
                    metrics.topic(topic).failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                metrics.topic(topic).failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%topic, job_id = %job.id, error = %e, "job failed permanently");
            }
        }
        metrics
            .topic(topic)
            .last_duration_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    tracing::debug!(%topic, worker_idx, "worker drained and exiting");
}

fn process_job(topic: Topic, ctx: &WorkerContext, job: &Job) -> Result<()> {
    match topic {
        Topic::Embedding => process_embedding(ctx, job),
        Topic::BatchImport => process_batch_import(ctx, job),
        Topic::Consolidation => process_consolidation(ctx, job),
        Topic::Clustering => process_clustering(ctx, job),
        Topic::Decay => process_decay(ctx, job),
    }
}

// ---------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------

fn process_embedding(ctx: &WorkerContext, job: &Job) -> Result<()> {
    let memory_id = payload_str(&job.payload, "memory_id")?;
    let content = payload_str(&job.payload, "content")?;

    // Idempotency: a redelivered job for an embedded row is done
    if ctx
        .storage
        .with_connection(|conn| storage::has_embedding(conn, &memory_id))?
    {
        return Ok(());
    }

    match ctx.embedder.embed(&content) {
        Ok(vector) => {
            let stored = ctx
                .storage
                .with_connection(|conn| storage::set_embedding(conn, &memory_id, &vector))?;
            if stored {
                ctx.cache
                    .set_json(Namespace::Embeddings, &memory_id, &vector, Some(ctx.cache.long_ttl()));
                ctx.cache.delete(Namespace::Memory, &memory_id);
            }
            Ok(())
        }
        Err(e @ (MemoriaError::DimensionMismatch { .. } | MemoriaError::Embedding(_))) => {
            // Model errors never succeed on retry; mark the row and complete
            record_embedding_error(ctx, &memory_id, &e)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn record_embedding_error(ctx: &WorkerContext, memory_id: &str, error: &MemoriaError) -> Result<()> {
    let sanitized = sanitize_job_error(&error.to_string());
    ctx.storage.with_connection(|conn| {
        if let Some(memory) = conn
            .query_row(
                "SELECT metadata FROM memories WHERE id = ?1",
                rusqlite::params![memory_id],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })?
        {
            let mut metadata: serde_json::Map<String, Value> =
                serde_json::from_str(&memory).unwrap_or_default();
            metadata.insert("embeddingError".into(), json!(sanitized));
            storage::set_metadata(conn, memory_id, &metadata)?;
        }
        Ok(())
    })
}

/// Sanitize an error message before persisting: control characters
/// stripped, SQL quotes escaped, at most 500 characters.
pub fn sanitize_job_error(message: &str) -> String {
    let stripped: String = message
        .chars()
        .filter(|c| !c.is_ascii_control())
        .collect::<String>()
        .replace('\'', "''");
    stripped.chars().take(500).collect()
}

// ---------------------------------------------------------------------
// Batch import
// ---------------------------------------------------------------------

fn process_batch_import(ctx: &WorkerContext, job: &Job) -> Result<()> {
    let user_context = job
        .payload
        .get("user_context")
        .and_then(|v| v.as_str())
        .map(String::from);
    let items: Vec<StoreInput> = serde_json::from_value(
        job.payload
            .get("memories")
            .cloned()
            .ok_or_else(|| MemoriaError::InvalidParams("memories: required".into()))?,
    )?;

    let total = items.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for (chunk_idx, chunk) in items.chunks(ctx.config.import_chunk_size).enumerate() {
        for item in chunk {
            let mut item = item.clone();
            if item.user_context.is_none() {
                item.user_context = user_context.clone();
            }
            match ctx.engine.store(&item, true) {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(error = %e, "batch import item failed");
                }
            }
        }
        tracing::info!(
            job_id = %job.id,
            chunk = chunk_idx,
            done = succeeded + failed,
            total,
            "batch import progress"
        );
    }

    tracing::info!(job_id = %job.id, succeeded, failed, total, "batch import finished");
    Ok(())
}

// ---------------------------------------------------------------------
// Consolidation
// ---------------------------------------------------------------------

fn process_consolidation(ctx: &WorkerContext, job: &Job) -> Result<()> {
    let user_context = normalize_user_context(
        job.payload.get("user_context").and_then(|v| v.as_str()),
    )?;
    let strategy = payload_str(&job.payload, "strategy")?;
    let memory_ids: Vec<String> = job
        .payload
        .get("memory_ids")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    match strategy.as_str() {
        "merge" => consolidate_merge(ctx, &user_context, &memory_ids),
        "summarize" => consolidate_summarize(ctx, &user_context, &memory_ids),
        "cluster" => consolidate_cluster(ctx, &user_context, &memory_ids),
        other => Err(MemoriaError::InvalidParams(format!(
            "strategy: unknown consolidation strategy '{other}'"
        ))),
    }
}

/// Merge several memories into one synthetic fact, then archive the
/// originals.
fn consolidate_merge(ctx: &WorkerContext, user_context: &str, ids: &[String]) -> Result<()> {
    if ids.len() < 2 {
        return Err(MemoriaError::InvalidParams(
            "memory_ids: merge requires at least 2 memories".into(),
        ));
    }

    let mut originals: Vec<Memory> = Vec::new();
    ctx.storage.with_connection(|conn| {
        for id in ids {
            if let Some(memory) = storage::get_memory(conn, user_context, id)? {
                originals.push(memory);
            }
        }
        Ok(())
    })?;
    if originals.len() < 2 {
        return Err(MemoriaError::InvalidParams(
            "memory_ids: fewer than 2 live memories to merge".into(),
        ));
    }

    let merged_content: Vec<Value> = originals.iter().map(|m| m.content.clone()).collect();
    let confidence = originals
        .iter()
        .map(|m| m.confidence)
        .fold(0.0f64, f64::max);
    let original_ids: Vec<&str> = originals.iter().map(|m| m.id.as_str()).collect();

    let input = StoreInput {
        content: json!({
            "merged": true,
            "originalIds": original_ids,
            "mergedContent": merged_content,
            "mergeDate": format_timestamp(chrono::Utc::now()),
        }),
        memory_type: MemoryType::Fact,
        source: "consolidation".into(),
        confidence,
        user_context: Some(user_context.to_string()),
        tags: vec![],
        importance_score: Some(0.8),
        similarity_threshold: None,
        decay_rate: None,
        parent_id: None,
        relation_type: None,
        metadata: None,
        relate_to: None,
    };
    let merged = ctx.engine.store(&input, true)?;

    archive_memories(ctx, &originals)?;
    tracing::info!(merged_id = %merged.id, originals = originals.len(), "merge consolidation done");
    Ok(())
}

/// Group by type and produce one insight memory holding a stub summary per
/// group, then archive the originals.
fn consolidate_summarize(ctx: &WorkerContext, user_context: &str, ids: &[String]) -> Result<()> {
    let mut originals: Vec<Memory> = Vec::new();
    ctx.storage.with_connection(|conn| {
        for id in ids {
            if let Some(memory) = storage::get_memory(conn, user_context, id)? {
                originals.push(memory);
            }
        }
        Ok(())
    })?;
    if originals.is_empty() {
        return Err(MemoriaError::InvalidParams(
            "memory_ids: nothing to summarize".into(),
        ));
    }

    let mut groups: BTreeMap<&'static str, Vec<&Memory>> = BTreeMap::new();
    for memory in &originals {
        groups.entry(memory.memory_type.as_str()).or_default().push(memory);
    }

    // Summarization proper is out of scope; stubs record counts per group
    let summaries: BTreeMap<&str, Value> = groups
        .iter()
        .map(|(kind, members)| {
            (
                *kind,
                json!({
                    "count": members.len(),
                    "summary": format!("{} {} memories consolidated", members.len(), kind),
                    "originalIds": members.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
                }),
            )
        })
        .collect();

    let input = StoreInput {
        content: json!({
            "summaries": summaries,
            "summarizedAt": format_timestamp(chrono::Utc::now()),
        }),
        memory_type: MemoryType::Insight,
        source: "consolidation".into(),
        confidence: 0.9,
        user_context: Some(user_context.to_string()),
        tags: vec![],
        importance_score: Some(0.7),
        similarity_threshold: None,
        decay_rate: None,
        parent_id: None,
        relation_type: None,
        metadata: None,
        relate_to: None,
    };
    let summary = ctx.engine.store(&input, true)?;

    archive_memories(ctx, &originals)?;
    tracing::info!(summary_id = %summary.id, originals = originals.len(), "summarize consolidation done");
    Ok(())
}

/// Cluster strategy: incremental when ids are given, otherwise a full run
/// with merge and split maintenance.
fn consolidate_cluster(ctx: &WorkerContext, user_context: &str, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        run_full_clustering(ctx, user_context)
    } else {
        run_incremental_clustering(ctx, user_context, ids)
    }
}

fn archive_memories(ctx: &WorkerContext, memories: &[Memory]) -> Result<()> {
    ctx.storage.with_connection(|conn| {
        for memory in memories {
            conn.execute(
                "UPDATE memories SET state = 'archived' WHERE id = ?1",
                rusqlite::params![memory.id],
            )?;
        }
        Ok(())
    })?;
    for memory in memories {
        ctx.cache.invalidate_memory(&memory.id);
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------

fn process_clustering(ctx: &WorkerContext, job: &Job) -> Result<()> {
    let user_context = normalize_user_context(
        job.payload.get("user_context").and_then(|v| v.as_str()),
    )?;
    let operation = payload_str(&job.payload, "operation")?;
    let memory_ids: Vec<String> = job
        .payload
        .get("memory_ids")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    match operation.as_str() {
        "full-clustering" => run_full_clustering(ctx, &user_context),
        "incremental" => run_incremental_clustering(ctx, &user_context, &memory_ids),
        "merge-clusters" => run_merge_clusters(ctx, &user_context),
        "split-clusters" => run_split_clusters(ctx, &user_context),
        other => Err(MemoriaError::InvalidParams(format!(
            "operation: unknown clustering operation '{other}'"
        ))),
    }
}

fn load_points(
    ctx: &WorkerContext,
    user_context: &str,
) -> Result<Vec<storage::EmbeddingPoint>> {
    ctx.storage
        .with_connection(|conn| storage::load_embedding_points(conn, user_context))
}

fn run_full_clustering(ctx: &WorkerContext, user_context: &str) -> Result<()> {
    let raw = load_points(ctx, user_context)?;
    let points: Vec<ClusterPoint> = raw
        .iter()
        .map(|p| ClusterPoint {
            id: p.id.clone(),
            vector: p.vector.clone(),
        })
        .collect();
    let vectors: std::collections::HashMap<String, Vec<f32>> = raw
        .iter()
        .map(|p| (p.id.clone(), p.vector.clone()))
        .collect();

    let mut assignments = clustering::dbscan(&points, &DbscanParams::default());
    let merged = clustering::merge_similar_clusters(&mut assignments, &vectors, 0.8);
    let split = clustering::split_large_clusters(&mut assignments, &vectors, 100, 0.5);

    ctx.engine.persist_assignments(&assignments.clusters)?;

    let labeled: Vec<(&[f32], i64)> = assignments
        .clusters
        .iter()
        .flat_map(|(cluster, members)| {
            members.iter().filter_map(|id| {
                vectors.get(id).map(|v| (v.as_slice(), *cluster))
            })
        })
        .collect();
    let silhouette_score = silhouette(&labeled);

    tracing::info!(
        user_context,
        clusters = assignments.clusters.len(),
        clustered = assignments.clustered_count(),
        noise = assignments.noise.len(),
        silhouette = silhouette_score,
        merged,
        split,
        "full clustering finished"
    );
    Ok(())
}

fn run_incremental_clustering(
    ctx: &WorkerContext,
    user_context: &str,
    fresh_ids: &[String],
) -> Result<()> {
    let raw = load_points(ctx, user_context)?;
    let fresh_set: std::collections::HashSet<&str> =
        fresh_ids.iter().map(|s| s.as_str()).collect();

    let existing: Vec<(ClusterPoint, Option<i64>)> = raw
        .iter()
        .filter(|p| !fresh_set.contains(p.id.as_str()))
        .map(|p| {
            (
                ClusterPoint {
                    id: p.id.clone(),
                    vector: p.vector.clone(),
                },
                p.cluster_id.as_deref().and_then(|c| c.parse().ok()),
            )
        })
        .collect();
    let fresh: Vec<ClusterPoint> = raw
        .iter()
        .filter(|p| fresh_set.contains(p.id.as_str()))
        .map(|p| ClusterPoint {
            id: p.id.clone(),
            vector: p.vector.clone(),
        })
        .collect();

    let assignments = clustering::incremental_dbscan(&existing, &fresh, &DbscanParams::default());

    // Persist only the fresh points' assignments
    let mut clusters: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for (id, cluster) in &assignments {
        clusters.entry(*cluster).or_default().push(id.clone());
    }
    ctx.engine.persist_assignments(&clusters)?;

    tracing::info!(
        user_context,
        fresh = fresh_ids.len(),
        assigned = assignments.len(),
        "incremental clustering finished"
    );
    Ok(())
}

fn current_assignments(
    raw: &[storage::EmbeddingPoint],
) -> (
    clustering::ClusterAssignments,
    std::collections::HashMap<String, Vec<f32>>,
) {
    let mut assignments = clustering::ClusterAssignments::default();
    let mut vectors = std::collections::HashMap::new();
    for point in raw {
        vectors.insert(point.id.clone(), point.vector.clone());
        match point.cluster_id.as_deref().and_then(|c| c.parse::<i64>().ok()) {
            Some(cluster) => assignments
                .clusters
                .entry(cluster)
                .or_default()
                .push(point.id.clone()),
            None => assignments.noise.push(point.id.clone()),
        }
    }
    (assignments, vectors)
}

fn run_merge_clusters(ctx: &WorkerContext, user_context: &str) -> Result<()> {
    let raw = load_points(ctx, user_context)?;
    let (mut assignments, vectors) = current_assignments(&raw);
    let merged = clustering::merge_similar_clusters(&mut assignments, &vectors, 0.8);
    if merged > 0 {
        ctx.engine.persist_assignments(&assignments.clusters)?;
    }
    tracing::info!(user_context, merged, "cluster merge finished");
    Ok(())
}

fn run_split_clusters(ctx: &WorkerContext, user_context: &str) -> Result<()> {
    let raw = load_points(ctx, user_context)?;
    let (mut assignments, vectors) = current_assignments(&raw);
    let split = clustering::split_large_clusters(&mut assignments, &vectors, 100, 0.5);
    if split > 0 {
        ctx.engine.persist_assignments(&assignments.clusters)?;
    }
    tracing::info!(user_context, split, "cluster split finished");
    Ok(())
}

// ---------------------------------------------------------------------
// Decay
// ---------------------------------------------------------------------

fn process_decay(ctx: &WorkerContext, job: &Job) -> Result<()> {
    let user_context = normalize_user_context(
        job.payload.get("user_context").and_then(|v| v.as_str()),
    )?;

    let started = Instant::now();
    let result = ctx
        .lifecycle
        .process_batch(&user_context, ctx.config.decay_batch_size)?;
    let cleaned = ctx.lifecycle.cleanup_expired_memories(None, 100)?;

    // TTL'd metrics snapshot for the stats surface
    ctx.cache.set_json(
        Namespace::Memory,
        &format!("decay-metrics:{user_context}"),
        &json!({
            "processed": result.processed,
            "transitioned": result.transitioned,
            "errors": result.errors,
            "cleaned": cleaned,
            "duration_ms": started.elapsed().as_millis() as u64,
        }),
        None,
    );

    tracing::info!(
        user_context,
        processed = result.processed,
        transitioned = result.transitioned,
        errors = result.errors,
        cleaned,
        "decay sweep finished"
    );
    Ok(())
}

/// Enqueue a decay job per user context on a fixed interval
async fn run_decay_scheduler(ctx: WorkerContext, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(ctx.config.decay_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The immediate first tick would sweep at startup; skip it
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if ctx.decay_paused.load(Ordering::Relaxed) {
                    continue;
                }
                let contexts = ctx
                    .storage
                    .with_connection(storage::distinct_user_contexts)
                    .unwrap_or_default();
                for user_context in contexts {
                    if let Err(e) = ctx.dispatcher.enqueue(
                        Topic::Decay,
                        json!({ "user_context": user_context }),
                        5,
                    ) {
                        tracing::warn!(error = %e, "decay enqueue failed");
                    }
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

fn payload_str(payload: &Value, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| MemoriaError::InvalidParams(format!("{key}: required")))
}
