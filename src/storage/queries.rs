//! Database queries for memory rows

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde_json::Value;

use crate::error::{MemoriaError, Result};
use crate::types::*;
use crate::vector::cosine_similarity;

/// Column list shared by every memory SELECT so row mapping stays consistent
pub const MEMORY_COLUMNS: &str = "id, user_context, content, content_hash, embedding, \
     embedding_dimension, tags, memory_type, source, confidence, importance_score, \
     similarity_threshold, decay_rate, access_count, parent_id, relation_type, cluster_id, \
     state, decay_score, is_compressed, metadata, created_at, updated_at, accessed_at, \
     deleted_at, last_decay_update";

/// Encode an embedding as little-endian f32 bytes
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes back into a vector
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Parse a memory from a database row
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let content_raw: String = row.get("content")?;
    let content: Value =
        serde_json::from_str(&content_raw).unwrap_or(Value::String(content_raw));

    let tags_raw: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_raw).unwrap_or_default();

    let metadata_raw: String = row.get("metadata")?;
    let metadata = serde_json::from_str(&metadata_raw).unwrap_or_default();

    let embedding_bytes: Option<Vec<u8>> = row.get("embedding")?;
    let embedding = embedding_bytes.map(|b| bytes_to_embedding(&b));
    let embedding_dimension: Option<i64> = row.get("embedding_dimension")?;

    let memory_type_raw: String = row.get("memory_type")?;
    let state_raw: String = row.get("state")?;

    let created_at_raw: String = row.get("created_at")?;
    let updated_at_raw: String = row.get("updated_at")?;
    let accessed_at_raw: Option<String> = row.get("accessed_at")?;
    let deleted_at_raw: Option<String> = row.get("deleted_at")?;
    let last_decay_raw: Option<String> = row.get("last_decay_update")?;

    let now = Utc::now();

    Ok(Memory {
        id: row.get("id")?,
        user_context: row.get("user_context")?,
        content,
        content_hash: row.get("content_hash")?,
        embedding,
        embedding_dimension: embedding_dimension.map(|d| d as usize),
        tags,
        memory_type: memory_type_raw.parse().unwrap_or(MemoryType::Fact),
        source: row.get("source")?,
        confidence: row.get("confidence")?,
        importance_score: row.get("importance_score")?,
        similarity_threshold: row.get("similarity_threshold")?,
        decay_rate: row.get("decay_rate")?,
        access_count: row.get("access_count")?,
        parent_id: row.get("parent_id")?,
        relation_type: row.get("relation_type")?,
        cluster_id: row.get("cluster_id")?,
        state: state_raw.parse().unwrap_or_default(),
        decay_score: row.get("decay_score")?,
        is_compressed: row.get::<_, i64>("is_compressed")? != 0,
        metadata,
        created_at: parse_timestamp(&created_at_raw).unwrap_or(now),
        updated_at: parse_timestamp(&updated_at_raw).unwrap_or(now),
        accessed_at: accessed_at_raw.as_deref().and_then(parse_timestamp),
        deleted_at: deleted_at_raw.as_deref().and_then(parse_timestamp),
        last_decay_update: last_decay_raw.as_deref().and_then(parse_timestamp),
        similarity: None,
    })
}

/// Insert a fully-populated memory row
pub fn insert_memory(conn: &Connection, memory: &Memory) -> Result<()> {
    conn.execute(
        "INSERT INTO memories (id, user_context, content, content_hash, embedding,
            embedding_dimension, tags, memory_type, source, confidence, importance_score,
            similarity_threshold, decay_rate, access_count, parent_id, relation_type,
            cluster_id, state, decay_score, is_compressed, metadata, created_at, updated_at,
            accessed_at, deleted_at, last_decay_update)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        params![
            memory.id,
            memory.user_context,
            canonical_json(&memory.content),
            memory.content_hash,
            memory.embedding.as_deref().map(embedding_to_bytes),
            memory.embedding_dimension.map(|d| d as i64),
            serde_json::to_string(&memory.tags)?,
            memory.memory_type.as_str(),
            memory.source,
            memory.confidence,
            memory.importance_score,
            memory.similarity_threshold,
            memory.decay_rate,
            memory.access_count,
            memory.parent_id,
            memory.relation_type,
            memory.cluster_id,
            memory.state.as_str(),
            memory.decay_score,
            memory.is_compressed as i64,
            serde_json::to_string(&memory.metadata)?,
            format_timestamp(memory.created_at),
            format_timestamp(memory.updated_at),
            memory.accessed_at.map(format_timestamp),
            memory.deleted_at.map(format_timestamp),
            memory.last_decay_update.map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// Fetch a non-deleted memory by id, scoped to a user context
pub fn get_memory(conn: &Connection, user_context: &str, id: &str) -> Result<Option<Memory>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE id = ?1 AND user_context = ?2 AND deleted_at IS NULL"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    match stmt.query_row(params![id, user_context], memory_from_row) {
        Ok(memory) => Ok(Some(memory)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// First non-deleted memory matching a content hash within a user context
pub fn find_by_hash(conn: &Connection, user_context: &str, hash: &str) -> Result<Option<Memory>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE user_context = ?1 AND content_hash = ?2 AND deleted_at IS NULL
         LIMIT 1"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    match stmt.query_row(params![user_context, hash], memory_from_row) {
        Ok(memory) => Ok(Some(memory)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parameters for a nearest-neighbor search
pub struct KnnQuery<'a> {
    pub user_context: &'a str,
    pub vector: &'a [f32],
    pub memory_type: Option<MemoryType>,
    pub tags: &'a [String],
    pub threshold: f64,
    pub limit: usize,
}

/// Nearest-neighbor search: predicate pushdown in SQL, exact cosine scoring
/// over the candidates. Rows whose stored dimension differs from the query
/// vector are excluded up front (cross-dimension search is forbidden).
pub fn knn_search(conn: &Connection, query: &KnnQuery<'_>) -> Result<Vec<Memory>> {
    let mut sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE user_context = ?1
           AND deleted_at IS NULL
           AND embedding IS NOT NULL
           AND embedding_dimension = ?2"
    );
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(query.user_context.to_string()),
        Box::new(query.vector.len() as i64),
    ];

    if let Some(t) = query.memory_type {
        args.push(Box::new(t.as_str().to_string()));
        sql.push_str(&format!(" AND memory_type = ?{}", args.len()));
    }

    if !query.tags.is_empty() {
        let mut placeholders = Vec::with_capacity(query.tags.len());
        for tag in query.tags {
            args.push(Box::new(tag.clone()));
            placeholders.push(format!("?{}", args.len()));
        }
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM json_each(memories.tags)
                 WHERE json_each.value IN ({}))",
            placeholders.join(", ")
        ));
    }

    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(params_ref.as_slice(), memory_from_row)?;

    let mut scored: Vec<Memory> = Vec::new();
    for row in rows {
        let mut memory = row?;
        let Some(embedding) = memory.embedding.as_deref() else {
            continue;
        };
        let similarity = cosine_similarity(embedding, query.vector);
        if similarity >= query.threshold {
            memory.similarity = Some(similarity);
            scored.push(memory);
        }
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(query.limit);
    Ok(scored)
}

/// Parameters for paged listing
pub struct ListQuery<'a> {
    pub user_context: &'a str,
    pub memory_type: Option<MemoryType>,
    pub tags: &'a [String],
    pub limit: usize,
    pub offset: usize,
}

/// Page through non-deleted memories, newest first
pub fn list_memories(conn: &Connection, query: &ListQuery<'_>) -> Result<Vec<Memory>> {
    let mut sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE user_context = ?1 AND deleted_at IS NULL"
    );
    let mut args: Vec<Box<dyn rusqlite::ToSql>> =
        vec![Box::new(query.user_context.to_string())];

    if let Some(t) = query.memory_type {
        args.push(Box::new(t.as_str().to_string()));
        sql.push_str(&format!(" AND memory_type = ?{}", args.len()));
    }

    if !query.tags.is_empty() {
        let mut placeholders = Vec::with_capacity(query.tags.len());
        for tag in query.tags {
            args.push(Box::new(tag.clone()));
            placeholders.push(format!("?{}", args.len()));
        }
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM json_each(memories.tags)
                 WHERE json_each.value IN ({}))",
            placeholders.join(", ")
        ));
    }

    args.push(Box::new(query.limit as i64));
    sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ?{}", args.len()));
    args.push(Box::new(query.offset as i64));
    sql.push_str(&format!(" OFFSET ?{}", args.len()));

    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(params_ref.as_slice(), memory_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Atomically bump access counters: `access_count += 1, accessed_at = now`
pub fn bump_access(conn: &Connection, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let now = format_timestamp(Utc::now());
    let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "UPDATE memories SET access_count = access_count + 1, accessed_at = ?1
         WHERE id IN ({}) AND deleted_at IS NULL",
        placeholders.join(", ")
    );
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];
    for id in ids {
        args.push(Box::new(id.clone()));
    }
    let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
    Ok(conn.execute(&sql, params_ref.as_slice())?)
}

/// Soft-delete: set the tombstone, leave the row in place
pub fn soft_delete(conn: &Connection, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let now = format_timestamp(Utc::now());
    let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "UPDATE memories SET deleted_at = ?1
         WHERE id IN ({}) AND deleted_at IS NULL",
        placeholders.join(", ")
    );
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];
    for id in ids {
        args.push(Box::new(id.clone()));
    }
    let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
    Ok(conn.execute(&sql, params_ref.as_slice())?)
}

/// Apply whitelisted field updates. Tags must already be sanitized.
/// Returns the number of rows changed.
pub fn update_fields(
    conn: &Connection,
    user_context: &str,
    id: &str,
    fields: &UpdateFields,
) -> Result<usize> {
    let mut sets: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(tags) = &fields.tags {
        args.push(Box::new(serde_json::to_string(tags)?));
        sets.push(format!("tags = ?{}", args.len()));
    }
    if let Some(confidence) = fields.confidence {
        args.push(Box::new(confidence));
        sets.push(format!("confidence = ?{}", args.len()));
    }
    if let Some(importance) = fields.importance_score {
        args.push(Box::new(importance));
        sets.push(format!("importance_score = ?{}", args.len()));
    }
    if let Some(memory_type) = fields.memory_type {
        args.push(Box::new(memory_type.as_str().to_string()));
        sets.push(format!("memory_type = ?{}", args.len()));
    }
    if let Some(source) = &fields.source {
        args.push(Box::new(source.clone()));
        sets.push(format!("source = ?{}", args.len()));
    }

    if sets.is_empty() {
        return Ok(0);
    }

    args.push(Box::new(id.to_string()));
    let id_pos = args.len();
    args.push(Box::new(user_context.to_string()));
    let ctx_pos = args.len();

    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?{} AND user_context = ?{} AND deleted_at IS NULL",
        sets.join(", "),
        id_pos,
        ctx_pos
    );
    let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
    Ok(conn.execute(&sql, params_ref.as_slice())?)
}

/// Overwrite `updated_at` with an explicit value. The trigger leaves explicit
/// writes alone, so this restores the pre-update timestamp for
/// `preserve_timestamps`.
pub fn restore_updated_at(
    conn: &Connection,
    id: &str,
    updated_at: chrono::DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE memories SET updated_at = ?1 WHERE id = ?2",
        params![format_timestamp(updated_at), id],
    )?;
    Ok(())
}

/// Store an embedding vector for a memory. Returns false if the row is gone.
pub fn set_embedding(conn: &Connection, id: &str, vector: &[f32]) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE memories SET embedding = ?1, embedding_dimension = ?2
         WHERE id = ?3 AND deleted_at IS NULL",
        params![embedding_to_bytes(vector), vector.len() as i64, id],
    )?;
    Ok(changed > 0)
}

/// Whether a memory already has an embedding
pub fn has_embedding(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT embedding IS NOT NULL FROM memories WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;
    Ok(found == Some(1))
}

/// Replace metadata wholesale
pub fn set_metadata(
    conn: &Connection,
    id: &str,
    metadata: &serde_json::Map<String, Value>,
) -> Result<()> {
    conn.execute(
        "UPDATE memories SET metadata = ?1 WHERE id = ?2",
        params![serde_json::to_string(metadata)?, id],
    )?;
    Ok(())
}

/// Persist a lifecycle pass over one memory
pub fn update_lifecycle(
    conn: &Connection,
    id: &str,
    decay_score: f64,
    state: MemoryState,
    metadata: &serde_json::Map<String, Value>,
) -> Result<()> {
    conn.execute(
        "UPDATE memories
         SET decay_score = ?1, state = ?2, metadata = ?3, last_decay_update = ?4
         WHERE id = ?5",
        params![
            decay_score,
            state.as_str(),
            serde_json::to_string(metadata)?,
            format_timestamp(Utc::now()),
            id
        ],
    )?;
    Ok(())
}

/// Swap content for its compressed form
pub fn replace_content_compressed(
    conn: &Connection,
    id: &str,
    content: &Value,
    metadata: &serde_json::Map<String, Value>,
) -> Result<()> {
    conn.execute(
        "UPDATE memories SET content = ?1, is_compressed = 1, metadata = ?2 WHERE id = ?3",
        params![canonical_json(content), serde_json::to_string(metadata)?, id],
    )?;
    Ok(())
}

/// Assign or clear a cluster id
pub fn set_cluster(conn: &Connection, id: &str, cluster_id: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE memories SET cluster_id = ?1 WHERE id = ?2",
        params![cluster_id, id],
    )?;
    Ok(())
}

/// An embedding point for clustering
pub struct EmbeddingPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub cluster_id: Option<String>,
}

/// Load every embedded, non-deleted memory in a context for clustering
pub fn load_embedding_points(conn: &Connection, user_context: &str) -> Result<Vec<EmbeddingPoint>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, embedding, cluster_id FROM memories
         WHERE user_context = ?1 AND deleted_at IS NULL AND embedding IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![user_context], |row| {
        let bytes: Vec<u8> = row.get(1)?;
        Ok(EmbeddingPoint {
            id: row.get(0)?,
            vector: bytes_to_embedding(&bytes),
            cluster_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Memories due for a decay pass: not deleted, not expired, last updated
/// before the cutoff, oldest first.
pub fn select_decay_batch(
    conn: &Connection,
    user_context: &str,
    cutoff: chrono::DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE user_context = ?1
           AND deleted_at IS NULL
           AND state != 'expired'
           AND (last_decay_update IS NULL OR last_decay_update < ?2)
         ORDER BY last_decay_update ASC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(
        params![user_context, format_timestamp(cutoff), limit as i64],
        memory_from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Hard-delete tombstoned, expired memories older than the cutoff, edges
/// first. Caller wraps this in a transaction. Returns deleted memory count.
pub fn hard_delete_expired(
    conn: &Connection,
    cutoff: chrono::DateTime<Utc>,
    batch: usize,
) -> Result<usize> {
    let cutoff_str = format_timestamp(cutoff);

    let mut stmt = conn.prepare_cached(
        "SELECT id FROM memories
         WHERE deleted_at IS NOT NULL AND deleted_at < ?1 AND state = 'expired'
         LIMIT ?2",
    )?;
    let ids: Vec<String> = stmt
        .query_map(params![cutoff_str, batch as i64], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let in_clause = placeholders.join(", ");
    let args: Vec<&dyn rusqlite::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

    conn.execute(
        &format!(
            "DELETE FROM memory_relations
             WHERE from_memory_id IN ({in_clause}) OR to_memory_id IN ({in_clause})"
        ),
        args.as_slice(),
    )?;
    let deleted = conn.execute(
        &format!("DELETE FROM memories WHERE id IN ({in_clause})"),
        args.as_slice(),
    )?;

    Ok(deleted)
}

/// Aggregate statistics for a user context
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStats {
    pub total_memories: i64,
    pub by_type: std::collections::BTreeMap<String, i64>,
    pub by_state: std::collections::BTreeMap<String, i64>,
    pub with_embedding: i64,
    pub compressed: i64,
    pub total_relations: i64,
    pub cluster_count: i64,
    pub avg_importance: f64,
    pub avg_decay_score: f64,
}

/// Compute aggregate stats, scoped to a user context
pub fn get_stats(conn: &Connection, user_context: &str) -> Result<MemoryStats> {
    let (total, with_embedding, compressed, avg_importance, avg_decay): (
        i64,
        i64,
        i64,
        f64,
        f64,
    ) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(embedding IS NOT NULL), 0),
                COALESCE(SUM(is_compressed), 0),
                COALESCE(AVG(importance_score), 0.0),
                COALESCE(AVG(decay_score), 0.0)
         FROM memories WHERE user_context = ?1 AND deleted_at IS NULL",
        params![user_context],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        },
    )?;

    let by_type = group_count(
        conn,
        "SELECT memory_type, COUNT(*) FROM memories
         WHERE user_context = ?1 AND deleted_at IS NULL GROUP BY memory_type",
        user_context,
    )?;
    let by_state = group_count(
        conn,
        "SELECT state, COUNT(*) FROM memories
         WHERE user_context = ?1 AND deleted_at IS NULL GROUP BY state",
        user_context,
    )?;

    let total_relations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_relations r
         JOIN memories f ON f.id = r.from_memory_id
         JOIN memories t ON t.id = r.to_memory_id
         WHERE f.user_context = ?1 AND f.deleted_at IS NULL
           AND t.user_context = ?1 AND t.deleted_at IS NULL",
        params![user_context],
        |row| row.get(0),
    )?;

    let cluster_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT cluster_id) FROM memories
         WHERE user_context = ?1 AND deleted_at IS NULL AND cluster_id IS NOT NULL",
        params![user_context],
        |row| row.get(0),
    )?;

    Ok(MemoryStats {
        total_memories: total,
        by_type,
        by_state,
        with_embedding,
        compressed,
        total_relations,
        cluster_count,
        avg_importance,
        avg_decay_score: avg_decay,
    })
}

fn group_count(
    conn: &Connection,
    sql: &str,
    user_context: &str,
) -> Result<std::collections::BTreeMap<String, i64>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![user_context], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Every user context with at least one live memory
pub fn distinct_user_contexts(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT user_context FROM memories WHERE deleted_at IS NULL",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Tag usage counts, most used first
pub fn tag_counts(conn: &Connection, user_context: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT je.value, COUNT(*) FROM memories m, json_each(m.tags) je
         WHERE m.user_context = ?1 AND m.deleted_at IS NULL
         GROUP BY je.value ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map(params![user_context], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Cluster membership counts, largest first
pub fn cluster_counts(conn: &Connection, user_context: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT cluster_id, COUNT(*) FROM memories
         WHERE user_context = ?1 AND deleted_at IS NULL AND cluster_id IS NOT NULL
         GROUP BY cluster_id ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map(params![user_context], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Build a new memory row from validated inputs with defaulted lifecycle
/// fields. The caller decides id, hash, embedding and compression.
#[allow(clippy::too_many_arguments)]
pub fn new_memory_row(
    id: String,
    user_context: String,
    content: Value,
    content_hash: String,
    input: &StoreInput,
    tags: Vec<String>,
    embedding: Option<Vec<f32>>,
    now: chrono::DateTime<Utc>,
) -> Memory {
    let embedding_dimension = embedding.as_ref().map(|v| v.len());
    Memory {
        id,
        user_context,
        content,
        content_hash,
        embedding,
        embedding_dimension,
        tags,
        memory_type: input.memory_type,
        source: input.source.clone(),
        confidence: input.confidence,
        importance_score: input.importance_score.unwrap_or(0.5),
        similarity_threshold: input
            .similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
        decay_rate: input.decay_rate.unwrap_or(0.01),
        access_count: 0,
        parent_id: input.parent_id.clone(),
        relation_type: input.relation_type.clone(),
        cluster_id: None,
        state: MemoryState::Active,
        decay_score: 1.0,
        is_compressed: false,
        metadata: input.metadata.clone().unwrap_or_default(),
        created_at: now,
        updated_at: now,
        accessed_at: None,
        deleted_at: None,
        last_decay_update: Some(now),
        similarity: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn sample_input() -> StoreInput {
        StoreInput {
            content: serde_json::json!({"text": "hello"}),
            memory_type: MemoryType::Fact,
            source: "test".into(),
            confidence: 0.9,
            user_context: None,
            tags: vec![],
            importance_score: None,
            similarity_threshold: None,
            decay_rate: None,
            parent_id: None,
            relation_type: None,
            metadata: None,
            relate_to: None,
        }
    }

    fn insert_sample(
        storage: &Storage,
        id: &str,
        ctx: &str,
        text: &str,
        embedding: Option<Vec<f32>>,
    ) -> Memory {
        let input = StoreInput {
            content: serde_json::json!({ "text": text }),
            ..sample_input()
        };
        let memory = new_memory_row(
            id.to_string(),
            ctx.to_string(),
            input.content.clone(),
            crate::embedding::content_hash(&input.content),
            &input,
            vec!["sample".to_string()],
            embedding,
            Utc::now(),
        );
        storage
            .with_connection(|conn| insert_memory(conn, &memory))
            .unwrap();
        memory
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "m1", "u1", "roundtrip", Some(vec![1.0, 0.0]));

        let fetched = storage
            .with_connection(|conn| get_memory(conn, "u1", "m1"))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, "m1");
        assert_eq!(fetched.content["text"], "roundtrip");
        assert_eq!(fetched.embedding, Some(vec![1.0, 0.0]));
        assert_eq!(fetched.embedding_dimension, Some(2));
        assert_eq!(fetched.tags, vec!["sample"]);
        assert_eq!(fetched.state, MemoryState::Active);
    }

    #[test]
    fn test_get_memory_scopes_user_context() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "m1", "u1", "scoped", None);

        let cross = storage
            .with_connection(|conn| get_memory(conn, "u2", "m1"))
            .unwrap();
        assert!(cross.is_none());
    }

    #[test]
    fn test_find_by_hash_skips_deleted() {
        let storage = Storage::open_in_memory().unwrap();
        let memory = insert_sample(&storage, "m1", "u1", "dedup-me", None);

        let found = storage
            .with_connection(|conn| find_by_hash(conn, "u1", &memory.content_hash))
            .unwrap();
        assert!(found.is_some());

        storage
            .with_connection(|conn| soft_delete(conn, &[memory.id.clone()]))
            .unwrap();
        let gone = storage
            .with_connection(|conn| find_by_hash(conn, "u1", &memory.content_hash))
            .unwrap();
        assert!(gone.is_none());
    }

    #[test]
    fn test_knn_search_threshold_and_order() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "close", "u1", "a", Some(vec![1.0, 0.0, 0.0]));
        insert_sample(&storage, "near", "u1", "b", Some(vec![0.9, 0.4, 0.0]));
        insert_sample(&storage, "far", "u1", "c", Some(vec![0.0, 0.0, 1.0]));

        let results = storage
            .with_connection(|conn| {
                knn_search(
                    conn,
                    &KnnQuery {
                        user_context: "u1",
                        vector: &[1.0, 0.0, 0.0],
                        memory_type: None,
                        tags: &[],
                        threshold: 0.5,
                        limit: 10,
                    },
                )
            })
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["close", "near"]);
        assert!(results[0].similarity.unwrap() >= results[1].similarity.unwrap());
    }

    #[test]
    fn test_knn_search_excludes_other_dimensions() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "d2", "u1", "two dims", Some(vec![1.0, 0.0]));
        insert_sample(&storage, "d3", "u1", "three dims", Some(vec![1.0, 0.0, 0.0]));

        let results = storage
            .with_connection(|conn| {
                knn_search(
                    conn,
                    &KnnQuery {
                        user_context: "u1",
                        vector: &[1.0, 0.0],
                        memory_type: None,
                        tags: &[],
                        threshold: 0.0,
                        limit: 10,
                    },
                )
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "d2");
    }

    #[test]
    fn test_bump_access() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "m1", "u1", "bump", None);

        storage
            .with_connection(|conn| bump_access(conn, &["m1".to_string()]))
            .unwrap();
        let m = storage
            .with_connection(|conn| get_memory(conn, "u1", "m1"))
            .unwrap()
            .unwrap();
        assert_eq!(m.access_count, 1);
        assert!(m.accessed_at.is_some());
    }

    #[test]
    fn test_soft_delete_twice_is_noop() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "m1", "u1", "delete twice", None);

        let first = storage
            .with_connection(|conn| soft_delete(conn, &["m1".to_string()]))
            .unwrap();
        assert_eq!(first, 1);
        let second = storage
            .with_connection(|conn| soft_delete(conn, &["m1".to_string()]))
            .unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn test_list_memories_ordering_and_paging() {
        let storage = Storage::open_in_memory().unwrap();
        for i in 0..5 {
            let input = StoreInput {
                content: serde_json::json!({ "text": format!("item {i}") }),
                ..sample_input()
            };
            let mut memory = new_memory_row(
                format!("m{i}"),
                "u1".into(),
                input.content.clone(),
                crate::embedding::content_hash(&input.content),
                &input,
                vec![],
                None,
                Utc::now() - chrono::Duration::minutes(10 - i),
            );
            memory.updated_at = memory.created_at;
            storage
                .with_connection(|conn| insert_memory(conn, &memory))
                .unwrap();
        }

        let page = storage
            .with_connection(|conn| {
                list_memories(
                    conn,
                    &ListQuery {
                        user_context: "u1",
                        memory_type: None,
                        tags: &[],
                        limit: 2,
                        offset: 1,
                    },
                )
            })
            .unwrap();
        // Newest first, skipping the newest one
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "m3");
        assert_eq!(page[1].id, "m2");
    }

    #[test]
    fn test_update_fields_whitelist() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "m1", "u1", "update me", None);

        let changed = storage
            .with_connection(|conn| {
                update_fields(
                    conn,
                    "u1",
                    "m1",
                    &UpdateFields {
                        tags: Some(vec!["fresh".into()]),
                        confidence: Some(0.4),
                        importance_score: None,
                        memory_type: Some(MemoryType::Decision),
                        source: None,
                    },
                )
            })
            .unwrap();
        assert_eq!(changed, 1);

        let m = storage
            .with_connection(|conn| get_memory(conn, "u1", "m1"))
            .unwrap()
            .unwrap();
        assert_eq!(m.tags, vec!["fresh"]);
        assert_eq!(m.confidence, 0.4);
        assert_eq!(m.memory_type, MemoryType::Decision);
    }

    #[test]
    fn test_hard_delete_expired_removes_edges_first() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "a", "u1", "expired one", None);
        insert_sample(&storage, "b", "u1", "kept one", None);

        storage
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO memory_relations (id, from_memory_id, to_memory_id,
                        relation_type, strength, created_at, updated_at)
                     VALUES ('r1', 'a', 'b', 'references', 0.5,
                        '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
                    [],
                )?;
                conn.execute(
                    "UPDATE memories SET state = 'expired',
                        deleted_at = '2020-01-01T00:00:00.000Z' WHERE id = 'a'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let deleted = storage
            .with_transaction(|conn| hard_delete_expired(conn, Utc::now(), 100))
            .unwrap();
        assert_eq!(deleted, 1);

        let (memories, relations): (i64, i64) = storage
            .with_connection(|conn| {
                let m: i64 =
                    conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
                let r: i64 =
                    conn.query_row("SELECT COUNT(*) FROM memory_relations", [], |r| r.get(0))?;
                Ok((m, r))
            })
            .unwrap();
        assert_eq!(memories, 1);
        assert_eq!(relations, 0);
    }

    #[test]
    fn test_stats_and_tag_counts() {
        let storage = Storage::open_in_memory().unwrap();
        insert_sample(&storage, "m1", "u1", "one", Some(vec![1.0, 0.0]));
        insert_sample(&storage, "m2", "u1", "two", None);
        insert_sample(&storage, "other", "u2", "elsewhere", None);

        let stats = storage
            .with_connection(|conn| get_stats(conn, "u1"))
            .unwrap();
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.with_embedding, 1);
        assert_eq!(stats.by_type.get("fact"), Some(&2));

        let tags = storage
            .with_connection(|conn| tag_counts(conn, "u1"))
            .unwrap();
        assert_eq!(tags, vec![("sample".to_string(), 2)]);
    }
}
