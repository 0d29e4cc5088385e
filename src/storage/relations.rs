//! Queries over the memory relation graph

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{format_timestamp, parse_timestamp, MemoryRelation, RelationType};

fn relation_from_row(row: &Row) -> rusqlite::Result<MemoryRelation> {
    let relation_type_raw: String = row.get("relation_type")?;
    let created_at_raw: String = row.get("created_at")?;
    let updated_at_raw: String = row.get("updated_at")?;
    let now = Utc::now();

    Ok(MemoryRelation {
        id: row.get("id")?,
        from_memory_id: row.get("from_memory_id")?,
        to_memory_id: row.get("to_memory_id")?,
        relation_type: RelationType::normalize(&relation_type_raw),
        strength: row.get("strength")?,
        created_at: parse_timestamp(&created_at_raw).unwrap_or(now),
        updated_at: parse_timestamp(&updated_at_raw).unwrap_or(now),
    })
}

const RELATION_COLUMNS: &str =
    "id, from_memory_id, to_memory_id, relation_type, strength, created_at, updated_at";

/// Create or update the edge `(from, to)`. Concurrent duplicates converge on
/// the last writer's `(relation_type, strength)` via the unique constraint.
pub fn upsert_relation(
    conn: &Connection,
    from: &str,
    to: &str,
    relation_type: RelationType,
    strength: f64,
) -> Result<MemoryRelation> {
    let now = format_timestamp(Utc::now());
    conn.execute(
        "INSERT INTO memory_relations
            (id, from_memory_id, to_memory_id, relation_type, strength, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(from_memory_id, to_memory_id)
         DO UPDATE SET relation_type = excluded.relation_type,
                       strength = excluded.strength,
                       updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            from,
            to,
            relation_type.as_str(),
            strength,
            now
        ],
    )?;

    let sql = format!(
        "SELECT {RELATION_COLUMNS} FROM memory_relations
         WHERE from_memory_id = ?1 AND to_memory_id = ?2"
    );
    let relation = conn.query_row(&sql, params![from, to], relation_from_row)?;
    Ok(relation)
}

/// Delete the edge `(from, to)`. Returns true if an edge existed.
pub fn delete_relation(conn: &Connection, from: &str, to: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM memory_relations WHERE from_memory_id = ?1 AND to_memory_id = ?2",
        params![from, to],
    )?;
    Ok(deleted > 0)
}

/// All edges touching a memory, in either direction
pub fn relations_for(conn: &Connection, id: &str) -> Result<Vec<MemoryRelation>> {
    let sql = format!(
        "SELECT {RELATION_COLUMNS} FROM memory_relations
         WHERE from_memory_id = ?1 OR to_memory_id = ?1
         ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![id], relation_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Outgoing edges from a memory
pub fn outgoing_relations(conn: &Connection, id: &str) -> Result<Vec<MemoryRelation>> {
    let sql =
        format!("SELECT {RELATION_COLUMNS} FROM memory_relations WHERE from_memory_id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![id], relation_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Incoming edges into a memory
pub fn incoming_relations(conn: &Connection, id: &str) -> Result<Vec<MemoryRelation>> {
    let sql = format!("SELECT {RELATION_COLUMNS} FROM memory_relations WHERE to_memory_id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![id], relation_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Degree analysis for one memory. Joins enforce user context and
/// soft-delete filters on both endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphAnalysis {
    pub in_degree: i64,
    pub out_degree: i64,
    pub total_connections: i64,
    pub relation_types: std::collections::BTreeMap<String, i64>,
}

pub fn graph_analysis(conn: &Connection, user_context: &str, id: &str) -> Result<GraphAnalysis> {
    let out_degree: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_relations r
         JOIN memories t ON t.id = r.to_memory_id
         WHERE r.from_memory_id = ?1
           AND t.user_context = ?2 AND t.deleted_at IS NULL",
        params![id, user_context],
        |row| row.get(0),
    )?;

    let in_degree: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_relations r
         JOIN memories f ON f.id = r.from_memory_id
         WHERE r.to_memory_id = ?1
           AND f.user_context = ?2 AND f.deleted_at IS NULL",
        params![id, user_context],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare_cached(
        "SELECT r.relation_type, COUNT(*) FROM memory_relations r
         JOIN memories f ON f.id = r.from_memory_id
         JOIN memories t ON t.id = r.to_memory_id
         WHERE (r.from_memory_id = ?1 OR r.to_memory_id = ?1)
           AND f.user_context = ?2 AND f.deleted_at IS NULL
           AND t.user_context = ?2 AND t.deleted_at IS NULL
         GROUP BY r.relation_type",
    )?;
    let relation_types = stmt
        .query_map(params![id, user_context], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<_>>()?;

    Ok(GraphAnalysis {
        in_degree,
        out_degree,
        total_connections: in_degree + out_degree,
        relation_types,
    })
}

/// Count of distinct edges touching a memory (both endpoints live and in
/// context). Used by decay's relationship boost.
pub fn degree(conn: &Connection, user_context: &str, id: &str) -> Result<usize> {
    let analysis = graph_analysis(conn, user_context, id)?;
    Ok(analysis.total_connections as usize)
}

/// Relation counts by type across a user context, live endpoints only
pub fn relation_type_counts(
    conn: &Connection,
    user_context: &str,
) -> Result<std::collections::BTreeMap<String, i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.relation_type, COUNT(*) FROM memory_relations r
         JOIN memories f ON f.id = r.from_memory_id
         JOIN memories t ON t.id = r.to_memory_id
         WHERE f.user_context = ?1 AND f.deleted_at IS NULL
           AND t.user_context = ?1 AND t.deleted_at IS NULL
         GROUP BY r.relation_type",
    )?;
    let rows = stmt.query_map(params![user_context], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Memories ordered by distinct-edge count, most connected first
pub fn top_connectors(
    conn: &Connection,
    user_context: &str,
    limit: usize,
) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT m.id, COUNT(DISTINCT r.id) AS degree
         FROM memories m
         JOIN memory_relations r
           ON r.from_memory_id = m.id OR r.to_memory_id = m.id
         WHERE m.user_context = ?1 AND m.deleted_at IS NULL
         GROUP BY m.id
         ORDER BY degree DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_context, limit as i64], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Children linked through `parent_id`
pub fn children_of(conn: &Connection, user_context: &str, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM memories
         WHERE parent_id = ?1 AND user_context = ?2 AND deleted_at IS NULL",
    )?;
    let rows = stmt.query_map(params![id, user_context], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Parent linked through `parent_id`, if live and in context
pub fn parent_of(conn: &Connection, user_context: &str, id: &str) -> Result<Option<String>> {
    let parent: Option<Option<String>> = conn
        .query_row(
            "SELECT p.id FROM memories m
             JOIN memories p ON p.id = m.parent_id
             WHERE m.id = ?1 AND p.user_context = ?2 AND p.deleted_at IS NULL",
            params![id, user_context],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;
    Ok(parent.flatten())
}
