//! Database migrations
//!
//! Migrations are idempotent: every statement is guarded (`IF NOT EXISTS`,
//! `WHERE ... IS NULL`) so re-running a version makes no further changes.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
        conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (1)", [])?;
    }
    if current_version < 2 {
        migrate_v2_backfill(conn)?;
        conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (2)", [])?;
    }

    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Memories: content, embedding, lifecycle and consolidation state
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            user_context TEXT NOT NULL DEFAULT 'default',
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB,
            embedding_dimension INTEGER,
            tags TEXT NOT NULL DEFAULT '[]',
            memory_type TEXT NOT NULL DEFAULT 'fact',
            source TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 1.0,
            importance_score REAL NOT NULL DEFAULT 0.5,
            similarity_threshold REAL NOT NULL DEFAULT 0.7,
            decay_rate REAL NOT NULL DEFAULT 0.01,
            access_count INTEGER NOT NULL DEFAULT 0,
            parent_id TEXT,
            relation_type TEXT,
            cluster_id TEXT,
            state TEXT NOT NULL DEFAULT 'active',
            decay_score REAL NOT NULL DEFAULT 1.0,
            is_compressed INTEGER NOT NULL DEFAULT 0,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            accessed_at TEXT,
            deleted_at TEXT,
            last_decay_update TEXT
        );

        -- One live row per (user_context, content); tombstoned rows excluded
        CREATE UNIQUE INDEX IF NOT EXISTS idx_memories_context_hash
            ON memories(user_context, content_hash)
            WHERE deleted_at IS NULL;

        CREATE INDEX IF NOT EXISTS idx_memories_state ON memories(state);
        CREATE INDEX IF NOT EXISTS idx_memories_decay_score ON memories(decay_score);
        CREATE INDEX IF NOT EXISTS idx_memories_is_compressed ON memories(is_compressed);
        CREATE INDEX IF NOT EXISTS idx_memories_deleted_at ON memories(deleted_at);
        CREATE INDEX IF NOT EXISTS idx_memories_cluster_id ON memories(cluster_id);
        CREATE INDEX IF NOT EXISTS idx_memories_context_created
            ON memories(user_context, created_at DESC);

        -- Directed edges; one row per (from, to) pair
        CREATE TABLE IF NOT EXISTS memory_relations (
            id TEXT PRIMARY KEY,
            from_memory_id TEXT NOT NULL,
            to_memory_id TEXT NOT NULL,
            relation_type TEXT NOT NULL DEFAULT 'relates_to',
            strength REAL NOT NULL DEFAULT 0.5,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(from_memory_id, to_memory_id),
            FOREIGN KEY (from_memory_id) REFERENCES memories(id) ON DELETE CASCADE,
            FOREIGN KEY (to_memory_id) REFERENCES memories(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_relations_from
            ON memory_relations(from_memory_id, relation_type);
        CREATE INDEX IF NOT EXISTS idx_relations_to
            ON memory_relations(to_memory_id, relation_type);

        -- Maintain updated_at whenever a statement does not set it itself.
        -- The WHEN guard lets callers write an explicit updated_at (needed
        -- by preserve_timestamps) without the trigger overwriting it.
        CREATE TRIGGER IF NOT EXISTS trg_memories_updated_at
        AFTER UPDATE ON memories
        FOR EACH ROW
        WHEN NEW.updated_at = OLD.updated_at
        BEGIN
            UPDATE memories
            SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = NEW.id;
        END;
        "#,
    )?;

    Ok(())
}

/// Backfill lifecycle columns on legacy rows (v2). Safe to re-run.
fn migrate_v2_backfill(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        UPDATE memories SET state = 'active' WHERE state IS NULL OR state = '';
        UPDATE memories SET decay_score = 1.0 WHERE decay_score IS NULL;
        UPDATE memories SET last_decay_update = created_at WHERE last_decay_update IS NULL;
        UPDATE memories SET accessed_at = created_at WHERE accessed_at IS NULL;
        UPDATE memories
            SET embedding_dimension = CAST(LENGTH(embedding) / 4 AS INTEGER)
            WHERE embedding IS NOT NULL AND embedding_dimension IS NULL;
        "#,
    )?;
    Ok(())
}
