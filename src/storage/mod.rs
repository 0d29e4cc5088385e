//! Storage engine for Memoria
//!
//! SQLite in WAL mode with idempotent migrations. Embeddings live in a BLOB
//! column as little-endian f32; nearest-neighbor search pushes predicates
//! into SQL and scores candidates with exact cosine similarity. Soft-deleted
//! rows stay invisible to every read path until retention cleanup removes
//! them for good.

mod connection;
mod migrations;
pub mod queries;
pub mod relations;

pub use connection::Storage;
pub use migrations::{run_migrations, SCHEMA_VERSION};
pub use queries::{
    bump_access, bytes_to_embedding, cluster_counts, distinct_user_contexts,
    embedding_to_bytes, find_by_hash, get_memory, get_stats, hard_delete_expired,
    has_embedding, insert_memory, knn_search, list_memories, load_embedding_points,
    memory_from_row, new_memory_row,
    replace_content_compressed, restore_updated_at, select_decay_batch, set_cluster,
    set_embedding, set_metadata, soft_delete, tag_counts, update_fields, update_lifecycle,
    EmbeddingPoint, KnnQuery, ListQuery, MemoryStats, MEMORY_COLUMNS,
};
pub use relations::{
    children_of, degree, delete_relation, graph_analysis, incoming_relations,
    outgoing_relations, parent_of, relation_type_counts, relations_for, top_connectors,
    upsert_relation, GraphAnalysis,
};
