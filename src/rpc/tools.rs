//! Tool catalog for the RPC surface

use serde_json::Value;

use super::protocol::ToolDefinition;

/// All tool definitions: (name, description, input schema JSON)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "memory_store",
        "Store a memory with semantic deduplication. Identical content within a user context returns the existing memory with its access count bumped.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"description": "Content to remember: a string or any JSON object"},
                "type": {"type": "string", "enum": ["fact", "conversation", "decision", "insight", "error", "context", "preference", "task"], "description": "Memory type"},
                "source": {"type": "string", "description": "Where this memory came from"},
                "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                "user_context": {"type": "string", "description": "Tenant scope (default: 'default')"},
                "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 20},
                "importance_score": {"type": "number", "minimum": 0, "maximum": 1},
                "similarity_threshold": {"type": "number", "minimum": 0, "maximum": 1},
                "decay_rate": {"type": "number", "minimum": 0},
                "parent_id": {"type": "string"},
                "relation_type": {"type": "string"},
                "metadata": {"type": "object"},
                "relate_to": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "memory_id": {"type": "string"},
                            "relation_type": {"type": "string"},
                            "strength": {"type": "number", "minimum": 0, "maximum": 1}
                        },
                        "required": ["memory_id"]
                    }
                }
            },
            "required": ["content", "type", "source", "confidence"]
        }"#,
    ),
    (
        "memory_search",
        "Semantic similarity search over stored memories",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "maxLength": 1000},
                "user_context": {"type": "string"},
                "type": {"type": "string", "enum": ["fact", "conversation", "decision", "insight", "error", "context", "preference", "task", "merged", "summary"]},
                "tags": {"type": "array", "items": {"type": "string"}},
                "threshold": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.7},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10}
            },
            "required": ["query"]
        }"#,
    ),
    (
        "memory_list",
        "List memories, newest first, with paging",
        r#"{
            "type": "object",
            "properties": {
                "user_context": {"type": "string"},
                "type": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10},
                "offset": {"type": "integer", "minimum": 0, "default": 0}
            }
        }"#,
    ),
    (
        "memory_update",
        "Update whitelisted fields of a memory (tags, confidence, importance_score, type, source)",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "updates": {
                    "type": "object",
                    "properties": {
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                        "importance_score": {"type": "number", "minimum": 0, "maximum": 1},
                        "type": {"type": "string"},
                        "source": {"type": "string"}
                    }
                },
                "user_context": {"type": "string"},
                "preserve_timestamps": {"type": "boolean", "default": false}
            },
            "required": ["id", "updates"]
        }"#,
    ),
    (
        "memory_delete",
        "Soft-delete a memory by id or content hash",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "content_hash": {"type": "string"},
                "user_context": {"type": "string"}
            }
        }"#,
    ),
    (
        "memory_batch",
        "Store up to 100 memories; per-item failures never abort the batch",
        r#"{
            "type": "object",
            "properties": {
                "memories": {"type": "array", "minItems": 1, "maxItems": 100},
                "user_context": {"type": "string"}
            },
            "required": ["memories"]
        }"#,
    ),
    (
        "memory_batch_delete",
        "Soft-delete several memories at once",
        r#"{
            "type": "object",
            "properties": {
                "ids": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                "user_context": {"type": "string"}
            },
            "required": ["ids"]
        }"#,
    ),
    (
        "memory_graph_search",
        "Semantic search expanded over the relation graph. Also accepts traversal arguments (start_memory_id) for backward compatibility.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "user_context": {"type": "string"},
                "type": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "threshold": {"type": "number", "minimum": 0, "maximum": 1},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                "depth": {"type": "integer", "minimum": 1, "maximum": 3, "default": 1}
            },
            "required": ["query"]
        }"#,
    ),
    (
        "memory_consolidate",
        "Cluster similar memories with density clustering",
        r#"{
            "type": "object",
            "properties": {
                "user_context": {"type": "string"},
                "threshold": {"type": "number", "minimum": 0.5, "maximum": 0.95, "default": 0.8},
                "min_cluster_size": {"type": "integer", "minimum": 2, "default": 3}
            }
        }"#,
    ),
    (
        "memory_stats",
        "Aggregate statistics for a user context",
        r#"{
            "type": "object",
            "properties": {
                "user_context": {"type": "string"}
            }
        }"#,
    ),
    (
        "memory_relate",
        "Create or update a directed relation between two memories",
        r#"{
            "type": "object",
            "properties": {
                "from_memory_id": {"type": "string"},
                "to_memory_id": {"type": "string"},
                "relation_type": {"type": "string", "enum": ["references", "contradicts", "supports", "extends", "causes", "caused_by", "precedes", "follows", "part_of", "contains", "relates_to"]},
                "strength": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.5},
                "user_context": {"type": "string"}
            },
            "required": ["from_memory_id", "to_memory_id", "relation_type"]
        }"#,
    ),
    (
        "memory_unrelate",
        "Delete the relation between two memories",
        r#"{
            "type": "object",
            "properties": {
                "from_memory_id": {"type": "string"},
                "to_memory_id": {"type": "string"},
                "user_context": {"type": "string"}
            },
            "required": ["from_memory_id", "to_memory_id"]
        }"#,
    ),
    (
        "memory_get_relations",
        "All relations touching a memory, in both directions",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "user_context": {"type": "string"}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "memory_traverse",
        "Bounded BFS/DFS over the memory graph with filters and a wall-clock timeout",
        r#"{
            "type": "object",
            "properties": {
                "start_memory_id": {"type": "string"},
                "user_context": {"type": "string"},
                "algorithm": {"type": "string", "enum": ["bfs", "dfs"], "default": "bfs"},
                "max_depth": {"type": "integer", "minimum": 1, "maximum": 5, "default": 3},
                "max_nodes": {"type": "integer", "minimum": 1, "maximum": 1000, "default": 100},
                "relation_types": {"type": "array", "items": {"type": "string"}},
                "memory_types": {"type": "array", "items": {"type": "string"}},
                "tags": {"type": "array", "items": {"type": "string"}},
                "include_parent_links": {"type": "boolean", "default": false},
                "timeout_ms": {"type": "integer", "minimum": 1, "default": 5000}
            },
            "required": ["start_memory_id", "user_context"]
        }"#,
    ),
    (
        "memory_decay_status",
        "Current decay score, state, and preservation status of a memory",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "user_context": {"type": "string"}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "memory_preserve",
        "Pin a memory to the active state, optionally until a point in time",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "until": {"type": "string", "format": "date-time"},
                "user_context": {"type": "string"}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "memory_graph_analysis",
        "In/out degree and relation-type histogram for a memory",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "user_context": {"type": "string"}
            },
            "required": ["memory_id", "user_context"]
        }"#,
    ),
];

/// Parsed tool definitions for `tools/list`
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str::<Value>(schema)
                .expect("tool schemas are valid JSON"),
        })
        .collect()
}

/// Read-only resource URIs
pub const RESOURCES: &[(&str, &str)] = &[
    ("memoria://stats", "Aggregate memory statistics"),
    ("memoria://types", "Memory counts by type"),
    ("memoria://tags", "Tag usage counts"),
    ("memoria://relationships", "Relation counts by type"),
    ("memoria://clusters", "Cluster sizes and coherence"),
];
