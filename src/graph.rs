//! Bounded graph traversal over memory relations
//!
//! BFS/DFS from a starting memory across `memory_relations` (both
//! directions) and optional `parent_id` links, with per-node filters, node
//! and depth caps, and a wall-clock timeout that truncates rather than
//! fails. Missing start nodes and cross-context access yield empty results,
//! not errors.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MemoriaError, Result};
use crate::storage::{self, Storage};
use crate::types::{Memory, MemoryId, MemoryType, RelationType};

/// Hard caps from the tool contract
pub const MAX_TRAVERSAL_DEPTH: usize = 5;
pub const MAX_TRAVERSAL_NODES: usize = 1000;

/// Traversal algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Bfs,
    Dfs,
}

/// Options for a traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalOptions {
    pub start_id: MemoryId,
    pub user_context: String,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_depth")]
    pub max_depth: usize,
    #[serde(default = "default_nodes")]
    pub max_nodes: usize,
    #[serde(default)]
    pub relation_types: Option<Vec<RelationType>>,
    #[serde(default)]
    pub memory_types: Option<Vec<MemoryType>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub include_parent_links: bool,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_depth() -> usize {
    3
}

fn default_nodes() -> usize {
    100
}

fn default_timeout() -> u64 {
    5000
}

impl TraversalOptions {
    pub fn new(start_id: impl Into<String>, user_context: impl Into<String>) -> Self {
        Self {
            start_id: start_id.into(),
            user_context: user_context.into(),
            algorithm: Algorithm::Bfs,
            max_depth: default_depth(),
            max_nodes: default_nodes(),
            relation_types: None,
            memory_types: None,
            tags: None,
            include_parent_links: false,
            timeout_ms: default_timeout(),
        }
    }

    fn clamped(&self) -> (usize, usize) {
        (
            self.max_depth.min(MAX_TRAVERSAL_DEPTH),
            self.max_nodes.min(MAX_TRAVERSAL_NODES),
        )
    }
}

/// One visited node with its discovery path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalNode {
    pub memory: Memory,
    pub depth: usize,
    /// Memory ids from the start node to this node, inclusive
    pub path: Vec<MemoryId>,
    /// Relation label on the edge this node was discovered through
    pub relation_from_parent: Option<String>,
}

/// Traversal result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalOutcome {
    pub nodes: Vec<TraversalNode>,
    /// True when the timeout elapsed before the frontier drained
    pub truncated: bool,
    pub visited: usize,
    pub duration_ms: u64,
}

struct Frontier {
    id: MemoryId,
    depth: usize,
    path: Vec<MemoryId>,
    relation: Option<String>,
}

/// Token bucket limiting traversals per user
pub struct TraversalRateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: DashMap<String, (f64, Instant)>,
}

impl TraversalRateLimiter {
    /// `per_minute` requests allowed per user context
    pub fn new(per_minute: u32) -> Self {
        Self {
            capacity: per_minute as f64,
            refill_per_sec: per_minute as f64 / 60.0,
            buckets: DashMap::new(),
        }
    }

    /// Take one token; error when the bucket is dry
    pub fn check(&self, user_context: &str) -> Result<()> {
        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(user_context.to_string())
            .or_insert((self.capacity, now));
        let (tokens, last) = *entry;

        let refilled =
            (tokens + last.elapsed().as_secs_f64() * self.refill_per_sec).min(self.capacity);
        if refilled < 1.0 {
            let wait = ((1.0 - refilled) / self.refill_per_sec).ceil() as u64;
            return Err(MemoriaError::RateLimited(wait.max(1)));
        }
        *entry = (refilled - 1.0, now);
        Ok(())
    }
}

/// Graph explorer bound to storage, with an optional per-user rate limit
pub struct GraphExplorer {
    storage: Storage,
    rate_limiter: Option<TraversalRateLimiter>,
}

impl GraphExplorer {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limiter = Some(TraversalRateLimiter::new(per_minute));
        self
    }

    /// Bounded BFS/DFS. BFS yields nodes in non-decreasing depth; within a
    /// depth, discovery follows outgoing, then incoming, then parent links.
    pub fn traverse(&self, opts: &TraversalOptions) -> Result<TraversalOutcome> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.check(&opts.user_context)?;
        }

        let started = Instant::now();
        let timeout = std::time::Duration::from_millis(opts.timeout_ms);
        let (max_depth, max_nodes) = opts.clamped();

        let mut visited: HashSet<MemoryId> = HashSet::new();
        let mut nodes: Vec<TraversalNode> = Vec::new();
        let mut truncated = false;

        let mut deque: VecDeque<Frontier> = VecDeque::new();
        deque.push_back(Frontier {
            id: opts.start_id.clone(),
            depth: 0,
            path: Vec::new(),
            relation: None,
        });

        self.storage.with_connection(|conn| {
            while !deque.is_empty() && nodes.len() < max_nodes {
                if started.elapsed() >= timeout {
                    truncated = true;
                    tracing::warn!(
                        start = %opts.start_id,
                        timeout_ms = opts.timeout_ms,
                        visited = visited.len(),
                        "traversal timed out, returning partial result"
                    );
                    break;
                }

                let item = match opts.algorithm {
                    Algorithm::Bfs => deque.pop_front(),
                    Algorithm::Dfs => deque.pop_back(),
                };
                let Some(item) = item else { break };

                if item.depth > max_depth || visited.contains(&item.id) {
                    continue;
                }
                visited.insert(item.id.clone());

                // Missing, deleted, or cross-context nodes neither appear
                // nor expand
                let Some(memory) = storage::get_memory(conn, &opts.user_context, &item.id)?
                else {
                    continue;
                };
                if !node_passes_filters(&memory, opts) {
                    continue;
                }

                let mut path = item.path.clone();
                path.push(item.id.clone());

                nodes.push(TraversalNode {
                    memory,
                    depth: item.depth,
                    path: path.clone(),
                    relation_from_parent: item.relation.clone(),
                });

                if item.depth >= max_depth {
                    continue;
                }

                for (neighbor, relation) in
                    self.connections(conn, &opts.user_context, &item.id, opts)?
                {
                    if !visited.contains(&neighbor) {
                        deque.push_back(Frontier {
                            id: neighbor,
                            depth: item.depth + 1,
                            path: path.clone(),
                            relation: Some(relation),
                        });
                    }
                }
            }
            Ok(())
        })?;

        Ok(TraversalOutcome {
            nodes,
            truncated,
            visited: visited.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Neighbors of a node: outgoing edges, incoming edges, and (optionally)
    /// parent/child links, in that order.
    fn connections(
        &self,
        conn: &rusqlite::Connection,
        user_context: &str,
        id: &str,
        opts: &TraversalOptions,
    ) -> Result<Vec<(MemoryId, String)>> {
        let mut out: Vec<(MemoryId, String)> = Vec::new();

        let type_allowed = |t: RelationType| -> bool {
            opts.relation_types
                .as_ref()
                .map(|allowed| allowed.contains(&t))
                .unwrap_or(true)
        };

        for edge in storage::outgoing_relations(conn, id)? {
            if type_allowed(edge.relation_type) {
                out.push((edge.to_memory_id, edge.relation_type.as_str().to_string()));
            }
        }
        for edge in storage::incoming_relations(conn, id)? {
            if type_allowed(edge.relation_type) {
                out.push((edge.from_memory_id, edge.relation_type.as_str().to_string()));
            }
        }

        if opts.include_parent_links {
            for child in storage::children_of(conn, user_context, id)? {
                out.push((child, "parent_of".to_string()));
            }
            if let Some(parent) = storage::parent_of(conn, user_context, id)? {
                out.push((parent, "child_of".to_string()));
            }
        }

        Ok(out)
    }

    /// Degree analysis for one memory
    pub fn analyze(&self, user_context: &str, id: &str) -> Result<storage::GraphAnalysis> {
        self.storage
            .with_connection(|conn| storage::graph_analysis(conn, user_context, id))
    }

    /// Most-connected memories with their edge counts
    pub fn top_connectors(
        &self,
        user_context: &str,
        limit: usize,
    ) -> Result<Vec<(Memory, i64)>> {
        self.storage.with_connection(|conn| {
            let ranked = storage::top_connectors(conn, user_context, limit)?;
            let mut out = Vec::with_capacity(ranked.len());
            for (id, degree) in ranked {
                if let Some(memory) = storage::get_memory(conn, user_context, &id)? {
                    out.push((memory, degree));
                }
            }
            Ok(out)
        })
    }
}

fn node_passes_filters(memory: &Memory, opts: &TraversalOptions) -> bool {
    if let Some(types) = &opts.memory_types {
        if !types.contains(&memory.memory_type) {
            return false;
        }
    }
    if let Some(tags) = &opts.tags {
        if !tags.is_empty() && !memory.tags.iter().any(|t| tags.contains(t)) {
            return false;
        }
    }
    true
}
