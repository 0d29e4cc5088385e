//! Core types for Memoria

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemoriaError, Result};

/// Unique identifier for a memory (UUID v4, stored as text)
pub type MemoryId = String;

/// Maximum serialized content size in bytes (1 MiB)
pub const MAX_CONTENT_SIZE: usize = 1_048_576;

/// Maximum number of tags per memory
pub const MAX_TAGS: usize = 20;

/// Maximum length of a single tag
pub const MAX_TAG_LENGTH: usize = 50;

/// Maximum length of a user context string
pub const MAX_USER_CONTEXT_LENGTH: usize = 100;

/// Maximum query length for search
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Default number of results for search/list
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Upper bound for search/list limits
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Default cosine similarity threshold for search
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Content above this size is compressed before storage (100 KB)
pub const COMPRESSION_THRESHOLD_BYTES: usize = 102_400;

/// Default cache TTL in seconds (1 hour)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Long cache TTL in seconds, used for embeddings (24 hours)
pub const LONG_CACHE_TTL_SECS: u64 = 86_400;

/// The user context applied when a request does not name one
pub const DEFAULT_USER_CONTEXT: &str = "default";

/// Memory classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Conversation,
    Decision,
    Insight,
    Error,
    Context,
    Preference,
    Task,
    /// Synthetic memory produced by consolidation merge
    Merged,
    /// Synthetic memory produced by consolidation summarize
    Summary,
}

impl MemoryType {
    /// SQL-compatible string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Conversation => "conversation",
            Self::Decision => "decision",
            Self::Insight => "insight",
            Self::Error => "error",
            Self::Context => "context",
            Self::Preference => "preference",
            Self::Task => "task",
            Self::Merged => "merged",
            Self::Summary => "summary",
        }
    }

    /// Whether clients may store this type directly. `merged` and `summary`
    /// are reserved for the consolidation engine.
    pub fn is_user_storable(&self) -> bool {
        !matches!(self, Self::Merged | Self::Summary)
    }

    /// All type values, for validation messages and stats
    pub fn all() -> &'static [MemoryType] {
        &[
            Self::Fact,
            Self::Conversation,
            Self::Decision,
            Self::Insight,
            Self::Error,
            Self::Context,
            Self::Preference,
            Self::Task,
            Self::Merged,
            Self::Summary,
        ]
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "conversation" => Ok(Self::Conversation),
            "decision" => Ok(Self::Decision),
            "insight" => Ok(Self::Insight),
            "error" => Ok(Self::Error),
            "context" => Ok(Self::Context),
            "preference" => Ok(Self::Preference),
            "task" => Ok(Self::Task),
            "merged" => Ok(Self::Merged),
            "summary" => Ok(Self::Summary),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Lifecycle state driven by the decay engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    #[default]
    Active,
    Dormant,
    Archived,
    Expired,
}

impl MemoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dormant => "dormant",
            Self::Archived => "archived",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "dormant" => Ok(Self::Dormant),
            "archived" => Ok(Self::Archived),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("unknown memory state: {s}")),
        }
    }
}

/// Directed edge type between memories.
///
/// Unknown strings normalize to `RelatesTo` rather than failing, so legacy
/// rows and loosely-typed clients keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    References,
    Contradicts,
    Supports,
    Extends,
    Causes,
    CausedBy,
    Precedes,
    Follows,
    PartOf,
    Contains,
    RelatesTo,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::References => "references",
            Self::Contradicts => "contradicts",
            Self::Supports => "supports",
            Self::Extends => "extends",
            Self::Causes => "causes",
            Self::CausedBy => "caused_by",
            Self::Precedes => "precedes",
            Self::Follows => "follows",
            Self::PartOf => "part_of",
            Self::Contains => "contains",
            Self::RelatesTo => "relates_to",
        }
    }

    /// Normalize an arbitrary string to a canonical relation type
    pub fn normalize(s: &str) -> Self {
        match s {
            "references" => Self::References,
            "contradicts" => Self::Contradicts,
            "supports" => Self::Supports,
            "extends" => Self::Extends,
            "causes" => Self::Causes,
            "caused_by" => Self::CausedBy,
            "precedes" => Self::Precedes,
            "follows" => Self::Follows,
            "part_of" => Self::PartOf,
            "contains" => Self::Contains,
            _ => Self::RelatesTo,
        }
    }

    /// Reverse type used by bidirectional relation creation.
    /// `extends` and `references` swap; every other type maps to itself.
    pub fn reverse(&self) -> Self {
        match self {
            Self::Extends => Self::References,
            Self::References => Self::Extends,
            other => *other,
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A memory record, matching the `memories` table schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v4 primary key
    pub id: MemoryId,
    /// Tenant-scoping key; every query filters on it
    pub user_context: String,
    /// Semi-structured content (arbitrary JSON value or string)
    pub content: Value,
    /// SHA-256 hex of the canonical content serialization
    pub content_hash: String,
    /// Embedding vector, absent while async embedding is pending.
    /// Never serialized into tool output.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Set iff `embedding` is present; must equal the provider dimension
    pub embedding_dimension: Option<usize>,
    /// Sanitized tags, at most 20
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub source: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Importance in `[0, 1]`
    pub importance_score: f64,
    /// Per-memory similarity threshold for dedup-adjacent lookups
    pub similarity_threshold: f64,
    /// Exponential decay rate per day
    pub decay_rate: f64,
    pub access_count: i64,
    pub parent_id: Option<MemoryId>,
    /// Relation label toward `parent_id`
    pub relation_type: Option<String>,
    /// Cluster assignment; textual so numeric IDs fit too
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub state: MemoryState,
    pub decay_score: f64,
    #[serde(default)]
    pub is_compressed: bool,
    /// Free-form object: preservation expiry, transition log, compression info
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_decay_update: Option<DateTime<Utc>>,
    /// Similarity against the query, attached by search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl Memory {
    /// Last access time, falling back to creation time if never accessed
    pub fn effective_accessed_at(&self) -> DateTime<Utc> {
        self.accessed_at.unwrap_or(self.created_at)
    }
}

/// A directed relation between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub id: String,
    pub from_memory_id: MemoryId,
    pub to_memory_id: MemoryId,
    pub relation_type: RelationType,
    /// Strength in `[0, 1]`
    pub strength: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tool inputs
// ---------------------------------------------------------------------------

/// Relation request attached to a store call.
/// Missing endpoints fail per-item without aborting the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelateTo {
    pub memory_id: MemoryId,
    #[serde(default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub strength: Option<f64>,
}

/// Input for `memory_store`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInput {
    pub content: Value,
    #[serde(rename = "type", alias = "memory_type")]
    pub memory_type: MemoryType,
    pub source: String,
    pub confidence: f64,
    #[serde(default)]
    pub user_context: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub importance_score: Option<f64>,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub decay_rate: Option<f64>,
    #[serde(default)]
    pub parent_id: Option<MemoryId>,
    #[serde(default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub relate_to: Option<Vec<RelateTo>>,
}

/// Input for `memory_search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchInput {
    pub query: String,
    #[serde(default)]
    pub user_context: Option<String>,
    #[serde(rename = "type", alias = "memory_type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Input for `memory_list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListInput {
    #[serde(default)]
    pub user_context: Option<String>,
    #[serde(rename = "type", alias = "memory_type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Whitelisted fields for `memory_update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFields {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub importance_score: Option<f64>,
    #[serde(rename = "type", alias = "memory_type", default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Input for `memory_update`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInput {
    pub id: MemoryId,
    pub updates: UpdateFields,
    #[serde(default)]
    pub user_context: Option<String>,
    #[serde(default)]
    pub preserve_timestamps: bool,
}

/// Input for `memory_delete` (by id or by content hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteInput {
    #[serde(default)]
    pub id: Option<MemoryId>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub user_context: Option<String>,
}

/// Input for `memory_batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStoreInput {
    pub memories: Vec<StoreInput>,
    #[serde(default)]
    pub user_context: Option<String>,
}

/// Input for `memory_batch_delete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeleteInput {
    pub ids: Vec<MemoryId>,
    #[serde(default)]
    pub user_context: Option<String>,
}

/// Input for `memory_consolidate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidateInput {
    #[serde(default)]
    pub user_context: Option<String>,
    /// Similarity threshold in `[0.5, 0.95]`; DBSCAN epsilon is `1 - threshold`
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub min_cluster_size: Option<usize>,
}

/// Input for `memory_relate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelateInput {
    #[serde(alias = "from")]
    pub from_memory_id: MemoryId,
    #[serde(alias = "to")]
    pub to_memory_id: MemoryId,
    pub relation_type: String,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub user_context: Option<String>,
}

/// Input for `memory_unrelate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnrelateInput {
    #[serde(alias = "from")]
    pub from_memory_id: MemoryId,
    #[serde(alias = "to")]
    pub to_memory_id: MemoryId,
    #[serde(default)]
    pub user_context: Option<String>,
}

/// Input for `memory_graph_search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSearchInput {
    #[serde(flatten)]
    pub search: SearchInput,
    /// Expansion depth in `[1, 3]`
    #[serde(default)]
    pub depth: Option<usize>,
}

/// Input for `memory_preserve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreserveInput {
    pub memory_id: MemoryId,
    /// ISO-8601 expiry for the preservation, absent = indefinite
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_context: Option<String>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database path, `:memory:` for tests
    pub db_path: String,
    /// Busy timeout applied to every connection
    pub busy_timeout_ms: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            busy_timeout_ms: 30_000,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Model identifier
    pub model: String,
    /// Expected vector dimension; the provider probe must match it
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "hash-v1".to_string(),
            dimensions: 384,
        }
    }
}

/// Cache layer configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Optional remote cache URL; local-only when absent
    pub remote_url: Option<String>,
    pub default_ttl_secs: u64,
    pub long_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            long_ttl_secs: LONG_CACHE_TTL_SECS,
        }
    }
}

/// Engine-level toggles
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// When true, `store` defers embedding to the job system
    pub enable_async_processing: bool,
    /// When false, consolidation tools report a disabled error
    pub enable_clustering: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_async_processing: true,
            enable_clustering: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Sanitization & canonical serialization
// ---------------------------------------------------------------------------

/// Strip ASCII control characters (0x00–0x1F and 0x7F) except `\n` and `\t`
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_ascii_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Reduce a tag to `[A-Za-z0-9 _-]`, trimmed
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize a tag list: at most [`MAX_TAGS`] entries of at most
/// [`MAX_TAG_LENGTH`] characters, empty results dropped, duplicates removed.
pub fn sanitize_tags(tags: &[String]) -> Result<Vec<String>> {
    if tags.len() > MAX_TAGS {
        return Err(MemoriaError::InvalidParams(format!(
            "tags: at most {} tags allowed, got {}",
            MAX_TAGS,
            tags.len()
        )));
    }

    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for (i, raw) in tags.iter().enumerate() {
        let tag = sanitize_tag(raw);
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LENGTH {
            return Err(MemoriaError::InvalidParams(format!(
                "tags[{i}]: tag exceeds {MAX_TAG_LENGTH} characters"
            )));
        }
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

/// Resolve and validate a user context, defaulting to `"default"`
pub fn normalize_user_context(ctx: Option<&str>) -> Result<String> {
    let ctx = match ctx {
        Some(c) if !c.trim().is_empty() => sanitize_text(c.trim()),
        _ => return Ok(DEFAULT_USER_CONTEXT.to_string()),
    };
    if ctx.len() > MAX_USER_CONTEXT_LENGTH {
        return Err(MemoriaError::InvalidParams(format!(
            "user_context: exceeds {MAX_USER_CONTEXT_LENGTH} characters"
        )));
    }
    Ok(ctx)
}

/// Canonical serialization used for content hashing. Object keys serialize
/// in sorted order (serde_json's default map is ordered), so equal values
/// always produce equal strings.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Format a timestamp the way every table column stores it: RFC 3339 with
/// millisecond precision and a `Z` suffix, so SQL string comparisons order
/// correctly against trigger-written values.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp, tolerating legacy formats
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_roundtrip() {
        for t in MemoryType::all() {
            let parsed: MemoryType = t.as_str().parse().unwrap();
            assert_eq!(parsed, *t);
        }
        assert!("nonsense".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_user_storable_types() {
        assert!(MemoryType::Fact.is_user_storable());
        assert!(MemoryType::Task.is_user_storable());
        assert!(!MemoryType::Merged.is_user_storable());
        assert!(!MemoryType::Summary.is_user_storable());
    }

    #[test]
    fn test_relation_normalize() {
        assert_eq!(RelationType::normalize("supports"), RelationType::Supports);
        assert_eq!(
            RelationType::normalize("something-else"),
            RelationType::RelatesTo
        );
    }

    #[test]
    fn test_relation_reverse() {
        assert_eq!(RelationType::Extends.reverse(), RelationType::References);
        assert_eq!(RelationType::References.reverse(), RelationType::Extends);
        assert_eq!(RelationType::Causes.reverse(), RelationType::Causes);
    }

    #[test]
    fn test_sanitize_text_strips_control_chars() {
        let input = "hello\x00world\x1b[0m\nkeep\ttabs\x7f";
        let cleaned = sanitize_text(input);
        assert_eq!(cleaned, "helloworld[0m\nkeep\ttabs");
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("rust-lang"), "rust-lang");
        assert_eq!(sanitize_tag("  spaced out  "), "spaced out");
        assert_eq!(sanitize_tag("na\u{00ef}ve!@#"), "nave");
    }

    #[test]
    fn test_sanitize_tags_limits() {
        let twenty: Vec<String> = (0..20).map(|i| format!("tag{i}")).collect();
        assert_eq!(sanitize_tags(&twenty).unwrap().len(), 20);

        let twenty_one: Vec<String> = (0..21).map(|i| format!("tag{i}")).collect();
        assert!(sanitize_tags(&twenty_one).is_err());

        let long = vec!["a".repeat(51)];
        assert!(sanitize_tags(&long).is_err());
    }

    #[test]
    fn test_sanitize_tags_dedup_and_drop_empty() {
        let tags = vec![
            "rust".to_string(),
            "rust".to_string(),
            "!!!".to_string(),
            "db".to_string(),
        ];
        assert_eq!(sanitize_tags(&tags).unwrap(), vec!["rust", "db"]);
    }

    #[test]
    fn test_normalize_user_context() {
        assert_eq!(normalize_user_context(None).unwrap(), "default");
        assert_eq!(normalize_user_context(Some("")).unwrap(), "default");
        assert_eq!(normalize_user_context(Some("agent-7")).unwrap(), "agent-7");
        assert!(normalize_user_context(Some(&"x".repeat(101))).is_err());
    }

    #[test]
    fn test_canonical_json_key_order() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let s = format_timestamp(now);
        assert!(s.ends_with('Z'));
        let parsed = parse_timestamp(&s).unwrap();
        assert!((parsed - now).num_milliseconds().abs() <= 1);
    }
}
