//! Two-tier cache fronting embeddings, memories, and search results
//!
//! Keys are namespaced as `mcp:<namespace>:<identifier>`. Writes go to both
//! tiers; reads try the remote tier first and fall back to local. A failing
//! remote degrades the cache to local-only without surfacing errors.

mod local;

pub use local::LocalCache;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::CacheConfig;

/// Cache namespaces. Each namespace has its own invalidation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Embeddings,
    Search,
    Memory,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embeddings => "embeddings",
            Self::Search => "search",
            Self::Memory => "memory",
        }
    }
}

/// A single cache tier. Implementations must be cheap to call; the tiered
/// cache treats any error as "tier unavailable".
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn clear_prefix(&self, prefix: &str) -> Result<()>;
}

/// Statistics for the tiered cache
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub remote_available: bool,
    pub local_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Composite cache: an optional remote distributed tier plus a local
/// in-process tier.
pub struct TieredCache {
    remote: Option<Arc<dyn CacheBackend>>,
    local: LocalCache,
    remote_healthy: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    default_ttl: Duration,
    long_ttl: Duration,
}

impl TieredCache {
    /// Local-only cache
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            remote: None,
            local: LocalCache::new(),
            remote_healthy: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            long_ttl: Duration::from_secs(config.long_ttl_secs),
        }
    }

    /// Cache with a remote tier mirrored by the local tier
    pub fn with_remote(config: &CacheConfig, remote: Arc<dyn CacheBackend>) -> Self {
        let mut cache = Self::new(config);
        cache.remote = Some(remote);
        cache.remote_healthy = AtomicBool::new(true);
        cache
    }

    /// Build the full key for a namespaced identifier
    pub fn key(namespace: Namespace, identifier: &str) -> String {
        format!("mcp:{}:{}", namespace.as_str(), identifier)
    }

    /// Truncated SHA-256 of an input, used as the identifier for embedding
    /// and search entries
    pub fn hash_identifier(input: &str) -> String {
        let digest = Sha256::digest(input.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..16].to_string()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn long_ttl(&self) -> Duration {
        self.long_ttl
    }

    fn remote(&self) -> Option<&Arc<dyn CacheBackend>> {
        if self.remote_healthy.load(Ordering::Relaxed) {
            self.remote.as_ref()
        } else {
            None
        }
    }

    fn mark_remote_failed(&self, op: &str) {
        if self.remote_healthy.swap(false, Ordering::Relaxed) {
            tracing::warn!("remote cache failed during {op}, degrading to local-only");
        }
    }

    /// Raw get: remote first, then local
    pub fn get_raw(&self, namespace: Namespace, identifier: &str) -> Option<String> {
        let key = Self::key(namespace, identifier);

        if let Some(remote) = self.remote() {
            match remote.get(&key) {
                Ok(Some(value)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(None) => {}
                Err(_) => self.mark_remote_failed("get"),
            }
        }

        match self.local.get(&key) {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Raw set to both tiers. `ttl = None` uses the default TTL.
    pub fn set_raw(
        &self,
        namespace: Namespace,
        identifier: &str,
        value: &str,
        ttl: Option<Duration>,
    ) {
        let key = Self::key(namespace, identifier);
        let ttl = ttl.unwrap_or(self.default_ttl);

        if let Some(remote) = self.remote() {
            if remote.set(&key, value, ttl).is_err() {
                self.mark_remote_failed("set");
            }
        }
        // Local set is infallible in practice
        let _ = self.local.set(&key, value, ttl);
    }

    /// Typed get
    pub fn get_json<T: DeserializeOwned>(&self, namespace: Namespace, identifier: &str) -> Option<T> {
        self.get_raw(namespace, identifier)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Typed set
    pub fn set_json<T: Serialize>(
        &self,
        namespace: Namespace,
        identifier: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        if let Ok(raw) = serde_json::to_string(value) {
            self.set_raw(namespace, identifier, &raw, ttl);
        }
    }

    /// Delete a single entry from both tiers
    pub fn delete(&self, namespace: Namespace, identifier: &str) {
        let key = Self::key(namespace, identifier);
        if let Some(remote) = self.remote() {
            if remote.delete(&key).is_err() {
                self.mark_remote_failed("delete");
            }
        }
        let _ = self.local.delete(&key);
    }

    /// Delete every key in a namespace from both tiers
    pub fn clear_namespace(&self, namespace: Namespace) {
        let prefix = format!("mcp:{}:", namespace.as_str());
        if let Some(remote) = self.remote() {
            if remote.clear_prefix(&prefix).is_err() {
                self.mark_remote_failed("clear_prefix");
            }
        }
        let _ = self.local.clear_prefix(&prefix);
    }

    /// Drop the cached memory entry and clear the search namespace, since
    /// cached search results may contain the changed memory.
    pub fn invalidate_memory(&self, memory_id: &str) {
        self.delete(Namespace::Memory, memory_id);
        self.clear_namespace(Namespace::Search);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            remote_available: self.remote().is_some(),
            local_entries: self.local.len(),
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoriaError;

    fn cache() -> TieredCache {
        TieredCache::new(&CacheConfig::default())
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            TieredCache::key(Namespace::Search, "abc"),
            "mcp:search:abc"
        );
    }

    #[test]
    fn test_hash_identifier_stable() {
        let a = TieredCache::hash_identifier("query one");
        let b = TieredCache::hash_identifier("query one");
        let c = TieredCache::hash_identifier("query two");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_set_get_json() {
        let cache = cache();
        cache.set_json(Namespace::Memory, "id1", &vec![1, 2, 3], None);
        let got: Option<Vec<i32>> = cache.get_json(Namespace::Memory, "id1");
        assert_eq!(got, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_invalidate_memory_clears_search() {
        let cache = cache();
        cache.set_json(Namespace::Memory, "m1", &"cached", None);
        cache.set_json(Namespace::Search, "q1", &"results", None);
        cache.set_json(Namespace::Embeddings, "e1", &"vector", None);

        cache.invalidate_memory("m1");

        assert!(cache.get_raw(Namespace::Memory, "m1").is_none());
        assert!(cache.get_raw(Namespace::Search, "q1").is_none());
        // Embeddings survive memory invalidation
        assert!(cache.get_raw(Namespace::Embeddings, "e1").is_some());
    }

    struct FailingRemote;

    impl CacheBackend for FailingRemote {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(MemoriaError::Cache("remote down".into()))
        }
        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(MemoriaError::Cache("remote down".into()))
        }
        fn delete(&self, _key: &str) -> Result<()> {
            Err(MemoriaError::Cache("remote down".into()))
        }
        fn clear_prefix(&self, _prefix: &str) -> Result<()> {
            Err(MemoriaError::Cache("remote down".into()))
        }
    }

    #[test]
    fn test_remote_failure_degrades_to_local() {
        let cache = TieredCache::with_remote(&CacheConfig::default(), Arc::new(FailingRemote));
        assert!(cache.stats().remote_available);

        cache.set_raw(Namespace::Memory, "m1", "v", None);
        // First failing call flips the health bit; local still works
        assert_eq!(
            cache.get_raw(Namespace::Memory, "m1"),
            Some("v".to_string())
        );
        assert!(!cache.stats().remote_available);
    }

    struct MirrorRemote(LocalCache);

    impl CacheBackend for MirrorRemote {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.0.set(key, value, ttl)
        }
        fn delete(&self, key: &str) -> Result<()> {
            self.0.delete(key)
        }
        fn clear_prefix(&self, prefix: &str) -> Result<()> {
            self.0.clear_prefix(prefix)
        }
    }

    #[test]
    fn test_writes_reach_both_tiers() {
        let remote = Arc::new(MirrorRemote(LocalCache::new()));
        let cache = TieredCache::with_remote(&CacheConfig::default(), remote.clone());

        cache.set_raw(Namespace::Search, "q", "r", None);
        assert_eq!(
            remote.0.get("mcp:search:q").unwrap(),
            Some("r".to_string())
        );
        assert_eq!(cache.get_raw(Namespace::Search, "q"), Some("r".to_string()));
    }
}
