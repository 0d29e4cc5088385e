//! In-process cache tier backed by a concurrent map with per-entry TTL

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::Result;

use super::CacheBackend;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Local in-process cache. Always available; serves as the fallback tier
/// when no remote cache is configured or the remote has failed.
pub struct LocalCache {
    entries: DashMap<String, Entry>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live (non-expired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Called opportunistically; correctness does
    /// not depend on it since reads check expiry themselves.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for LocalCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired entries are removed lazily
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<()> {
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
