//! Key/value cache for computed schema data.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A cache of JSON values addressed by ID and kind.
pub trait CacheStore: Send + Sync {
    fn get(&self, id: &str, kind: &str) -> Option<Value>;

    fn has(&self, id: &str, kind: &str) -> bool {
        self.get(id, kind).is_some()
    }

    /// Stores a value; it expires after `ttl` when one is given.
    fn set(&self, id: &str, kind: &str, value: Value, ttl: Option<Duration>);
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<FxHashMap<(String, String), (Value, Option<Instant>)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, id: &str, kind: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (id.to_string(), kind.to_string());
        let (value, expires) = entries.get(&key)?.clone();
        if expires.is_some_and(|at| at <= Instant::now()) {
            entries.remove(&key);
            return None;
        }
        Some(value)
    }

    fn set(&self, id: &str, kind: &str, value: Value, ttl: Option<Duration>) {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((id.to_string(), kind.to_string()), (value, expires));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_and_set() {
        let cache = MemoryCache::new();
        assert!(!cache.has("Post", "schema"));
        cache.set("Post", "schema", json!({"fields": []}), None);
        assert_eq!(cache.get("Post", "schema"), Some(json!({"fields": []})));
        assert!(!cache.has("Post", "other"));
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::new();
        cache.set("Post", "schema", json!(1), Some(Duration::ZERO));
        assert_eq!(cache.get("Post", "schema"), None);
        assert!(cache.is_empty());
    }
}
