//! Bounded LRU cache of query envelopes.
//!
//! Entries are keyed by the canonical JSON of [`CacheKey`] and hold the
//! envelope computed before per-call metrics were attached. `get` promotes
//! an entry to most-recently-used; `set` evicts the least-recently-used
//! entry once capacity is exceeded.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::envelope::QueryEnvelope;

/// Fields that identify a cacheable request.
///
/// Serialized with fixed field order, so equal requests always produce the
/// same key string. Offset and document pagination participate, so two
/// pages of the same question never share an entry.
#[derive(Debug, Clone, Serialize)]
pub struct CacheKey<'a> {
    pub q: &'a str,
    pub cs: Option<&'a str>,
    pub l: i64,
    pub o: i64,
    pub dl: i64,
    #[serde(rename = "do")]
    pub doc_offset: i64,
}

impl CacheKey<'_> {
    pub fn canonical(&self) -> String {
        // Only string, integer and null fields: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Thread-safe LRU of envelopes. The lock is held only for the map update.
pub struct ResultCache {
    inner: Mutex<LruCache<String, QueryEnvelope>>,
}

impl ResultCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, key: &str) -> Option<QueryEnvelope> {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        lru.get(key).cloned()
    }

    pub fn set(&self, key: String, value: QueryEnvelope) {
        let mut lru = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // `push` also hands back the old value on update; only log real evictions.
        if let Some((old, _)) = lru.push(key, value) {
            if !lru.contains(&old) {
                tracing::debug!(key = %old, "cache eviction");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cap()
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{DocumentResult, SqlResult};

    fn env(tag: &str) -> QueryEnvelope {
        QueryEnvelope::Sql(SqlResult::warned(tag))
    }

    #[test]
    fn test_canonical_key_is_stable() {
        let key = CacheKey {
            q: "how many employees",
            cs: None,
            l: 50,
            o: 0,
            dl: 8,
            doc_offset: 0,
        };
        assert_eq!(
            key.canonical(),
            r#"{"q":"how many employees","cs":null,"l":50,"o":0,"dl":8,"do":0}"#
        );
    }

    #[test]
    fn test_offset_changes_key() {
        let a = CacheKey {
            q: "list employees",
            cs: Some("sqlite:///a.db"),
            l: 10,
            o: 0,
            dl: 8,
            doc_offset: 0,
        };
        let b = CacheKey { o: 10, ..a.clone() };
        let c = CacheKey {
            doc_offset: 8,
            ..a.clone()
        };
        assert_ne!(a.canonical(), b.canonical());
        assert_ne!(a.canonical(), c.canonical());
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let cache = ResultCache::new(2);
        cache.set("a".into(), env("a"));
        cache.set("b".into(), env("b"));
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.set("c".into(), env("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(env("a")));
        assert_eq!(cache.get("c"), Some(env("c")));
    }

    #[test]
    fn test_set_updates_existing_entry() {
        let cache = ResultCache::new(2);
        cache.set("a".into(), env("old"));
        cache.set("a".into(), QueryEnvelope::Document(DocumentResult::default()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").map(|e| e.kind()), Some("document"));
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let cache = ResultCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set("a".into(), env("a"));
        cache.set("b".into(), env("b"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }
}
