//! In-process time-bounded caching
//!
//! [`TtlCache`] backs both the extraction cache (whole staged bundles) and the
//! metrics cache (computed artifacts). Entries expire once their age exceeds
//! their TTL; an expired entry is a miss and is evicted on the lookup that
//! finds it. Time is read from `tokio::time::Instant` so paused-clock tests can
//! advance it.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

/// A cached value with its insertion time and lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<K, V> CacheEntry<K, V> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent key/value cache with per-entry TTL
///
/// `set` replaces an entry wholesale, so concurrent writers of the same key
/// resolve as last writer wins. With `max_entries` set, inserting a new key
/// into a full cache purges expired entries first and then evicts the oldest.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<K, V>>>,
    default_ttl: Duration,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bound the number of live entries; `0` leaves the cache unbounded
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = (max_entries > 0).then_some(max_entries);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live entry, evicting it if it has expired
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(cache = self.name, "Cache hit");
                    return Some(entry.value.clone());
                },
                Some(_) => {},
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(cache = self.name, "Cache miss");
                    return None;
                },
            }
        }

        // Expired: re-check under the write lock, a writer may have refreshed it.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            entries.remove(key);
            debug!(cache = self.name, "Cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace an entry with an explicit TTL
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                entries.retain(|_, entry| !entry.is_expired(now));
                if entries.len() >= max {
                    let oldest = entries
                        .values()
                        .min_by_key(|entry| entry.created_at)
                        .map(|entry| entry.key.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                        debug!(cache = self.name, max, "Evicted oldest cache entry");
                    }
                }
            }
        }

        entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                created_at: now,
                ttl,
            },
        );
    }

    /// Insert or replace an entry with the cache's default TTL
    pub fn insert(&self, key: K, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

/// Hex SHA-256 of the JSON encoding of `value`, used as a content identity
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache() -> TtlCache<String, u32> {
        TtlCache::new("test", Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_then_expiry_is_miss_and_evicts() {
        let cache = cache();
        cache.insert("a".to_string(), 1);

        assert_eq!(cache.get("a"), Some(1));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_alive_exactly_at_ttl() {
        let cache = cache();
        cache.insert("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn test_absent_key_counts_miss() {
        let cache = cache();
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[test]
    fn test_set_replaces_whole_entry() {
        let cache = cache();
        cache.set("a".to_string(), 1, Duration::from_secs(1));
        cache.set("a".to_string(), 2, Duration::from_secs(600));
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_entries_evicts_oldest() {
        let cache = cache().with_max_entries(2);
        cache.insert("a".to_string(), 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("b".to_string(), 2);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_entries_prefers_purging_expired() {
        let cache = cache().with_max_entries(2);
        cache.set("short".to_string(), 1, Duration::from_secs(5));
        cache.insert("long".to_string(), 2);
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.insert("new".to_string(), 3);

        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache();
        cache.set("a".to_string(), 1, Duration::from_secs(1));
        cache.set("b".to_string(), 2, Duration::from_secs(100));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(cache());
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for j in 0..100u32 {
                    cache.insert(format!("k{}", j % 10), i);
                    let _ = cache.get(&format!("k{}", (j + 1) % 10));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 10);
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 800);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(&vec![1, 2, 3]).unwrap();
        let b = content_hash(&vec![1, 2, 3]).unwrap();
        let c = content_hash(&vec![3, 2, 1]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
