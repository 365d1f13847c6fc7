//! Advisory KV cache with TTL and tag-based invalidation (C3, §6).
//!
//! Missing keys and transient errors are tolerated everywhere this is
//! used — the cache may be cleared at any time without correctness
//! impact, only a performance one (e.g. re-verifying a signature).

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            default_ttl: Duration::from_secs(86_400),
        }
    }
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    tags: Vec<String>,
}

/// Single-tier in-process cache. Eviction is oldest-insert-first once
/// `max_entries` is reached, matching the bounded-map eviction strategy
/// used elsewhere in this codebase for admission-critical memoization.
pub struct KvCache {
    config: CacheConfig,
    entries: HashMap<String, Entry>,
    tags: HashMap<String, HashSet<String>>,
}

impl KvCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.evict_expired();
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&mut self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.set_tagged(key, value, ttl, &[]);
    }

    pub fn set_tagged(&mut self, key: &str, value: Vec<u8>, ttl: Duration, tags: &[&str]) {
        self.evict_expired();
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(key) {
            self.evict_oldest();
        }
        let tag_owned: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        for t in &tag_owned {
            self.tags.entry(t.clone()).or_default().insert(key.to_string());
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                tags: tag_owned,
            },
        );
    }

    pub fn invalidate_tag(&mut self, tag: &str) {
        if let Some(keys) = self.tags.remove(tag) {
            for k in keys {
                self.entries.remove(&k);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            self.remove_from_tags(&k);
            self.entries.remove(&k);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone())
        {
            self.remove_from_tags(&key);
            self.entries.remove(&key);
        }
    }

    fn remove_from_tags(&mut self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            for t in &entry.tags {
                if let Some(set) = self.tags.get_mut(t) {
                    set.remove(key);
                }
            }
        }
    }
}

/// Convenience wrapper for the signature-verification memoization
/// described in §4.2: keyed by `(msg_hash, sig, principal)`, 24h TTL.
pub fn signature_cache_key(msg_hash: &[u8], sig: &[u8], principal: &str) -> String {
    format!(
        "sigverify:{}:{}:{}",
        hex::encode(msg_hash),
        hex::encode(sig),
        principal.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trips() {
        let mut cache = KvCache::new(CacheConfig::default());
        cache.set("k", b"v".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn missing_key_returns_none() {
        let mut cache = KvCache::new(CacheConfig::default());
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn expired_entry_is_tolerated_as_a_miss() {
        let mut cache = KvCache::new(CacheConfig::default());
        cache.set("k", b"v".to_vec(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn tag_invalidation_clears_all_tagged_entries() {
        let mut cache = KvCache::new(CacheConfig::default());
        cache.set_tagged("a", b"1".to_vec(), Duration::from_secs(60), &["principal:0xabc"]);
        cache.set_tagged("b", b"2".to_vec(), Duration::from_secs(60), &["principal:0xabc"]);
        cache.set_tagged("c", b"3".to_vec(), Duration::from_secs(60), &["principal:0xdef"]);

        cache.invalidate_tag("principal:0xabc");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(b"3".to_vec()));
    }

    #[test]
    fn eviction_at_capacity_drops_the_oldest_expiring_entry() {
        let mut cache = KvCache::new(CacheConfig {
            max_entries: 2,
            default_ttl: Duration::from_secs(60),
        });
        cache.set("a", b"1".to_vec(), Duration::from_secs(10));
        cache.set("b", b"2".to_vec(), Duration::from_secs(60));
        cache.set("c", b"3".to_vec(), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(b"2".to_vec()));
    }

    #[test]
    fn clear_empties_both_entries_and_tags() {
        let mut cache = KvCache::new(CacheConfig::default());
        cache.set_tagged("a", b"1".to_vec(), Duration::from_secs(60), &["t"]);
        cache.clear();
        assert!(cache.is_empty());
        cache.set_tagged("b", b"2".to_vec(), Duration::from_secs(60), &["t"]);
        cache.invalidate_tag("t");
        assert_eq!(cache.get("b"), None);
    }
}
