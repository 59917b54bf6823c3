use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::AiCacheConfig;

struct CacheEntry {
    text: String,
    stored_at: Instant,
}

/// LRU-bounded, TTL-expiring cache of blocking completion responses.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// `None` when caching is disabled.
    pub fn from_config(cfg: &AiCacheConfig) -> Option<Self> {
        cfg.enabled
            .then(|| Self::new(cfg.max_entries, Duration::from_secs(cfg.ttl_secs)))
    }

    /// SHA-256 of the request payload. serde_json maps keep keys sorted, so
    /// equal payloads serialise identically.
    pub fn key_for(payload: &Value) -> String {
        let bytes = serde_json::to_vec(payload).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.text.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: String, text: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CacheEntry {
                    text,
                    stored_at: Instant::now(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_ignores_field_order() {
        let a: Value = serde_json::from_str(r#"{"model":"m","stream":false}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"stream":false,"model":"m"}"#).unwrap();
        assert_eq!(ResponseCache::key_for(&a), ResponseCache::key_for(&b));
        assert_ne!(
            ResponseCache::key_for(&a),
            ResponseCache::key_for(&json!({"model": "other"}))
        );
    }

    #[test]
    fn entries_expire() {
        let cache = ResponseCache::new(4, Duration::ZERO);
        cache.insert("k".into(), "v".into());
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        cache.insert("c".into(), "3".into());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }
}
