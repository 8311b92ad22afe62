//! Per-session response cache.
//!
//! Entries are keyed by (session id, normalized text) and carry the critical
//! slot fingerprint they were computed under. A lookup whose fingerprint
//! differs is a miss, so an answer for decision 12 can never be replayed for
//! decision 13 even when the wording repeats.

use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::session::Sweepable;

struct CacheEntry<V> {
    value: V,
    fingerprint: String,
    inserted_at: Instant,
}

type CacheKey = (String, String);

pub struct ResponseCache<V> {
    entries: Arc<RwLock<lru::LruCache<CacheKey, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(lru::LruCache::new(capacity))),
            ttl,
        }
    }

    pub fn get(&self, session_id: &str, text: &str, fingerprint: &str) -> Option<V> {
        let key = (session_id.to_string(), text.to_string());
        let mut entries = self.entries.write();
        let (expired, value) = {
            let entry = entries.get(&key)?;
            let expired = entry.inserted_at.elapsed() > self.ttl;
            let value = (entry.fingerprint == fingerprint).then(|| entry.value.clone());
            (expired, value)
        };
        if expired {
            entries.pop(&key);
            return None;
        }
        value
    }

    pub fn put(&self, session_id: &str, text: &str, fingerprint: &str, value: V) {
        self.entries.write().put(
            (session_id.to_string(), text.to_string()),
            CacheEntry {
                value,
                fingerprint: fingerprint.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry of one session. Returns how many were removed.
    pub fn invalidate_session(&self, session_id: &str) -> usize {
        let mut entries = self.entries.write();
        let keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.0 == session_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        keys.len()
    }

    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V: Clone + Send + Sync> Sweepable for ResponseCache<V> {
    fn sweep(&self) -> usize {
        self.evict_expired()
    }
}
