use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory LRU tier. Reads refresh access order; inserts evict the least
/// recently used entry once capacity is reached.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) => match entry.expires_at {
                Some(expires_at) => expires_at < Utc::now(),
                None => return Some(entry.value.clone()),
            },
            None => return None,
        };
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: &str, value: Value, ttl_secs: Option<i64>) {
        let expires_at = ttl_secs.map(|secs| Utc::now() + Duration::seconds(secs));
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key.to_string(), Entry { value, expires_at });
        }
    }

    pub fn delete(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
