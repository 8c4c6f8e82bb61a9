//! Tiered cache fronting every expensive operation.
//!
//! `get` consults the memory tier first and falls through to disk, promoting
//! on hit; `set`, `delete`, and `clear` apply to both tiers.

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::MemoryCache;

use std::path::PathBuf;

use serde_json::Value;

pub struct TieredCache {
    memory: MemoryCache,
    disk: DiskCache,
}

impl TieredCache {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        memory_capacity: usize,
        ttl_days: i64,
    ) -> std::io::Result<Self> {
        Ok(Self {
            memory: MemoryCache::new(memory_capacity),
            disk: DiskCache::new(cache_dir, ttl_days)?,
        })
    }

    pub fn with_defaults(cache_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::new(
            cache_dir,
            MemoryCache::DEFAULT_CAPACITY,
            DiskCache::DEFAULT_TTL_DAYS,
        )
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }
        if let Some(value) = self.disk.get(key) {
            // Promote without a TTL; the disk tier still enforces its window.
            self.memory.set(key, value.clone(), None);
            return Some(value);
        }
        None
    }

    pub fn set(&self, key: &str, value: Value, ttl_secs: Option<i64>) {
        self.memory.set(key, value.clone(), ttl_secs);
        self.disk.set(key, value);
    }

    pub fn delete(&self, key: &str) {
        self.memory.delete(key);
        self.disk.delete(key);
    }

    pub fn clear(&self) {
        self.memory.clear();
        self.disk.clear();
    }

    pub fn cleanup_expired(&self) -> usize {
        self.disk.cleanup_expired()
    }

    #[cfg(test)]
    pub(crate) fn memory_only(&self, key: &str) -> Option<Value> {
        self.memory.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_set_reaches_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = TieredCache::new(dir.path(), 4, 30).unwrap();
        cache.set("k", json!("v"), None);

        assert_eq!(cache.memory_only("k"), Some(json!("v")));

        let disk = DiskCache::new(dir.path(), 30).unwrap();
        assert_eq!(disk.get("k"), Some(json!("v")));
    }

    #[test]
    fn test_disk_hit_promotes_to_memory() {
        let dir = TempDir::new().unwrap();
        let cache = TieredCache::new(dir.path(), 2, 30).unwrap();

        // Populate the disk layer, then push the entry out of memory.
        cache.set("k1", json!(1), None);
        cache.set("k2", json!(2), None);
        cache.set("k3", json!(3), None);
        assert!(cache.memory_only("k1").is_none());

        assert_eq!(cache.get("k1"), Some(json!(1)));
        assert_eq!(cache.memory_only("k1"), Some(json!(1)));
    }

    #[test]
    fn test_delete_misses_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = TieredCache::new(dir.path(), 4, 30).unwrap();
        cache.set("k", json!("v"), None);
        cache.delete("k");

        assert!(cache.get("k").is_none());
        let disk = DiskCache::new(dir.path(), 30).unwrap();
        assert!(disk.get("k").is_none());
    }
}
