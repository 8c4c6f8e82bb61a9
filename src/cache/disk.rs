use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    value: Value,
    created_at: DateTime<Utc>,
}

/// Durable tier: one JSON file per entry, named by a 16-hex-char prefix of
/// the SHA-256 of the logical key. The logical key is stored inside the file
/// so a hash collision reads as a miss rather than the wrong value.
pub struct DiskCache {
    cache_dir: PathBuf,
    ttl_days: i64,
}

impl DiskCache {
    pub const DEFAULT_TTL_DAYS: i64 = 30;

    pub fn new(cache_dir: impl Into<PathBuf>, ttl_days: i64) -> std::io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir, ttl_days })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hashed = &hex::encode(hasher.finalize())[..16];
        self.cache_dir.join(format!("{}.json", hashed))
    }

    fn is_expired(&self, created_at: DateTime<Utc>) -> bool {
        Utc::now() - created_at > Duration::days(self.ttl_days)
    }

    fn read_entry(path: &Path) -> Option<DiskEntry> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.key_path(key);
        if !path.exists() {
            return None;
        }

        let Some(entry) = Self::read_entry(&path) else {
            // Corrupted file: delete and treat as a miss.
            let _ = fs::remove_file(&path);
            return None;
        };

        if entry.key != key {
            debug!("Disk cache hash collision for {}", key);
            return None;
        }

        if self.is_expired(entry.created_at) {
            let _ = fs::remove_file(&path);
            return None;
        }

        Some(entry.value)
    }

    pub fn set(&self, key: &str, value: Value) {
        let path = self.key_path(key);
        let entry = DiskEntry {
            key: key.to_string(),
            value,
            created_at: Utc::now(),
        };
        let Ok(text) = serde_json::to_string(&entry) else {
            return;
        };
        // Write-then-rename so concurrent readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        if fs::write(&tmp, text).is_ok() {
            let _ = fs::rename(&tmp, &path);
        }
    }

    pub fn delete(&self, key: &str) {
        let _ = fs::remove_file(self.key_path(key));
    }

    pub fn clear(&self) {
        let Ok(dir) = fs::read_dir(&self.cache_dir) else {
            return;
        };
        for entry in dir.flatten() {
            if entry.path().extension().is_some_and(|e| e == "json") {
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    /// Remove expired and unreadable entries. Returns the count removed.
    pub fn cleanup_expired(&self) -> usize {
        let Ok(dir) = fs::read_dir(&self.cache_dir) else {
            return 0;
        };
        let mut removed = 0;
        for file in dir.flatten() {
            let path = file.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match Self::read_entry(&path) {
                Some(entry) if !self.is_expired(entry.created_at) => {}
                _ => {
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn disk_cache(ttl_days: i64) -> (TempDir, DiskCache) {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), ttl_days).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_round_trip() {
        let (_dir, cache) = disk_cache(30);
        cache.set("summary:https://example.com/a", json!({"headline": "H"}));
        assert_eq!(
            cache.get("summary:https://example.com/a"),
            Some(json!({"headline": "H"}))
        );
    }

    #[test]
    fn test_corrupted_file_deleted_on_read() {
        let (dir, cache) = disk_cache(30);
        cache.set("k", json!(1));
        let path = cache.key_path("k");
        fs::write(&path, "not json {{{").unwrap();

        assert!(cache.get("k").is_none());
        assert!(!path.exists());
        drop(dir);
    }

    #[test]
    fn test_key_collision_is_a_miss() {
        let (_dir, cache) = disk_cache(30);
        cache.set("original", json!("value"));

        // Forge a file whose stored key disagrees with the probe key.
        let path = cache.key_path("probe");
        let forged = serde_json::to_string(&DiskEntry {
            key: "someone-else".into(),
            value: json!("wrong"),
            created_at: Utc::now(),
        })
        .unwrap();
        fs::write(&path, forged).unwrap();

        assert!(cache.get("probe").is_none());
    }

    #[test]
    fn test_expired_entry_removed() {
        let (_dir, cache) = disk_cache(0);
        let path = cache.key_path("k");
        let stale = serde_json::to_string(&DiskEntry {
            key: "k".into(),
            value: json!("v"),
            created_at: Utc::now() - Duration::days(2),
        })
        .unwrap();
        fs::write(&path, stale).unwrap();

        assert!(cache.get("k").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_expired_sweep() {
        let (_dir, cache) = disk_cache(30);
        cache.set("fresh", json!(1));

        let stale_path = cache.key_path("stale");
        let stale = serde_json::to_string(&DiskEntry {
            key: "stale".into(),
            value: json!(2),
            created_at: Utc::now() - Duration::days(90),
        })
        .unwrap();
        fs::write(&stale_path, stale).unwrap();

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("stale").is_none());
    }
}
