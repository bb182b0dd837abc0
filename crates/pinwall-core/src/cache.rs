use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::Result;

/// Key-value cache contract: get, set with TTL, delete. Values are opaque
/// strings; callers decide the encoding.
///
/// Implementations may fail. `PanelStore` treats any error from these
/// methods as a miss and falls back to the durable store, so a broken cache
/// degrades throughput, never correctness.
pub trait ObjectCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local TTL cache. Enough for a single-instance deployment; the
/// `ObjectCache` seam is where a shared backend would plug in.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get_at(&self, key: &str, now: Instant) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("cache lock poisoned: {}", e))?;
        Ok(entries.get(key).and_then(|entry| {
            if entry.expires_at > now {
                Some(entry.value.clone())
            } else {
                // Expired entries are left for the sweep; reads just miss.
                None
            }
        }))
    }

    fn set_at(&self, key: &str, value: &str, ttl: Duration, now: Instant) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("cache lock poisoned: {}", e))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    /// Drop entries past their TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_at(key, Instant::now())
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.set_at(key, value, ttl, Instant::now())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("cache lock poisoned: {}", e))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache
            .set("panel:ABC234", "{}", Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            cache.get("panel:ABC234").unwrap(),
            Some("{}".to_string())
        );

        cache.delete("panel:ABC234").unwrap();
        assert_eq!(cache.get("panel:ABC234").unwrap(), None);
        // Deleting a missing key is a no-op.
        cache.delete("panel:ABC234").unwrap();
    }

    #[test]
    fn test_entries_expire() {
        let cache = MemoryCache::new();
        let t0 = Instant::now();
        cache
            .set_at("notes:ABC234", "[]", Duration::from_secs(60), t0)
            .unwrap();

        assert_eq!(
            cache
                .get_at("notes:ABC234", t0 + Duration::from_secs(59))
                .unwrap(),
            Some("[]".to_string())
        );
        assert_eq!(
            cache
                .get_at("notes:ABC234", t0 + Duration::from_secs(61))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let cache = MemoryCache::new();
        let t0 = Instant::now();
        cache
            .set_at("panel:ABC234", "old", Duration::from_secs(10), t0)
            .unwrap();
        cache
            .set_at(
                "panel:ABC234",
                "new",
                Duration::from_secs(10),
                t0 + Duration::from_secs(8),
            )
            .unwrap();

        assert_eq!(
            cache
                .get_at("panel:ABC234", t0 + Duration::from_secs(15))
                .unwrap(),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_sweep_counts_removals() {
        let cache = MemoryCache::new();
        let t0 = Instant::now();
        cache
            .set_at("a", "1", Duration::from_secs(10), t0)
            .unwrap();
        cache
            .set_at("b", "2", Duration::from_secs(300), t0)
            .unwrap();

        assert_eq!(cache.sweep_at(t0 + Duration::from_secs(30)), 1);
        assert_eq!(
            cache.get_at("b", t0 + Duration::from_secs(30)).unwrap(),
            Some("2".to_string())
        );
    }
}
