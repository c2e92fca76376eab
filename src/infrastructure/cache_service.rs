use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Absolute lifetime used when `set` is called without an explicit TTL.
    pub default_ttl: Duration,
    /// Idle window; every read hit pushes the idle deadline forward by this much.
    pub sliding_window: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            sliding_window: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
    pub evictions: AtomicU64,
    pub errors: AtomicU64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        if hits + misses == 0 {
            0.0
        } else {
            (hits as f64 / (hits + misses) as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub expires_at: Instant,
    pub sliding_window: Duration,
    pub access_count: u64,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration, sliding_window: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            expires_at: now + ttl,
            sliding_window,
            access_count: 0,
        }
    }

    /// Expired once past the absolute deadline or idle for longer than the sliding window.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at || now.duration_since(self.last_accessed) >= self.sliding_window
    }

    fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }
}

/// In-process, typed-on-read cache shared by every request.
///
/// Values are stored as `serde_json::Value` so a single instance can hold
/// records and collections of different types. A value that no longer decodes
/// as the requested type is treated as a miss and evicted; nothing here ever
/// returns an error to the caller.
#[derive(Clone)]
pub struct AccountCache {
    entries: Arc<DashMap<String, CacheEntry<serde_json::Value>>>,
    config: CacheConfig,
    metrics: Arc<CacheMetrics>,
}

impl AccountCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();

        let decoded = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.is_expired(now) {
                    None
                } else {
                    entry.touch(now);
                    Some(serde_json::from_value::<T>(entry.value.clone()))
                }
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache miss");
                return None;
            }
        };

        match decoded {
            Some(Ok(value)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit");
                Some(value)
            }
            Some(Err(e)) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "cached value has unexpected shape, evicting");
                self.evict(key);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                debug!(key, "cache entry expired");
                self.evict(key);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "failed to serialize value for cache, skipping");
                return;
            }
        };

        self.entries.insert(
            key.to_string(),
            CacheEntry::new(value, ttl, self.config.sliding_window),
        );
        self.metrics.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key, ttl_secs = ttl.as_secs(), "cache set");
    }

    /// Overwrites the value of a resident entry, keeping its expiration untouched.
    /// Returns false when the key is absent or expired.
    pub fn replace_content<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "failed to serialize replacement, evicting");
                self.evict(key);
                return false;
            }
        };

        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.value = value;
                debug!(key, "cache content replaced");
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
        debug!(key, "cache remove");
    }

    /// Without a trailing `*` this is an exact-key removal; with one, every
    /// resident key starting with the prefix is dropped.
    pub fn remove_by_prefix(&self, pattern: &str) {
        match pattern.strip_suffix('*') {
            Some(prefix) => {
                let before = self.entries.len();
                self.entries.retain(|key, _| !key.starts_with(prefix));
                let removed = before.saturating_sub(self.entries.len());
                self.metrics
                    .evictions
                    .fetch_add(removed as u64, Ordering::Relaxed);
                debug!(prefix, removed, "cache remove by prefix");
            }
            None => self.remove(pattern),
        }
    }

    /// Replaces the element of the cached list whose id matches `item_id`.
    pub fn patch_list_item<T, K, F>(&self, list_key: &str, item_id: &K, new_item: T, id_of: F)
    where
        T: Serialize + DeserializeOwned,
        K: PartialEq + std::fmt::Debug,
        F: Fn(&T) -> K,
    {
        self.modify_list::<T, _>(list_key, |items| {
            match items.iter().position(|item| &id_of(item) == item_id) {
                Some(index) => {
                    items[index] = new_item;
                    debug!(list_key, ?item_id, "cache list item patched");
                    true
                }
                None => {
                    debug!(list_key, ?item_id, "item not in cached list, skipping patch");
                    false
                }
            }
        });
    }

    /// Appends to a resident list unless an element with the same id is already there.
    pub fn push_list_item<T, K, F>(&self, list_key: &str, item: T, id_of: F)
    where
        T: Serialize + DeserializeOwned,
        K: PartialEq,
        F: Fn(&T) -> K,
    {
        self.modify_list::<T, _>(list_key, |items| {
            let id = id_of(&item);
            if items.iter().any(|existing| id_of(existing) == id) {
                return false;
            }
            items.push(item);
            debug!(list_key, "cache list item appended");
            true
        });
    }

    pub fn remove_list_item<T, K, F>(&self, list_key: &str, item_id: &K, id_of: F)
    where
        T: Serialize + DeserializeOwned,
        K: PartialEq + std::fmt::Debug,
        F: Fn(&T) -> K,
    {
        self.modify_list::<T, _>(list_key, |items| {
            let before = items.len();
            items.retain(|item| &id_of(item) != item_id);
            let changed = items.len() != before;
            if changed {
                debug!(list_key, ?item_id, "cache list item removed");
            }
            changed
        });
    }

    /// Applies `f` to the decoded list under the entry's shard lock and writes
    /// it back when `f` reports a change. Absent, expired or mistyped entries
    /// are left alone (the latter two are evicted).
    fn modify_list<T, F>(&self, list_key: &str, f: F)
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> bool,
    {
        let now = Instant::now();
        let mut evict = false;

        match self.entries.get_mut(list_key) {
            Some(mut entry) => {
                if entry.is_expired(now) {
                    evict = true;
                } else {
                    match serde_json::from_value::<Vec<T>>(entry.value.clone()) {
                        Ok(mut items) => {
                            if f(&mut items) {
                                match serde_json::to_value(&items) {
                                    Ok(value) => entry.value = value,
                                    Err(e) => {
                                        warn!(list_key, error = %e, "failed to re-encode cached list");
                                        evict = true;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            warn!(list_key, error = %e, "cached entry is not a list of the expected type");
                            evict = true;
                        }
                    }
                }
            }
            None => {
                debug!(list_key, "list not in cache, skipping update");
            }
        }

        if evict {
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            self.evict(list_key);
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.metrics
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        self.metrics.as_ref()
    }

    /// Periodically purges expired entries and reports counters.
    pub fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let period = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = cache.purge_expired();
                info!(
                    removed,
                    resident = cache.len(),
                    hit_rate = cache.metrics().hit_rate(),
                    "cache cleanup"
                );
            }
        })
    }

    fn evict(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for AccountCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    fn item(id: u32, name: &str) -> Item {
        Item {
            id,
            name: name.to_string(),
        }
    }

    fn cache() -> AccountCache {
        AccountCache::new(CacheConfig {
            default_ttl: Duration::from_secs(60),
            sliding_window: Duration::from_secs(20),
            cleanup_interval: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache();
        cache.set("k", &item(1, "a"), None);
        assert_eq!(cache.get::<Item>("k"), Some(item(1, "a")));
        assert_eq!(cache.metrics().hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_a_miss() {
        let cache = cache();
        assert_eq!(cache.get::<Item>("nope"), None);
        assert_eq!(cache.metrics().misses.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_degrades_to_miss_and_evicts() {
        let cache = cache();
        cache.set("k", &"plain string", None);
        assert_eq!(cache.get::<Item>("k"), None);
        assert!(!cache.contains_key("k"));
        assert_eq!(cache.metrics().errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_expiry() {
        let cache = cache();
        cache.set("k", &item(1, "a"), Some(Duration::from_secs(30)));

        // keep it warm so only the absolute deadline matters
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(10)).await;
            let _ = cache.get::<Item>("k");
        }
        assert_eq!(cache.get::<Item>("k"), None);
        assert!(!cache.contains_key("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_extends_on_read() {
        let cache = cache();
        cache.set("k", &item(1, "a"), None);

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(cache.get::<Item>("k").is_some());
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(cache.get::<Item>("k").is_some());

        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(cache.get::<Item>("k").is_none());
    }

    #[tokio::test]
    async fn test_patch_list_item() {
        let cache = cache();
        cache.set("list", &vec![item(1, "a"), item(2, "b")], None);

        cache.patch_list_item("list", &2, item(2, "patched"), |i: &Item| i.id);

        let list: Vec<Item> = cache.get("list").unwrap();
        assert_eq!(list, vec![item(1, "a"), item(2, "patched")]);
    }

    #[tokio::test]
    async fn test_patch_list_item_missing_item_or_list_is_noop() {
        let cache = cache();
        cache.patch_list_item("absent", &1, item(1, "x"), |i: &Item| i.id);
        assert!(!cache.contains_key("absent"));

        cache.set("list", &vec![item(1, "a")], None);
        cache.patch_list_item("list", &9, item(9, "x"), |i: &Item| i.id);
        let list: Vec<Item> = cache.get("list").unwrap();
        assert_eq!(list, vec![item(1, "a")]);
    }

    #[tokio::test]
    async fn test_patch_on_wrong_type_evicts() {
        let cache = cache();
        cache.set("list", &item(1, "not a list"), None);
        cache.patch_list_item("list", &1, item(1, "x"), |i: &Item| i.id);
        assert!(!cache.contains_key("list"));
    }

    #[tokio::test]
    async fn test_push_and_remove_list_items() {
        let cache = cache();
        cache.push_list_item("list", item(1, "a"), |i: &Item| i.id);
        assert!(!cache.contains_key("list"));

        cache.set("list", &Vec::<Item>::new(), None);
        cache.push_list_item("list", item(1, "a"), |i: &Item| i.id);
        cache.push_list_item("list", item(1, "dup"), |i: &Item| i.id);
        cache.push_list_item("list", item(2, "b"), |i: &Item| i.id);
        let list: Vec<Item> = cache.get("list").unwrap();
        assert_eq!(list, vec![item(1, "a"), item(2, "b")]);

        cache.remove_list_item("list", &1, |i: &Item| i.id);
        let list: Vec<Item> = cache.get("list").unwrap();
        assert_eq!(list, vec![item(2, "b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_content_keeps_expiration() {
        let cache = cache();
        cache.set("k", &item(1, "a"), Some(Duration::from_secs(15)));
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(cache.replace_content("k", &item(1, "b")));
        assert_eq!(cache.get::<Item>("k"), Some(item(1, "b")));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get::<Item>("k"), None);
        assert!(!cache.replace_content("k", &item(1, "c")));
    }

    #[tokio::test]
    async fn test_remove_by_prefix() {
        let cache = cache();
        cache.set("account:1", &1, None);
        cache.set("account:2", &2, None);
        cache.set("accounts:all", &vec![1, 2], None);

        cache.remove_by_prefix("accounts:all");
        assert!(!cache.contains_key("accounts:all"));
        assert!(cache.contains_key("account:1"));

        cache.remove_by_prefix("account:*");
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache();
        cache.set("short", &1, Some(Duration::from_secs(5)));
        cache.set("long", &2, None);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("long"));
    }
}
