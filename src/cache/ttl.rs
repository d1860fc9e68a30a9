// cache/ttl.rs - Expiring key/value map with a managed background sweep

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Generic TTL cache keyed by string.
///
/// Reads take a shared lock and never evict; expired entries are reported as
/// misses and left for the sweeper (or an overwrite) to remove. The sweep task
/// is owned by the cache: it starts on construction and stops on [`TtlCache::stop`]
/// or when the cache is dropped.
///
/// Every removal bumps a generation counter. Read-through callers take
/// [`TtlCache::generation`] before loading and store with
/// [`TtlCache::insert_if_current`], so a load that raced an invalidation is
/// never cached.
pub struct TtlCache<V> {
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
    generation: AtomicU64,
    default_ttl: Duration,
    stop_tx: watch::Sender<bool>,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache whose sweeper runs every `sweep_interval`.
    ///
    /// Outside a tokio runtime no sweeper is started and expiry stays lazy.
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        let entries: Arc<RwLock<HashMap<String, Entry<V>>>> = Arc::new(RwLock::new(HashMap::new()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(sweep_loop(
                Arc::clone(&entries),
                sweep_interval,
                stop_rx,
            ))),
            Err(_) => {
                tracing::debug!("TTL cache created outside a runtime, sweeper disabled");
                None
            }
        };

        Self {
            entries,
            generation: AtomicU64::new(0),
            default_ttl,
            stop_tx,
            sweeper: parking_lot::Mutex::new(sweeper),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the value if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert with the cache's default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Insert or overwrite, expiring at `now + ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Insert with the default TTL unless something was removed since
    /// `generation` was read. Returns whether the value was stored.
    pub fn insert_if_current(&self, key: impl Into<String>, value: V, generation: u64) -> bool {
        let mut entries = self.entries.write();
        // Removals bump under the write lock, so this check cannot interleave with one
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.default_ttl,
        };
        entries.insert(key.into(), entry);
        true
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write();
        self.bump();
        entries.remove(key).is_some()
    }

    /// Remove every live key matching `predicate`, returning how many were dropped.
    pub fn delete_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut entries = self.entries.write();
        self.bump();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    /// Keys of live entries matching `predicate`.
    pub fn keys_where<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && predicate(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        self.bump();
        entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.entries)
    }

    /// Stop the background sweeper. Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

fn sweep_expired<V>(entries: &RwLock<HashMap<String, Entry<V>>>) -> usize {
    let now = Instant::now();
    let mut entries = entries.write();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

async fn sweep_loop<V>(
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
    every: Duration,
    mut stop_rx: watch::Receiver<bool>,
) where
    V: Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = sweep_expired(&entries);
                if removed > 0 {
                    tracing::debug!("TTL cache sweep removed {} expired entries", removed);
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_before_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        cache.set("a", 1u32, Duration::from_millis(200));

        assert_eq!(cache.get("a"), Some(1));
        cache.stop();
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        cache.set("a", "v".to_string(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.get("a"), None);
        // Lazy read: still stored until swept
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
        cache.stop();
    }

    #[tokio::test]
    async fn background_sweep_removes_expired_entries() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_millis(20));
        cache.set("short", 1u8, Duration::from_millis(10));
        cache.set("long", 2u8, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
        cache.stop();
    }

    #[tokio::test]
    async fn overwrite_refreshes_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        cache.set("k", 1u8, Duration::from_millis(30));
        cache.set("k", 2u8, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get("k"), Some(2));
        cache.stop();
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        cache.insert("k", 1u8);

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.get("k"), None);
        cache.stop();
    }

    #[tokio::test]
    async fn stop_ends_sweeper_and_is_repeatable() {
        let cache: TtlCache<u8> = TtlCache::new(Duration::from_secs(60), Duration::from_millis(10));
        assert!(cache.is_sweeping());

        cache.stop();
        cache.stop();

        assert!(!cache.is_sweeping());
    }

    #[test]
    fn works_without_runtime() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(1));
        cache.insert("k", 7u8);

        assert!(!cache.is_sweeping());
        assert_eq!(cache.get("k"), Some(7));
    }

    #[tokio::test]
    async fn concurrent_readers_and_writers() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), Duration::from_millis(5)));
        let mut tasks = Vec::new();

        for worker in 0..8u32 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                for i in 0..200u32 {
                    let key = format!("k{}", i % 16);
                    if i % 3 == 0 {
                        cache.set(key, worker, Duration::from_millis(2));
                    } else {
                        let _ = cache.get(&key);
                    }
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(cache.len() <= 16);
        cache.stop();
    }

    #[tokio::test]
    async fn insert_after_removal_is_refused_for_old_generation() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let seen = cache.generation();

        cache.delete("k");

        assert!(!cache.insert_if_current("k", 1u8, seen));
        assert_eq!(cache.get("k"), None);
        assert!(cache.insert_if_current("k", 2u8, cache.generation()));
        assert_eq!(cache.get("k"), Some(2));
        cache.stop();
    }

    #[tokio::test]
    async fn clear_and_delete_where_advance_generation() {
        let cache: TtlCache<u8> = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let start = cache.generation();

        cache.clear();
        let after_clear = cache.generation();
        cache.delete_where(|_| false);

        assert!(after_clear > start);
        assert!(cache.generation() > after_clear);
        cache.stop();
    }

    #[tokio::test]
    async fn delete_where_matches_prefix() {
        let cache = TtlCache::new(Duration::from_secs(60), Duration::from_secs(60));
        cache.insert("list:a:1", 1u8);
        cache.insert("list:a:2", 2u8);
        cache.insert("list:b:1", 3u8);

        assert_eq!(cache.delete_where(|k| k.starts_with("list:a:")), 2);
        assert_eq!(cache.keys_where(|_| true), vec!["list:b:1".to_string()]);
        cache.stop();
    }
}
