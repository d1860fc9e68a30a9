// cache/backend.rs - Distributed cache backends (Redis and in-process)

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::time::Duration;
use thiserror::Error;

use super::keys::matches_pattern;
use super::ttl::TtlCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache command failed: {0}")]
    Command(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache value could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Command(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// Key/value cache shared across server instances.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Delete every key matching a `*` glob pattern.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    fn name(&self) -> &'static str;
}

/// Single-instance backend built on [`TtlCache`].
pub struct MemoryCacheBackend {
    entries: TtlCache<Vec<u8>>,
}

impl MemoryCacheBackend {
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            entries: TtlCache::new(Duration::from_secs(300), sweep_interval),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stop(&self) {
        self.entries.stop();
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let removed = keys.iter().filter(|key| self.entries.delete(key)).count();
        Ok(removed as u64)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let removed = self.entries.delete_where(|key| matches_pattern(pattern, key));
        Ok(removed as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis backend over a deadpool connection pool.
pub struct RedisCacheBackend {
    pool: Pool,
}

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 200;

impl RedisCacheBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from a URL and verify connectivity.
    pub async fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self, CacheError> {
        let mut config = deadpool_redis::Config::from_url(url);
        let mut pool_config = config.get_pool_config();
        pool_config.max_size = pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let backend = Self::new(pool);
        backend.ping().await?;
        tracing::info!("Connected to Redis cache backend");
        Ok(backend)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.pool.get().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!("Deleted {} keys matching {}", removed, pattern);
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
