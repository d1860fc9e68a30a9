// cache/service.rs - Typed read-through helpers over the distributed cache

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::backend::{CacheBackend, CacheError};
use super::keys::{self, EntityType};
use super::metrics::CacheMetrics;

/// Entity, metadata and list caching with JSON encoding.
///
/// Values that fail to decode are treated as misses and evicted.
///
/// Read-through callers take [`CacheService::generation`] before loading from
/// the store and write back with the `*_if_current` helpers. Invalidations
/// advance the generation while holding the fence exclusively, so a load that
/// overlapped one is never written back by this process.
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    fence: Arc<RwLock<u64>>,
    metrics: Arc<CacheMetrics>,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            fence: Arc::new(RwLock::new(0)),
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Invalidation generation to pass to the `*_if_current` helpers.
    pub async fn generation(&self) -> u64 {
        *self.fence.read().await
    }

    pub async fn cache_entity<T: Serialize + Sync>(
        &self,
        entity_type: EntityType,
        id: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let key = keys::entity_key(entity_type, id);
        self.put(&key, value, entity_type.ttl()).await
    }

    /// Like [`CacheService::cache_entity`], skipped when an invalidation ran
    /// since `generation`. Returns whether the value was written.
    pub async fn cache_entity_if_current<T: Serialize + Sync>(
        &self,
        entity_type: EntityType,
        id: &str,
        value: &T,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let key = keys::entity_key(entity_type, id);
        self.put_if_current(&key, value, entity_type.ttl(), generation).await
    }

    pub async fn get_entity<T: DeserializeOwned>(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<T>, CacheError> {
        self.fetch(&keys::entity_key(entity_type, id)).await
    }

    pub async fn cache_metadata<T: Serialize + Sync>(
        &self,
        entity_type: EntityType,
        id: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let key = keys::metadata_key(entity_type, id);
        self.put(&key, value, keys::METADATA_TTL).await
    }

    pub async fn get_metadata<T: DeserializeOwned>(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<T>, CacheError> {
        self.fetch(&keys::metadata_key(entity_type, id)).await
    }

    pub async fn cache_list<T: Serialize + Sync>(
        &self,
        entity_type: EntityType,
        parent_id: &str,
        offset: usize,
        limit: usize,
        value: &T,
    ) -> Result<(), CacheError> {
        let key = keys::list_key(entity_type, parent_id, offset, limit);
        self.put(&key, value, keys::LIST_TTL).await
    }

    pub async fn cache_list_if_current<T: Serialize + Sync>(
        &self,
        entity_type: EntityType,
        parent_id: &str,
        offset: usize,
        limit: usize,
        value: &T,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let key = keys::list_key(entity_type, parent_id, offset, limit);
        self.put_if_current(&key, value, keys::LIST_TTL, generation).await
    }

    pub async fn get_list<T: DeserializeOwned>(
        &self,
        entity_type: EntityType,
        parent_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Option<T>, CacheError> {
        self.fetch(&keys::list_key(entity_type, parent_id, offset, limit)).await
    }

    pub async fn cache_auth_data<T: Serialize + Sync>(
        &self,
        threat_model_id: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        self.put(&keys::auth_key(threat_model_id), value, keys::AUTH_TTL).await
    }

    pub async fn get_auth_data<T: DeserializeOwned>(
        &self,
        threat_model_id: &str,
    ) -> Result<Option<T>, CacheError> {
        self.fetch(&keys::auth_key(threat_model_id)).await
    }

    pub async fn invalidate_keys(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut generation = self.fence.write().await;
        *generation += 1;
        let removed = self.observe(self.backend.delete(keys).await)?;
        if let Some(key) = keys.first() {
            self.metrics.record_deletes(keys::category(key), removed);
        }
        Ok(removed)
    }

    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut generation = self.fence.write().await;
        *generation += 1;
        let removed = self.observe(self.backend.delete_pattern(pattern).await)?;
        self.metrics.record_deletes(keys::category(pattern), removed);
        Ok(removed)
    }

    async fn put<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.observe(self.backend.set(key, bytes, ttl).await)?;
        self.metrics.record_write(keys::category(key));
        tracing::debug!("Cached {} for {:?}", key, ttl);
        Ok(())
    }

    // The shared fence is held across the write so no invalidation can slip in after the check
    async fn put_if_current<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let current = self.fence.read().await;
        if *current != generation {
            tracing::debug!("Not caching {}, invalidated during load", key);
            return Ok(false);
        }
        self.put(key, value, ttl).await?;
        Ok(true)
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let category = keys::category(key);
        let Some(bytes) = self.observe(self.backend.get(key).await)? else {
            self.metrics.record_miss(category);
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.metrics.record_hit(category);
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.metrics.record_miss(category);
                self.metrics.record_error();
                self.observe(self.backend.delete(&[key.to_string()]).await)?;
                Ok(None)
            }
        }
    }

    fn observe<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }
}
