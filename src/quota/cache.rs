// quota/cache.rs - Read-through TTL cache for quota values

use std::time::Duration;
use uuid::Uuid;

use super::store::QuotaStore;
use super::types::{AddonInvocationQuota, QuotaRecord, UserApiQuota, WebhookQuota};
use crate::cache::TtlCache;

/// Quota values cached per owner.
///
/// Staleness is bounded by the TTL; admin writes call the matching
/// `invalidate_*` so the writer's next read goes to the store.
pub struct QuotaCache {
    user_api: TtlCache<UserApiQuota>,
    webhook: TtlCache<WebhookQuota>,
    addon: TtlCache<AddonInvocationQuota>,
}

impl QuotaCache {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            user_api: TtlCache::new(ttl, sweep_interval),
            webhook: TtlCache::new(ttl, sweep_interval),
            addon: TtlCache::new(ttl, sweep_interval),
        }
    }

    pub async fn get_user_api_quota(
        &self,
        user_id: Uuid,
        store: &dyn QuotaStore<UserApiQuota>,
    ) -> UserApiQuota {
        read_through(&self.user_api, user_id, store).await
    }

    pub async fn get_webhook_quota(
        &self,
        owner_id: Uuid,
        store: &dyn QuotaStore<WebhookQuota>,
    ) -> WebhookQuota {
        read_through(&self.webhook, owner_id, store).await
    }

    pub async fn get_addon_invocation_quota(
        &self,
        owner_id: Uuid,
        store: &dyn QuotaStore<AddonInvocationQuota>,
    ) -> AddonInvocationQuota {
        read_through(&self.addon, owner_id, store).await
    }

    pub fn invalidate_user_api_quota(&self, user_id: Uuid) {
        self.user_api.delete(&user_id.to_string());
    }

    pub fn invalidate_webhook_quota(&self, owner_id: Uuid) {
        self.webhook.delete(&owner_id.to_string());
    }

    pub fn invalidate_addon_invocation_quota(&self, owner_id: Uuid) {
        self.addon.delete(&owner_id.to_string());
    }

    pub fn invalidate_all(&self) {
        self.user_api.clear();
        self.webhook.clear();
        self.addon.clear();
        tracing::info!("Quota cache cleared");
    }

    /// Stop the background sweepers.
    pub fn stop(&self) {
        self.user_api.stop();
        self.webhook.stop();
        self.addon.stop();
    }
}

// The store call runs without any cache lock held. A load that overlapped an
// invalidation is returned to its caller but not cached.
async fn read_through<Q: QuotaRecord>(cache: &TtlCache<Q>, owner_id: Uuid, store: &dyn QuotaStore<Q>) -> Q {
    let key = owner_id.to_string();
    if let Some(quota) = cache.get(&key) {
        return quota;
    }

    let generation = cache.generation();
    let quota = store.get_or_default(owner_id).await;
    if cache.insert_if_current(key, quota.clone(), generation) {
        tracing::debug!("Cached {} for {}", Q::KIND, owner_id);
    } else {
        tracing::debug!("Skipped caching {} for {}, invalidated during load", Q::KIND, owner_id);
    }
    quota
}
