// quota/addon_limiter.rs - Add-on invocation concurrency and hourly limits

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::cache::QuotaCache;
use super::clock::Clock;
use super::counter::{CounterError, RateCounter};
use super::rate_limit::QuotaExceeded;
use super::store::QuotaStore;
use super::types::AddonInvocationQuota;

const HOUR: i64 = 3_600;
const HOUR_KEY_TTL: Duration = Duration::from_secs(3_660);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonUsage {
    pub max_active_invocations: u64,
    pub max_invocations_per_hour: u64,
    pub invocations_this_hour: u64,
}

impl AddonUsage {
    fn new(quota: &AddonInvocationQuota, used: u64) -> Self {
        Self {
            max_active_invocations: quota.max_active_invocations.max(0) as u64,
            max_invocations_per_hour: quota.max_invocations_per_hour.max(0) as u64,
            invocations_this_hour: used,
        }
    }
}

pub struct AddonRateLimiter {
    counter: Option<Arc<dyn RateCounter>>,
    quotas: Arc<QuotaCache>,
    store: Arc<dyn QuotaStore<AddonInvocationQuota>>,
    clock: Arc<dyn Clock>,
}

fn hourly_key(owner_id: Uuid) -> String {
    format!("addon:ratelimit:hour:{}", owner_id)
}

impl AddonRateLimiter {
    pub fn new(
        counter: Option<Arc<dyn RateCounter>>,
        quotas: Arc<QuotaCache>,
        store: Arc<dyn QuotaStore<AddonInvocationQuota>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            counter,
            quotas,
            store,
            clock,
        }
    }

    async fn quota(&self, owner_id: Uuid) -> AddonInvocationQuota {
        self.quotas.get_addon_invocation_quota(owner_id, self.store.as_ref()).await
    }

    pub async fn check_active_invocation_limit(&self, owner_id: Uuid, active_count: u64) -> Result<(), QuotaExceeded> {
        let quota = self.quota(owner_id).await;
        let max = quota.max_active_invocations.max(0) as u64;

        if active_count >= max {
            return Err(QuotaExceeded {
                message: format!(
                    "active invocation limit reached: {}/{}, wait for running invocations to finish",
                    active_count, max
                ),
                limit: max,
                retry_after_secs: None,
            });
        }
        Ok(())
    }

    /// Sliding one-hour window; retry-after is derived from the oldest entry.
    pub async fn check_hourly_rate_limit(&self, owner_id: Uuid) -> Result<(), QuotaExceeded> {
        let Some(counter) = &self.counter else {
            return Ok(());
        };
        let quota = self.quota(owner_id).await;
        let limit = quota.max_invocations_per_hour.max(0) as u64;
        let now = self.clock.now_unix();

        match counter.sliding_count(&hourly_key(owner_id), now - HOUR).await {
            Ok(window) if window.count >= limit => {
                let retry = window
                    .oldest
                    .map(|oldest| (oldest + HOUR - now).max(1) as u64)
                    .unwrap_or(HOUR as u64);
                Err(QuotaExceeded {
                    message: format!("hourly invocation limit reached: {}/{}", window.count, limit),
                    limit,
                    retry_after_secs: Some(retry),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!("Add-on rate check failed for {}, allowing: {}", owner_id, e);
                Ok(())
            }
        }
    }

    pub async fn record_invocation(&self, owner_id: Uuid) {
        let Some(counter) = &self.counter else {
            return;
        };
        let now = self.clock.now_unix();
        if let Err(e) = counter.sliding_record(&hourly_key(owner_id), now, HOUR_KEY_TTL).await {
            tracing::warn!("Failed to record add-on invocation for {}: {}", owner_id, e);
        }
    }

    pub async fn usage(&self, owner_id: Uuid) -> Result<AddonUsage, CounterError> {
        let quota = self.quota(owner_id).await;
        let used = match &self.counter {
            Some(counter) => {
                counter
                    .sliding_count(&hourly_key(owner_id), self.clock.now_unix() - HOUR)
                    .await?
                    .count
            }
            None => 0,
        };

        Ok(AddonUsage::new(&quota, used))
    }

    /// The owner's limits with nothing counted, for when the counter is unreachable.
    pub async fn unmetered_usage(&self, owner_id: Uuid) -> AddonUsage {
        AddonUsage::new(&self.quota(owner_id).await, 0)
    }
}
