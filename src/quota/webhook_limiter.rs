// quota/webhook_limiter.rs - Webhook subscription and event publication limits

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::cache::QuotaCache;
use super::clock::Clock;
use super::counter::{CounterError, RateCounter};
use super::rate_limit::QuotaExceeded;
use super::store::QuotaStore;
use super::types::WebhookQuota;

const MINUTE: i64 = 60;
const DAY: i64 = 86_400;
const MINUTE_KEY_TTL: Duration = Duration::from_secs(120);
const DAY_KEY_TTL: Duration = Duration::from_secs(86_460);

/// Usage of one sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
}

impl WindowUsage {
    fn new(limit: u64, used: u64) -> Self {
        Self {
            limit,
            used,
            remaining: limit.saturating_sub(used),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRateInfo {
    pub max_subscriptions: u64,
    pub requests_per_minute: WindowUsage,
    pub requests_per_day: WindowUsage,
    pub events_per_minute: WindowUsage,
}

/// Sliding-window limits on webhook subscription churn and event volume.
pub struct WebhookRateLimiter {
    counter: Option<Arc<dyn RateCounter>>,
    quotas: Arc<QuotaCache>,
    store: Arc<dyn QuotaStore<WebhookQuota>>,
    clock: Arc<dyn Clock>,
}

fn subscription_minute_key(owner_id: Uuid) -> String {
    format!("webhook:ratelimit:sub:minute:{}", owner_id)
}

fn subscription_day_key(owner_id: Uuid) -> String {
    format!("webhook:ratelimit:sub:day:{}", owner_id)
}

fn events_minute_key(owner_id: Uuid) -> String {
    format!("webhook:ratelimit:events:minute:{}", owner_id)
}

impl WebhookRateLimiter {
    pub fn new(
        counter: Option<Arc<dyn RateCounter>>,
        quotas: Arc<QuotaCache>,
        store: Arc<dyn QuotaStore<WebhookQuota>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            counter,
            quotas,
            store,
            clock,
        }
    }

    async fn quota(&self, owner_id: Uuid) -> WebhookQuota {
        self.quotas.get_webhook_quota(owner_id, self.store.as_ref()).await
    }

    /// Reject when the owner already holds the maximum number of subscriptions.
    pub async fn check_subscription_limit(&self, owner_id: Uuid, current_count: u64) -> Result<(), QuotaExceeded> {
        let quota = self.quota(owner_id).await;
        let max = quota.max_subscriptions.max(0) as u64;

        if current_count >= max {
            return Err(QuotaExceeded {
                message: format!("subscription limit reached: {}/{}", current_count, max),
                limit: max,
                retry_after_secs: None,
            });
        }
        Ok(())
    }

    /// Per-minute then per-day limit on subscription create requests.
    pub async fn check_subscription_request_limit(&self, owner_id: Uuid) -> Result<(), QuotaExceeded> {
        let quota = self.quota(owner_id).await;
        let now = self.clock.now_unix();

        self.check_window(
            &subscription_minute_key(owner_id),
            now,
            MINUTE,
            quota.max_subscription_requests_per_minute,
            "subscription requests per minute",
        )
        .await?;

        self.check_window(
            &subscription_day_key(owner_id),
            now,
            DAY,
            quota.max_subscription_requests_per_day,
            "subscription requests per day",
        )
        .await
    }

    pub async fn check_event_publication_limit(&self, owner_id: Uuid) -> Result<(), QuotaExceeded> {
        let quota = self.quota(owner_id).await;
        let now = self.clock.now_unix();

        self.check_window(
            &events_minute_key(owner_id),
            now,
            MINUTE,
            quota.max_events_per_minute,
            "events per minute",
        )
        .await
    }

    pub async fn record_subscription_request(&self, owner_id: Uuid) {
        let now = self.clock.now_unix();
        self.record(&subscription_minute_key(owner_id), now, MINUTE_KEY_TTL).await;
        self.record(&subscription_day_key(owner_id), now, DAY_KEY_TTL).await;
    }

    pub async fn record_event_publication(&self, owner_id: Uuid) {
        let now = self.clock.now_unix();
        self.record(&events_minute_key(owner_id), now, MINUTE_KEY_TTL).await;
    }

    pub async fn subscription_rate_info(&self, owner_id: Uuid) -> Result<SubscriptionRateInfo, CounterError> {
        let quota = self.quota(owner_id).await;
        let now = self.clock.now_unix();

        let (per_minute, per_day, events) = match &self.counter {
            Some(counter) => (
                counter.sliding_count(&subscription_minute_key(owner_id), now - MINUTE).await?.count,
                counter.sliding_count(&subscription_day_key(owner_id), now - DAY).await?.count,
                counter.sliding_count(&events_minute_key(owner_id), now - MINUTE).await?.count,
            ),
            None => (0, 0, 0),
        };

        Ok(rate_info(&quota, per_minute, per_day, events))
    }

    /// The owner's limits with nothing counted, for when the counter is unreachable.
    pub async fn unmetered_rate_info(&self, owner_id: Uuid) -> SubscriptionRateInfo {
        rate_info(&self.quota(owner_id).await, 0, 0, 0)
    }

    async fn check_window(
        &self,
        key: &str,
        now: i64,
        window: i64,
        limit: i32,
        label: &str,
    ) -> Result<(), QuotaExceeded> {
        let Some(counter) = &self.counter else {
            return Ok(());
        };
        let limit = limit.max(0) as u64;

        match counter.sliding_count(key, now - window).await {
            Ok(state) if state.count >= limit => {
                let retry = state
                    .oldest
                    .map(|oldest| (oldest + window - now).max(1) as u64)
                    .unwrap_or(window as u64);
                Err(QuotaExceeded {
                    message: format!("rate limit exceeded: {} {}", limit, label),
                    limit,
                    retry_after_secs: Some(retry),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!("Webhook rate check on {} failed, allowing: {}", key, e);
                Ok(())
            }
        }
    }

    async fn record(&self, key: &str, now: i64, ttl: Duration) {
        if let Some(counter) = &self.counter {
            if let Err(e) = counter.sliding_record(key, now, ttl).await {
                tracing::warn!("Failed to record webhook usage on {}: {}", key, e);
            }
        }
    }
}

fn rate_info(quota: &WebhookQuota, per_minute: u64, per_day: u64, events: u64) -> SubscriptionRateInfo {
    SubscriptionRateInfo {
        max_subscriptions: quota.max_subscriptions.max(0) as u64,
        requests_per_minute: WindowUsage::new(quota.max_subscription_requests_per_minute.max(0) as u64, per_minute),
        requests_per_day: WindowUsage::new(quota.max_subscription_requests_per_day.max(0) as u64, per_day),
        events_per_minute: WindowUsage::new(quota.max_events_per_minute.max(0) as u64, events),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::clock::ManualClock;
    use crate::quota::counter::MemoryRateCounter;
    use crate::quota::memory::InMemoryQuotaStore;

    fn limiter(clock: Arc<ManualClock>) -> (WebhookRateLimiter, Arc<QuotaCache>) {
        let quotas = Arc::new(QuotaCache::new(Duration::from_secs(60), Duration::from_secs(60)));
        let counter: Arc<dyn RateCounter> = Arc::new(MemoryRateCounter::new(clock.clone()));
        let store: Arc<dyn QuotaStore<WebhookQuota>> = Arc::new(InMemoryQuotaStore::new());
        (WebhookRateLimiter::new(Some(counter), quotas.clone(), store, clock), quotas)
    }

    #[tokio::test]
    async fn subscription_count_limit() {
        let (limiter, quotas) = limiter(Arc::new(ManualClock::new(1_000_000)));
        let owner = Uuid::new_v4();

        assert!(limiter.check_subscription_limit(owner, 9).await.is_ok());
        let err = limiter.check_subscription_limit(owner, 10).await.unwrap_err();

        assert_eq!(err.limit, 10);
        assert!(err.message.contains("10/10"));
        quotas.stop();
    }

    #[tokio::test]
    async fn subscription_requests_limited_per_minute() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (limiter, quotas) = limiter(clock.clone());
        let owner = Uuid::new_v4();

        for _ in 0..10 {
            assert!(limiter.check_subscription_request_limit(owner).await.is_ok());
            limiter.record_subscription_request(owner).await;
        }
        let err = limiter.check_subscription_request_limit(owner).await.unwrap_err();
        assert_eq!(err.retry_after_secs, Some(60));

        clock.advance(61);
        assert!(limiter.check_subscription_request_limit(owner).await.is_ok());
        quotas.stop();
    }

    #[tokio::test]
    async fn subscription_requests_limited_per_day() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (limiter, quotas) = limiter(clock.clone());
        let owner = Uuid::new_v4();

        for _ in 0..20 {
            limiter.record_subscription_request(owner).await;
            clock.advance(61);
        }

        let err = limiter.check_subscription_request_limit(owner).await.unwrap_err();
        assert!(err.message.contains("per day"));
        quotas.stop();
    }

    #[tokio::test]
    async fn event_publication_limit_and_info() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (limiter, quotas) = limiter(clock);
        let owner = Uuid::new_v4();

        for _ in 0..12 {
            limiter.record_event_publication(owner).await;
        }
        assert!(limiter.check_event_publication_limit(owner).await.is_err());

        let info = limiter.subscription_rate_info(owner).await.unwrap();
        assert_eq!(info.events_per_minute.used, 12);
        assert_eq!(info.events_per_minute.remaining, 0);
        assert_eq!(info.requests_per_day.remaining, 20);
        quotas.stop();
    }
}
