// quota/rate_limit.rs - Per-user API request admission

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::cache::QuotaCache;
use super::clock::Clock;
use super::counter::{CounterError, RateCounter};
use super::store::QuotaStore;
use super::types::{UserApiQuota, DEFAULT_MAX_REQUESTS_PER_MINUTE};

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;

/// Admission result for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until the rejecting window ends; zero when allowed.
    pub retry_after_secs: u64,
    /// Limit of the window that decided the outcome.
    pub limit: u64,
}

impl RateLimitDecision {
    fn allow(limit: u64) -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
            limit,
        }
    }
}

/// Values for the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: i64,
}

/// A quota check that rejected the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QuotaExceeded {
    pub message: String,
    pub limit: u64,
    pub retry_after_secs: Option<u64>,
}

/// Fixed-window limiter for authenticated API traffic.
///
/// Counting failures fail open: the request is admitted and the error logged.
pub struct ApiRateLimiter {
    counter: Option<Arc<dyn RateCounter>>,
    quotas: Arc<QuotaCache>,
    store: Arc<dyn QuotaStore<UserApiQuota>>,
    clock: Arc<dyn Clock>,
}

impl ApiRateLimiter {
    pub fn new(
        counter: Option<Arc<dyn RateCounter>>,
        quotas: Arc<QuotaCache>,
        store: Arc<dyn QuotaStore<UserApiQuota>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            counter,
            quotas,
            store,
            clock,
        }
    }

    pub async fn check_rate_limit(&self, user_id: Uuid) -> RateLimitDecision {
        let quota = self.quotas.get_user_api_quota(user_id, self.store.as_ref()).await;
        let per_minute = quota.max_requests_per_minute.max(0) as u64;

        let Some(counter) = &self.counter else {
            return RateLimitDecision::allow(per_minute);
        };

        match self.count_request(counter.as_ref(), user_id, &quota).await {
            Ok(decision) => {
                if !decision.allowed {
                    tracing::info!(
                        "Rate limit exceeded for user {} (limit {}, retry after {}s)",
                        user_id,
                        decision.limit,
                        decision.retry_after_secs
                    );
                }
                decision
            }
            Err(e) => {
                tracing::error!("Rate limit check failed for user {}, allowing request: {}", user_id, e);
                RateLimitDecision::allow(per_minute)
            }
        }
    }

    async fn count_request(
        &self,
        counter: &dyn RateCounter,
        user_id: Uuid,
        quota: &UserApiQuota,
    ) -> Result<RateLimitDecision, CounterError> {
        let now = self.clock.now_unix();
        let per_minute = quota.max_requests_per_minute.max(0) as u64;

        let minute_key = window_key(user_id, "minute", now, MINUTE);
        let used = counter.increment(&minute_key, window_ttl(MINUTE)).await?;
        if used > per_minute {
            return Ok(RateLimitDecision {
                allowed: false,
                retry_after_secs: seconds_until_window_end(now, MINUTE),
                limit: per_minute,
            });
        }

        if let Some(per_hour) = quota.max_requests_per_hour {
            let per_hour = per_hour.max(0) as u64;
            let hour_key = window_key(user_id, "hour", now, HOUR);
            let used = counter.increment(&hour_key, window_ttl(HOUR)).await?;
            if used > per_hour {
                return Ok(RateLimitDecision {
                    allowed: false,
                    retry_after_secs: seconds_until_window_end(now, HOUR),
                    limit: per_hour,
                });
            }
        }

        Ok(RateLimitDecision::allow(per_minute))
    }

    /// Per-minute header values. Without a counter the full limit is reported.
    pub async fn rate_limit_info(&self, user_id: Uuid) -> Result<RateLimitInfo, CounterError> {
        let quota = self.quotas.get_user_api_quota(user_id, self.store.as_ref()).await;
        let limit = quota.max_requests_per_minute.max(0) as u64;
        let now = self.clock.now_unix();

        let Some(counter) = &self.counter else {
            return Ok(RateLimitInfo {
                limit,
                remaining: limit,
                reset_at: now + MINUTE,
            });
        };

        let used = counter.current(&window_key(user_id, "minute", now, MINUTE)).await?;
        Ok(RateLimitInfo {
            limit,
            remaining: limit.saturating_sub(used),
            reset_at: window_start(now, MINUTE) + MINUTE,
        })
    }

    /// Header values reported when the counter cannot be read: the system
    /// default limit with nothing used in the current window.
    pub fn fallback_info(&self) -> RateLimitInfo {
        let limit = DEFAULT_MAX_REQUESTS_PER_MINUTE.max(0) as u64;
        RateLimitInfo {
            limit,
            remaining: limit,
            reset_at: window_start(self.clock.now_unix(), MINUTE) + MINUTE,
        }
    }
}

fn window_start(now: i64, window: i64) -> i64 {
    now - now.rem_euclid(window)
}

fn window_key(user_id: Uuid, name: &str, now: i64, window: i64) -> String {
    format!("ratelimit:api:{}:{}:{}", user_id, name, now.div_euclid(window))
}

fn seconds_until_window_end(now: i64, window: i64) -> u64 {
    (window_start(now, window) + window - now).max(1) as u64
}

// Keep counters slightly past their window so late reads still see them
fn window_ttl(window: i64) -> Duration {
    Duration::from_secs((window + MINUTE) as u64)
}
