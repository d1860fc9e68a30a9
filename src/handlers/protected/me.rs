// handlers/protected/me.rs - GET /me/rate_limits handler

use axum::extract::State;
use axum::Extension;
use serde::Serialize;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::quota::{AddonUsage, CounterError, RateLimitInfo, SubscriptionRateInfo};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RateLimitSummary {
    pub api: RateLimitInfo,
    pub webhooks: SubscriptionRateInfo,
    pub addons: AddonUsage,
}

/// Caller's current standing against all three quota kinds.
///
/// A counter outage degrades to reporting limits with nothing used.
pub async fn my_rate_limits(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<RateLimitSummary> {
    let degraded = |what: &str, e: CounterError| {
        tracing::warn!(user_id = %user.user_id, "{} usage unavailable, reporting limits only: {}", what, e);
    };

    let api = match state.api_rate_limiter.rate_limit_info(user.user_id).await {
        Ok(info) => info,
        Err(e) => {
            degraded("API", e);
            state.api_rate_limiter.fallback_info()
        }
    };
    let webhooks = match state.webhook_rate_limiter.subscription_rate_info(user.user_id).await {
        Ok(info) => info,
        Err(e) => {
            degraded("Webhook", e);
            state.webhook_rate_limiter.unmetered_rate_info(user.user_id).await
        }
    };
    let addons = match state.addon_rate_limiter.usage(user.user_id).await {
        Ok(usage) => usage,
        Err(e) => {
            degraded("Add-on", e);
            state.addon_rate_limiter.unmetered_usage(user.user_id).await
        }
    };

    Ok(ApiResponse::success(RateLimitSummary { api, webhooks, addons }))
}
