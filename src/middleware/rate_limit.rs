use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Paths that never count against a user's quota
const PUBLIC_PATHS: &[&str] = &["/", "/health"];

/// Per-user API rate limiting. Runs after authentication; anonymous
/// requests pass straight through.
pub async fn rate_limit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.api.enable_rate_limiting || PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }
    let Some(user_id) = request.extensions().get::<AuthUser>().map(|u| u.user_id) else {
        return next.run(request).await;
    };

    let decision = state.api_rate_limiter.check_rate_limit(user_id).await;
    if !decision.allowed {
        tracing::warn!(user_id = %user_id, "Rate limit exceeded, retry in {}s", decision.retry_after_secs);
        let mut response = ApiError::too_many_requests(
            format!("Rate limit exceeded: {} requests allowed in this window", decision.limit),
            Some(decision.retry_after_secs),
        )
        .into_response();
        let headers = response.headers_mut();
        insert(headers, LIMIT_HEADER, decision.limit);
        insert(headers, REMAINING_HEADER, 0);
        return response;
    }

    let mut response = next.run(request).await;

    let info = match state.api_rate_limiter.rate_limit_info(user_id).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(user_id = %user_id, "Rate limit info unavailable, reporting defaults: {}", e);
            state.api_rate_limiter.fallback_info()
        }
    };
    let headers = response.headers_mut();
    insert(headers, LIMIT_HEADER, info.limit);
    insert(headers, REMAINING_HEADER, info.remaining);
    insert(headers, RESET_HEADER, info.reset_at);
    response
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}
