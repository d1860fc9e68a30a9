// handlers/elevated/cache_stats.rs - Cache hit/miss statistics

use axum::extract::State;
use axum::Extension;

use super::require_admin;
use crate::cache::CacheStats;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /admin/cache/stats
pub async fn cache_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<CacheStats> {
    require_admin(&user)?;
    Ok(ApiResponse::success(state.cache.metrics().snapshot()))
}

/// DELETE /admin/cache/stats
pub async fn cache_stats_reset(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<()> {
    require_admin(&user)?;
    state.cache.metrics().reset();
    Ok(ApiResponse::no_content())
}
