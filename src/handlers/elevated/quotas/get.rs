// handlers/elevated/quotas/get.rs - GET /admin/quotas/:kind/:owner_id handler

use axum::extract::{Path, State};
use axum::Extension;

use super::{parse_owner_id, require_admin, AdminQuota};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// Stored quota, or the defaults when none has been set.
pub async fn quota_get<U: AdminQuota>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(owner_id): Path<String>,
) -> ApiResult<U::Quota> {
    require_admin(&user)?;
    let owner_id = parse_owner_id(&owner_id)?;

    let quota = U::store(&state).get_or_default(owner_id).await;
    Ok(ApiResponse::success(quota))
}
