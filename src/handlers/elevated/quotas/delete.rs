// handlers/elevated/quotas/delete.rs - DELETE /admin/quotas/:kind/:owner_id handler

use axum::extract::{Path, State};
use axum::Extension;

use super::{parse_owner_id, require_admin, AdminQuota};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// Remove a stored quota; the owner falls back to the defaults.
pub async fn quota_delete<U: AdminQuota>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(owner_id): Path<String>,
) -> ApiResult<()> {
    require_admin(&user)?;
    let owner_id = parse_owner_id(&owner_id)?;

    U::store(&state).delete(owner_id).await?;
    U::invalidate(&state, owner_id);

    tracing::info!(user_id = %user.user_id, "Deleted quota for owner {}", owner_id);
    Ok(ApiResponse::no_content())
}
