// handlers/elevated/quotas/put.rs - PUT /admin/quotas/:kind/:owner_id handler

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};

use super::{parse_owner_id, require_admin, AdminQuota};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::quota::{QuotaRecord, QuotaStoreError};
use crate::state::AppState;

/// Create (201) or replace (200) an owner's quota.
///
/// The cache entry is dropped before responding so the next admission
/// check sees the new limits.
pub async fn quota_put<U: AdminQuota>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(owner_id): Path<String>,
    body: Result<Json<U>, JsonRejection>,
) -> ApiResult<U::Quota> {
    require_admin(&user)?;
    let owner_id = parse_owner_id(&owner_id)?;
    let Json(update) = body.map_err(|e| ApiError::invalid_json(e.body_text()))?;

    update.validate()?;
    let quota = update.into_quota(owner_id);
    let store = U::store(&state);

    let response = match store.get(owner_id).await {
        Ok(_) => ApiResponse::success(store.update(quota).await?),
        Err(e) if e.is_not_found() => match store.create(quota.clone()).await {
            Ok(created) => ApiResponse::created(created),
            // Lost a race with a concurrent create
            Err(QuotaStoreError::AlreadyExists { .. }) => ApiResponse::success(store.update(quota).await?),
            Err(e) => return Err(e.into()),
        },
        Err(e) => return Err(e.into()),
    };

    U::invalidate(&state, owner_id);
    tracing::info!(
        user_id = %user.user_id,
        "Set {} for owner {}",
        <U::Quota as QuotaRecord>::KIND,
        owner_id
    );
    Ok(response)
}
