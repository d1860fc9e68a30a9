// handlers/elevated/quotas/list.rs - GET /admin/quotas/:kind handler

use axum::extract::{Query, State};
use axum::Extension;
use serde::{Deserialize, Serialize};

use super::{require_admin, AdminQuota};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QuotaPage<Q> {
    pub quotas: Vec<Q>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub async fn quota_list<U: AdminQuota>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> ApiResult<QuotaPage<U::Quota>> {
    require_admin(&user)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = params.offset.unwrap_or(0);
    if limit < 0 {
        return Err(ApiError::bad_request("limit must not be negative"));
    }
    if offset < 0 {
        return Err(ApiError::bad_request("offset must not be negative"));
    }
    let (limit, offset) = (limit as usize, offset as usize);

    let store = U::store(&state);
    let quotas = store.list(offset, limit).await?;
    let total = store.count().await?;

    Ok(ApiResponse::success(QuotaPage {
        quotas,
        total,
        limit,
        offset,
    }))
}
