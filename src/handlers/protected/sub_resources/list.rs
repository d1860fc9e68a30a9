// handlers/protected/sub_resources/list.rs - GET /threat_models/:threat_model_id/:kind handler

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use super::{parse_id, parse_kind};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::SubResource;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubResourcePage {
    pub items: Vec<SubResource>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub async fn sub_resource_list(
    State(state): State<AppState>,
    Path((threat_model_id, kind)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> ApiResult<SubResourcePage> {
    let kind = parse_kind(&kind)?;
    let threat_model_id = parse_id("threat model id", &threat_model_id)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = params.offset.unwrap_or(0);
    if !(0..=MAX_LIMIT).contains(&limit) || offset < 0 {
        return Err(ApiError::bad_request(format!(
            "limit must be between 0 and {} and offset must not be negative",
            MAX_LIMIT
        )));
    }
    let (limit, offset) = (limit as usize, offset as usize);
    let parent = threat_model_id.to_string();

    match state
        .cache
        .get_list::<SubResourcePage>(kind.entity_type(), &parent, offset, limit)
        .await
    {
        Ok(Some(page)) => return Ok(ApiResponse::success(page)),
        Ok(None) => {}
        Err(e) => tracing::warn!("List cache read for {} failed: {}", kind, e),
    }

    let generation = state.cache.generation().await;
    let items = state.sub_resources.list(kind, threat_model_id, offset, limit).await?;
    let total = state.sub_resources.count(kind, threat_model_id).await?;
    let page = SubResourcePage {
        items,
        total,
        limit,
        offset,
    };

    if let Err(e) = state
        .cache
        .cache_list_if_current(kind.entity_type(), &parent, offset, limit, &page, generation)
        .await
    {
        tracing::warn!("List cache write for {} failed: {}", kind, e);
    }
    Ok(ApiResponse::success(page))
}
