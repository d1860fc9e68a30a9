// handlers/protected/sub_resources/update.rs - PUT /threat_models/:threat_model_id/:kind/:id handler

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{Map, Value};

use super::{invalidate_after_write, parse_id, parse_kind};
use crate::cache::OperationType;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::SubResource;

pub async fn sub_resource_update(
    State(state): State<AppState>,
    Path((threat_model_id, kind, id)): Path<(String, String, String)>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<SubResource> {
    let kind = parse_kind(&kind)?;
    let threat_model_id = parse_id("threat model id", &threat_model_id)?;
    let id = parse_id("id", &id)?;
    let Json(data) = body.map_err(|e| ApiError::invalid_json(e.body_text()))?;

    let item = state.sub_resources.update(kind, threat_model_id, id, data).await?;
    invalidate_after_write(&state, kind, threat_model_id, id, OperationType::Update).await;

    Ok(ApiResponse::success(item))
}
