// handlers/protected/sub_resources/delete.rs - DELETE /threat_models/:threat_model_id/:kind/:id handler

use axum::extract::{Path, State};

use super::{invalidate_after_write, parse_id, parse_kind};
use crate::cache::OperationType;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

pub async fn sub_resource_delete(
    State(state): State<AppState>,
    Path((threat_model_id, kind, id)): Path<(String, String, String)>,
) -> ApiResult<()> {
    let kind = parse_kind(&kind)?;
    let threat_model_id = parse_id("threat model id", &threat_model_id)?;
    let id = parse_id("id", &id)?;

    state.sub_resources.delete(kind, threat_model_id, id).await?;
    invalidate_after_write(&state, kind, threat_model_id, id, OperationType::Delete).await;

    Ok(ApiResponse::no_content())
}
