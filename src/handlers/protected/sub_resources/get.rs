// handlers/protected/sub_resources/get.rs - GET /threat_models/:threat_model_id/:kind/:id handler

use axum::extract::{Path, State};

use super::{parse_id, parse_kind};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::SubResource;

pub async fn sub_resource_get(
    State(state): State<AppState>,
    Path((threat_model_id, kind, id)): Path<(String, String, String)>,
) -> ApiResult<SubResource> {
    let kind = parse_kind(&kind)?;
    let threat_model_id = parse_id("threat model id", &threat_model_id)?;
    let id = parse_id("id", &id)?;
    let key_id = id.to_string();

    match state.cache.get_entity::<SubResource>(kind.entity_type(), &key_id).await {
        // Entity keys are not scoped by parent
        Ok(Some(item)) if item.threat_model_id == threat_model_id => return Ok(ApiResponse::success(item)),
        Ok(_) => {}
        Err(e) => tracing::warn!(key = %key_id, "Entity cache read failed: {}", e),
    }

    let generation = state.cache.generation().await;
    let item = state.sub_resources.get(kind, threat_model_id, id).await?;
    if let Err(e) = state
        .cache
        .cache_entity_if_current(kind.entity_type(), &key_id, &item, generation)
        .await
    {
        tracing::warn!(key = %key_id, "Entity cache write failed: {}", e);
    }
    Ok(ApiResponse::success(item))
}
