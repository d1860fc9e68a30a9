// handlers/protected/sub_resources/mod.rs - Threat model child collections
//
// Reads are served through the distributed cache; every successful write
// clears the affected keys before the response goes out.

mod create;
mod delete;
mod get;
mod list;
mod update;

pub use create::sub_resource_create;
pub use delete::sub_resource_delete;
pub use get::sub_resource_get;
pub use list::sub_resource_list;
pub use update::sub_resource_update;

use uuid::Uuid;

use crate::cache::{EntityType, InvalidationEvent, OperationType};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::SubResourceKind;

pub(crate) fn parse_kind(raw: &str) -> Result<SubResourceKind, ApiError> {
    raw.parse().map_err(ApiError::not_found)
}

pub(crate) fn parse_id(name: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {} '{}'", name, raw)))
}

/// Clear everything the write made stale, bounded by the configured timeout.
pub(crate) async fn invalidate_after_write(
    state: &AppState,
    kind: SubResourceKind,
    threat_model_id: Uuid,
    id: Uuid,
    operation: OperationType,
) {
    let event = InvalidationEvent::new(kind.entity_type(), id.to_string(), operation)
        .with_parent(EntityType::ThreatModel, threat_model_id.to_string());
    state
        .invalidator
        .invalidate_best_effort(&event, state.config.cache.invalidation_timeout())
        .await;
}
