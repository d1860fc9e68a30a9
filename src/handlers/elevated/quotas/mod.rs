// handlers/elevated/quotas/mod.rs - Administrator quota management
//
// One generic set of handlers serves all three quota kinds; the route table
// picks the kind by instantiating them with the kind's update body type.

mod delete;
mod get;
mod list;
mod put;

pub use delete::quota_delete;
pub use get::quota_get;
pub use list::quota_list;
pub use put::quota_put;

use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::quota::{
    AddonInvocationQuotaUpdate, QuotaStore, QuotaUpdate, UserApiQuotaUpdate, WebhookQuotaUpdate,
};
use crate::state::AppState;

pub(crate) use super::require_admin;

/// Wires a quota kind to its store and its cache entry.
pub trait AdminQuota: QuotaUpdate + Sync + 'static {
    fn store(state: &AppState) -> Arc<dyn QuotaStore<Self::Quota>>;

    fn invalidate(state: &AppState, owner_id: Uuid);
}

impl AdminQuota for UserApiQuotaUpdate {
    fn store(state: &AppState) -> Arc<dyn QuotaStore<Self::Quota>> {
        state.user_api_quotas.clone()
    }

    fn invalidate(state: &AppState, owner_id: Uuid) {
        state.quota_cache.invalidate_user_api_quota(owner_id);
    }
}

impl AdminQuota for WebhookQuotaUpdate {
    fn store(state: &AppState) -> Arc<dyn QuotaStore<Self::Quota>> {
        state.webhook_quotas.clone()
    }

    fn invalidate(state: &AppState, owner_id: Uuid) {
        state.quota_cache.invalidate_webhook_quota(owner_id);
    }
}

impl AdminQuota for AddonInvocationQuotaUpdate {
    fn store(state: &AppState) -> Arc<dyn QuotaStore<Self::Quota>> {
        state.addon_quotas.clone()
    }

    fn invalidate(state: &AppState, owner_id: Uuid) {
        state.quota_cache.invalidate_addon_invocation_quota(owner_id);
    }
}

pub(crate) fn parse_owner_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid owner id '{}'", raw)))
}
