// handlers/elevated/mod.rs - Administrator handlers
//
// Security Level: JWT Authentication Required + administrator flag
// Middleware: same stack as protected routes; each handler checks the flag

pub mod cache_stats;
pub mod quotas;

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub(crate) fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if user.is_admin {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.user_id, "Non-administrator attempted an administrator operation");
        Err(ApiError::forbidden("Administrator privileges required"))
    }
}
