// handlers/public/root.rs - GET / handler

use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult};

pub async fn root() -> ApiResult<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Ok(ApiResponse::success(json!({
        "name": "TMI API (Rust)",
        "version": version,
        "description": "Collaborative threat modeling API",
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "sub_resources": "/threat_models/:threat_model_id/{threats,documents,sources,notes,assets}[/:id] (protected)",
            "collaboration": "/threat_models/:threat_model_id/diagrams/:diagram_id/ws, /collaboration/sessions (protected)",
            "rate_limits": "/me/rate_limits (protected)",
            "quotas": "/admin/quotas/{users,webhooks,addons}[/:owner_id] (administrators)",
        }
    })))
}
