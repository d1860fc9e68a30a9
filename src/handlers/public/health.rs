// handlers/public/health.rs - GET /health handler

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let database = match &state.database {
        Some(db) => match db.health_check().await {
            Ok(()) => Ok("ok"),
            Err(e) => Err(e.to_string()),
        },
        None => Ok("not configured"),
    };
    let cache = state.cache_backend.ping().await.map_err(|e| e.to_string());

    match (&database, &cache) {
        (Ok(db_status), Ok(())) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": db_status,
                    "cache": state.cache_backend.name()
                }
            })),
        ),
        _ => {
            tracing::warn!("Health check degraded: database={:?} cache={:?}", database, cache);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "dependency unavailable",
                    "code": "service_unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database_error": database.as_ref().err(),
                        "cache_error": cache.as_ref().err()
                    }
                })),
            )
        }
    }
}
