// handlers/protected/collaboration.rs - Diagram collaboration endpoints

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Extension;

use crate::collab::{connection, ParticipantRole, SessionSnapshot, User};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /threat_models/:threat_model_id/diagrams/:diagram_id/ws
pub async fn diagram_ws(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let threat_model_id = uuid::Uuid::parse_str(&threat_model_id)
        .map_err(|_| ApiError::bad_request(format!("Invalid threat model id '{}'", threat_model_id)))?;
    let diagram_id = uuid::Uuid::parse_str(&diagram_id)
        .map_err(|_| ApiError::bad_request(format!("Invalid diagram id '{}'", diagram_id)))?;

    // Administrators get owner-level control in every session
    let role = if user.is_admin {
        ParticipantRole::Owner
    } else {
        ParticipantRole::Writer
    };
    let participant = User {
        user_id: user.user_id.to_string(),
        display_name: user.name,
        email: user.email,
    };

    let hub = state.sessions.clone();
    let max_message_size = hub.settings().max_message_size;

    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| connection::serve(socket, hub, threat_model_id, diagram_id, participant, role)))
}

/// GET /collaboration/sessions
///
/// Administrators see every session; other callers only the ones they are in.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<SessionSnapshot>> {
    let sessions = if user.is_admin {
        state.sessions.active_sessions().await
    } else {
        state.sessions.active_sessions_for(&user.user_id.to_string()).await
    };
    Ok(ApiResponse::success(sessions))
}
