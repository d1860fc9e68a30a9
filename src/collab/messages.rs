// collab/messages.rs - Collaboration wire format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound message types understood by the standard registry.
pub const PRESENTER_REQUEST: &str = "presenter_request";
pub const CHANGE_PRESENTER_REQUEST: &str = "change_presenter_request";
pub const REMOVE_PARTICIPANT_REQUEST: &str = "remove_participant_request";
pub const PRESENTER_DENIED_REQUEST: &str = "presenter_denied_request";
pub const PRESENTER_CURSOR: &str = "presenter_cursor";
pub const PRESENTER_SELECTION: &str = "presenter_selection";

/// Identity of a collaborator as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Writer,
    Reader,
}

/// Only the type tag; the payload is decoded by the registered handler.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub message_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePresenterRequest {
    pub new_presenter: User,
}

#[derive(Debug, Deserialize)]
pub struct RemoveParticipantRequest {
    pub removed_user: User,
}

#[derive(Debug, Deserialize)]
pub struct PresenterDeniedRequest {
    pub denied_user: User,
}

#[derive(Debug, Deserialize)]
pub struct PresenterCursor {
    pub cursor_position: CursorPosition,
}

#[derive(Debug, Deserialize)]
pub struct PresenterSelection {
    pub selected_cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user: User,
    pub permissions: ParticipantRole,
    pub last_activity: DateTime<Utc>,
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum OutboundMessage {
    PresenterRequestEvent {
        requesting_user: User,
    },
    PresenterDeniedEvent {
        denied_user: User,
    },
    ChangePresenter {
        initiating_user: User,
        new_presenter: User,
    },
    RemoveParticipant {
        removed_user: User,
    },
    ParticipantsUpdate {
        participants: Vec<ParticipantInfo>,
        host: Option<User>,
        current_presenter: Option<User>,
    },
    PresenterCursor {
        user: User,
        cursor_position: CursorPosition,
    },
    PresenterSelection {
        user: User,
        selected_cells: Vec<String>,
    },
    Error {
        error: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            error: error.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            OutboundMessage::PresenterRequestEvent { .. } => "presenter_request_event",
            OutboundMessage::PresenterDeniedEvent { .. } => "presenter_denied_event",
            OutboundMessage::ChangePresenter { .. } => "change_presenter",
            OutboundMessage::RemoveParticipant { .. } => "remove_participant",
            OutboundMessage::ParticipantsUpdate { .. } => "participants_update",
            OutboundMessage::PresenterCursor { .. } => PRESENTER_CURSOR,
            OutboundMessage::PresenterSelection { .. } => PRESENTER_SELECTION,
            OutboundMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_messages_are_tagged() {
        let user = User {
            user_id: "u1".into(),
            display_name: "Alice".into(),
            email: "alice@example.com".into(),
        };
        let value = serde_json::to_value(OutboundMessage::PresenterDeniedEvent { denied_user: user }).unwrap();

        assert_eq!(value["message_type"], "presenter_denied_event");
        assert_eq!(value["denied_user"]["user_id"], "u1");
    }

    #[test]
    fn message_type_matches_serialized_tag() {
        let message = OutboundMessage::error("invalid_request", "nope");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["message_type"], message.message_type());
    }

    #[test]
    fn inbound_payloads_decode() {
        let raw = json!({
            "message_type": "presenter_cursor",
            "cursor_position": {"x": 1.5, "y": -2.0}
        });

        let envelope: Envelope = serde_json::from_value(raw.clone()).unwrap();
        let cursor: PresenterCursor = serde_json::from_value(raw).unwrap();

        assert_eq!(envelope.message_type, PRESENTER_CURSOR);
        assert_eq!(cursor.cursor_position, CursorPosition { x: 1.5, y: -2.0 });
    }

    #[test]
    fn user_display_fields_are_optional() {
        let user: User = serde_json::from_value(json!({"user_id": "u2"})).unwrap();
        assert_eq!(user.display_name, "");
    }
}
