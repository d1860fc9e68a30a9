// collab/error.rs - Collaboration session errors

use thiserror::Error;

use super::client::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("user {0} has been removed from this session")]
    Denied(String),

    #[error("connection {0} is not part of this session")]
    NotConnected(ConnectionId),

    #[error("malformed message: {0}")]
    InvalidMessage(String),

    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("handler for '{message_type}' panicked: {detail}")]
    HandlerPanicked { message_type: String, detail: String },

    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Wire `error` code sent back to the offending client, if any.
    pub fn client_error_code(&self) -> Option<&'static str> {
        match self {
            SessionError::InvalidMessage(_) => Some("invalid_message"),
            SessionError::InvalidRequest(_) => Some("invalid_request"),
            SessionError::Unauthorized(_) => Some("unauthorized"),
            _ => None,
        }
    }
}
