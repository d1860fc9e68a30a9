// collab/registry.rs - Message type to handler dispatch table

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::client::ConnectionId;
use super::error::SessionError;
use super::messages::{
    CHANGE_PRESENTER_REQUEST, PRESENTER_CURSOR, PRESENTER_DENIED_REQUEST, PRESENTER_REQUEST,
    PRESENTER_SELECTION, REMOVE_PARTICIPANT_REQUEST,
};
use super::state::SessionState;

pub type MessageHandler = fn(&mut SessionState, ConnectionId, &Value) -> Result<(), SessionError>;

/// Shared registry with the six presenter message types.
pub static STANDARD_REGISTRY: Lazy<Arc<MessageRegistry>> = Lazy::new(|| Arc::new(MessageRegistry::standard()));

#[derive(Clone, Default)]
pub struct MessageRegistry {
    handlers: HashMap<&'static str, MessageHandler>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(PRESENTER_REQUEST, SessionState::process_presenter_request);
        registry.register(CHANGE_PRESENTER_REQUEST, SessionState::process_change_presenter);
        registry.register(REMOVE_PARTICIPANT_REQUEST, SessionState::process_remove_participant);
        registry.register(PRESENTER_DENIED_REQUEST, SessionState::process_presenter_denied);
        registry.register(PRESENTER_CURSOR, SessionState::process_presenter_cursor);
        registry.register(PRESENTER_SELECTION, SessionState::process_presenter_selection);
        registry
    }

    /// Add or replace the handler for a message type.
    pub fn register(&mut self, message_type: &'static str, handler: MessageHandler) {
        self.handlers.insert(message_type, handler);
    }

    pub fn get(&self, message_type: &str) -> Option<MessageHandler> {
        self.handlers.get(message_type).copied()
    }

    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}
