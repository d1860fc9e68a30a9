// collab/state.rs - Presenter state machine for one diagram
//
// Owned exclusively by the session actor; every mutation arrives through
// `join`, `leave` or `handle_message` in the order the actor received it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::client::{ClientFrame, ClientHandle, ConnectionId};
use super::error::SessionError;
use super::messages::{
    ChangePresenterRequest, Envelope, OutboundMessage, ParticipantInfo, ParticipantRole, PresenterCursor,
    PresenterDeniedRequest, PresenterSelection, RemoveParticipantRequest, User,
};
use super::registry::MessageRegistry;

#[derive(Debug)]
pub struct Participant {
    pub client: ClientHandle,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_cursor: Option<super::messages::CursorPosition>,
    pub last_selection: Option<Vec<String>>,
}

impl Participant {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            user: self.client.user.clone(),
            permissions: self.client.role,
            last_activity: self.last_activity,
        }
    }
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub threat_model_id: Uuid,
    pub diagram_id: Uuid,
    pub host: Option<User>,
    pub current_presenter: Option<User>,
    pub participants: Vec<ParticipantInfo>,
}

pub struct SessionState {
    session_id: Uuid,
    threat_model_id: Uuid,
    diagram_id: Uuid,
    host: Option<User>,
    /// User id of the presenter; at most one at any time.
    presenter: Option<String>,
    /// Keyed by connection id, which increases with join order.
    participants: BTreeMap<ConnectionId, Participant>,
    denied_users: HashSet<String>,
    pending_requests: BTreeSet<String>,
    registry: Arc<MessageRegistry>,
    dead: Vec<ConnectionId>,
    last_activity: Instant,
}

impl SessionState {
    pub fn new(threat_model_id: Uuid, diagram_id: Uuid, registry: Arc<MessageRegistry>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            threat_model_id,
            diagram_id,
            host: None,
            presenter: None,
            participants: BTreeMap::new(),
            denied_users: HashSet::new(),
            pending_requests: BTreeSet::new(),
            registry,
            dead: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn diagram_id(&self) -> Uuid {
        self.diagram_id
    }

    pub fn host(&self) -> Option<&User> {
        self.host.as_ref()
    }

    pub fn presenter(&self) -> Option<&str> {
        self.presenter.as_deref()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_denied(&self, user_id: &str) -> bool {
        self.denied_users.contains(user_id)
    }

    pub fn has_pending_request(&self, user_id: &str) -> bool {
        self.pending_requests.contains(user_id)
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants.get(&connection_id)
    }

    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.participants.values().any(|p| p.client.user_id() == user_id)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            threat_model_id: self.threat_model_id,
            diagram_id: self.diagram_id,
            host: self.host.clone(),
            current_presenter: self.presenter_user(),
            participants: self.participants.values().map(Participant::info).collect(),
        }
    }

    /// Attach a connection. Users on the deny list are rejected.
    pub fn join(&mut self, client: ClientHandle) -> Result<(), SessionError> {
        if self.is_denied(client.user_id()) {
            return Err(SessionError::Denied(client.user_id().to_string()));
        }

        if self.host.is_none() {
            self.host = Some(client.user.clone());
        }

        tracing::info!(
            session_id = %self.session_id,
            user_id = %client.user_id(),
            "Client joined diagram {}",
            self.diagram_id
        );

        let now = Utc::now();
        self.participants.insert(
            client.connection_id,
            Participant {
                client,
                joined_at: now,
                last_activity: now,
                last_cursor: None,
                last_selection: None,
            },
        );
        self.last_activity = Instant::now();
        self.broadcast_participants();
        Ok(())
    }

    /// Detach a connection. Returns the removed participant.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let participant = self.participants.remove(&connection_id)?;
        let user_id = participant.client.user_id().to_string();
        self.forget_if_gone(&user_id);

        tracing::info!(session_id = %self.session_id, user_id = %user_id, "Client left diagram {}", self.diagram_id);

        if !self.is_empty() {
            self.broadcast_participants();
        }
        Some(participant)
    }

    /// Single entry point for client messages.
    ///
    /// Decodes the envelope, looks the type up in the registry and runs the
    /// handler behind a panic barrier. Client-facing failures are also sent
    /// back to the originating connection as an `error` message.
    pub fn handle_message(&mut self, connection_id: ConnectionId, raw: &str) -> Result<(), SessionError> {
        let Some(participant) = self.participants.get_mut(&connection_id) else {
            return Err(SessionError::NotConnected(connection_id));
        };
        participant.last_activity = Utc::now();
        let user_id = participant.client.user_id().to_string();
        self.last_activity = Instant::now();

        let result = self.dispatch(connection_id, &user_id, raw);

        if let Err(e) = &result {
            if let Some(code) = e.client_error_code() {
                self.send_to(connection_id, &OutboundMessage::error(code, e.to_string()));
            }
        }
        result
    }

    fn dispatch(&mut self, connection_id: ConnectionId, user_id: &str, raw: &str) -> Result<(), SessionError> {
        let payload: Value = serde_json::from_str(raw).map_err(|e| SessionError::InvalidMessage(e.to_string()))?;
        let envelope: Envelope =
            serde_json::from_value(payload.clone()).map_err(|e| SessionError::InvalidMessage(e.to_string()))?;

        let Some(handler) = self.registry.get(&envelope.message_type) else {
            tracing::warn!(
                session_id = %self.session_id,
                user_id = %user_id,
                "Dropping unknown message type '{}'",
                envelope.message_type
            );
            return Err(SessionError::UnknownMessageType(envelope.message_type));
        };

        match catch_unwind(AssertUnwindSafe(|| handler(self, connection_id, &payload))) {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                tracing::error!(
                    session_id = %self.session_id,
                    user_id = %user_id,
                    "Recovered panic while handling '{}': {}",
                    envelope.message_type,
                    detail
                );
                Err(SessionError::HandlerPanicked {
                    message_type: envelope.message_type,
                    detail,
                })
            }
        }
    }

    pub(crate) fn process_presenter_request(&mut self, connection_id: ConnectionId, _payload: &Value) -> Result<(), SessionError> {
        let requester = self.user_of(connection_id)?;

        match self.presenter.clone() {
            None => {
                self.presenter = Some(requester.user_id.clone());
                self.pending_requests.remove(&requester.user_id);
                tracing::info!(session_id = %self.session_id, user_id = %requester.user_id, "Presenter assigned");
                self.broadcast(
                    &OutboundMessage::ChangePresenter {
                        initiating_user: requester.clone(),
                        new_presenter: requester,
                    },
                    None,
                );
                self.broadcast_participants();
            }
            Some(current) if current == requester.user_id => {
                tracing::debug!(session_id = %self.session_id, "User {} is already presenting", current);
            }
            Some(current) => {
                self.pending_requests.insert(requester.user_id.clone());
                self.send_to_user(&current, &OutboundMessage::PresenterRequestEvent { requesting_user: requester });
            }
        }
        Ok(())
    }

    pub(crate) fn process_change_presenter(&mut self, connection_id: ConnectionId, payload: &Value) -> Result<(), SessionError> {
        let request: ChangePresenterRequest = decode(payload)?;
        let requester = self.user_of(connection_id)?;

        if !self.is_presenter(&requester.user_id) && !self.can_manage(connection_id) {
            return Err(SessionError::Unauthorized(
                "only the current presenter or the host can change the presenter".to_string(),
            ));
        }

        let target_id = request.new_presenter.user_id;
        let Some(target) = self.connected_user(&target_id) else {
            return Err(SessionError::InvalidRequest(format!("user {} is not connected", target_id)));
        };

        if self.is_presenter(&target_id) {
            return Ok(());
        }

        self.presenter = Some(target_id.clone());
        self.pending_requests.remove(&target_id);
        tracing::info!(
            session_id = %self.session_id,
            user_id = %requester.user_id,
            "Presenter changed to {}",
            target_id
        );

        self.broadcast(
            &OutboundMessage::ChangePresenter {
                initiating_user: requester,
                new_presenter: target,
            },
            None,
        );
        self.broadcast_participants();
        Ok(())
    }

    pub(crate) fn process_presenter_denied(&mut self, connection_id: ConnectionId, payload: &Value) -> Result<(), SessionError> {
        let request: PresenterDeniedRequest = decode(payload)?;
        let requester = self.user_of(connection_id)?;

        if !self.is_presenter(&requester.user_id) && !self.can_manage(connection_id) {
            return Err(SessionError::Unauthorized(
                "only the current presenter can deny presenter requests".to_string(),
            ));
        }

        let target_id = request.denied_user.user_id;
        let Some(target) = self.connected_user(&target_id) else {
            return Err(SessionError::InvalidRequest(format!("user {} is not connected", target_id)));
        };

        self.pending_requests.remove(&target_id);
        self.send_to_user(&target_id, &OutboundMessage::PresenterDeniedEvent { denied_user: target });
        Ok(())
    }

    pub(crate) fn process_remove_participant(&mut self, connection_id: ConnectionId, payload: &Value) -> Result<(), SessionError> {
        let request: RemoveParticipantRequest = decode(payload)?;
        let requester = self.user_of(connection_id)?;

        if !self.is_presenter(&requester.user_id) && !self.can_manage(connection_id) {
            return Err(SessionError::Unauthorized(
                "only the presenter or the host can remove participants".to_string(),
            ));
        }

        let target_id = request.removed_user.user_id;
        if target_id == requester.user_id {
            return Err(SessionError::InvalidRequest("cannot remove yourself from the session".to_string()));
        }
        if self.host.as_ref().map(|h| h.user_id == target_id).unwrap_or(false) {
            return Err(SessionError::InvalidRequest("the session host cannot be removed".to_string()));
        }
        let Some(target) = self.connected_user(&target_id) else {
            return Err(SessionError::InvalidRequest(format!("user {} is not connected", target_id)));
        };

        self.denied_users.insert(target_id.clone());
        let removed_message = encode(&OutboundMessage::RemoveParticipant { removed_user: target });

        let connections: Vec<ConnectionId> = self.connections_of(&target_id);
        for conn in connections {
            if let Some(participant) = self.participants.remove(&conn) {
                if let Some(frame) = &removed_message {
                    let _ = participant.client.try_send(ClientFrame::Text(frame.clone()));
                }
                let _ = participant.client.try_send(ClientFrame::Close {
                    reason: "removed from session".to_string(),
                });
            }
        }
        self.forget_if_gone(&target_id);

        tracing::info!(
            session_id = %self.session_id,
            user_id = %requester.user_id,
            "Removed participant {} from diagram {}",
            target_id,
            self.diagram_id
        );

        self.broadcast_participants();
        Ok(())
    }

    pub(crate) fn process_presenter_cursor(&mut self, connection_id: ConnectionId, payload: &Value) -> Result<(), SessionError> {
        let message: PresenterCursor = decode(payload)?;
        let user = self.user_of(connection_id)?;

        if !self.is_presenter(&user.user_id) {
            tracing::debug!(session_id = %self.session_id, user_id = %user.user_id, "Ignoring cursor from non-presenter");
            return Ok(());
        }

        if let Some(participant) = self.participants.get_mut(&connection_id) {
            participant.last_cursor = Some(message.cursor_position);
        }
        self.broadcast(
            &OutboundMessage::PresenterCursor {
                user,
                cursor_position: message.cursor_position,
            },
            Some(connection_id),
        );
        Ok(())
    }

    pub(crate) fn process_presenter_selection(&mut self, connection_id: ConnectionId, payload: &Value) -> Result<(), SessionError> {
        let message: PresenterSelection = decode(payload)?;
        let user = self.user_of(connection_id)?;

        if !self.is_presenter(&user.user_id) {
            tracing::debug!(session_id = %self.session_id, user_id = %user.user_id, "Ignoring selection from non-presenter");
            return Ok(());
        }

        if let Some(bad) = message.selected_cells.iter().find(|cell| Uuid::parse_str(cell).is_err()) {
            tracing::warn!(session_id = %self.session_id, user_id = %user.user_id, "Dropping selection with invalid cell id {}", bad);
            return Ok(());
        }

        if let Some(participant) = self.participants.get_mut(&connection_id) {
            participant.last_selection = Some(message.selected_cells.clone());
        }
        self.broadcast(
            &OutboundMessage::PresenterSelection {
                user,
                selected_cells: message.selected_cells,
            },
            Some(connection_id),
        );
        Ok(())
    }

    /// Close every connection, e.g. on idle timeout or server shutdown.
    pub fn close_all(&mut self, reason: &str) {
        for (_, participant) in std::mem::take(&mut self.participants) {
            let _ = participant.client.try_send(ClientFrame::Close {
                reason: reason.to_string(),
            });
        }
        self.presenter = None;
        self.pending_requests.clear();
    }

    /// Drop connections whose queues failed, repeating until stable.
    pub fn reap_dead(&mut self) -> usize {
        let mut reaped = 0;
        loop {
            let mut dead = std::mem::take(&mut self.dead);
            dead.sort_unstable();
            dead.dedup();

            let mut removed_any = false;
            for conn in dead {
                if let Some(participant) = self.participants.remove(&conn) {
                    let user_id = participant.client.user_id().to_string();
                    tracing::warn!(session_id = %self.session_id, user_id = %user_id, "Dropping unresponsive client");
                    let _ = participant.client.try_send(ClientFrame::Close {
                        reason: "client too slow".to_string(),
                    });
                    self.forget_if_gone(&user_id);
                    reaped += 1;
                    removed_any = true;
                }
            }

            if !removed_any {
                break;
            }
            if !self.is_empty() {
                self.broadcast_participants();
            }
        }
        reaped
    }

    fn is_presenter(&self, user_id: &str) -> bool {
        self.presenter.as_deref() == Some(user_id)
    }

    fn can_manage(&self, connection_id: ConnectionId) -> bool {
        let Some(participant) = self.participants.get(&connection_id) else {
            return false;
        };
        let is_host = self
            .host
            .as_ref()
            .map(|host| host.user_id == participant.client.user_id())
            .unwrap_or(false);
        is_host || participant.client.role == ParticipantRole::Owner
    }

    fn user_of(&self, connection_id: ConnectionId) -> Result<User, SessionError> {
        self.participants
            .get(&connection_id)
            .map(|p| p.client.user.clone())
            .ok_or(SessionError::NotConnected(connection_id))
    }

    fn connected_user(&self, user_id: &str) -> Option<User> {
        self.participants
            .values()
            .find(|p| p.client.user_id() == user_id)
            .map(|p| p.client.user.clone())
    }

    fn connections_of(&self, user_id: &str) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|(_, p)| p.client.user_id() == user_id)
            .map(|(conn, _)| *conn)
            .collect()
    }

    fn presenter_user(&self) -> Option<User> {
        self.presenter.as_deref().and_then(|id| self.connected_user(id))
    }

    // A user with no remaining connections cannot present or wait in the queue
    fn forget_if_gone(&mut self, user_id: &str) {
        if self.is_user_connected(user_id) {
            return;
        }
        self.pending_requests.remove(user_id);
        if self.is_presenter(user_id) {
            tracing::info!(session_id = %self.session_id, user_id = %user_id, "Presenter left, presenter unset");
            self.presenter = None;
        }
    }

    fn broadcast_participants(&mut self) {
        let message = OutboundMessage::ParticipantsUpdate {
            participants: self.participants.values().map(Participant::info).collect(),
            host: self.host.clone(),
            current_presenter: self.presenter_user(),
        };
        self.broadcast(&message, None);
    }

    fn broadcast(&mut self, message: &OutboundMessage, except: Option<ConnectionId>) {
        let Some(frame) = encode(message) else {
            return;
        };
        let targets: Vec<ConnectionId> = self
            .participants
            .keys()
            .copied()
            .filter(|conn| Some(*conn) != except)
            .collect();
        for conn in targets {
            self.deliver(conn, frame.clone());
        }
    }

    fn send_to(&mut self, connection_id: ConnectionId, message: &OutboundMessage) {
        if let Some(frame) = encode(message) {
            self.deliver(connection_id, frame);
        }
    }

    fn send_to_user(&mut self, user_id: &str, message: &OutboundMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        for conn in self.connections_of(user_id) {
            self.deliver(conn, frame.clone());
        }
    }

    fn deliver(&mut self, connection_id: ConnectionId, frame: Arc<str>) {
        let Some(participant) = self.participants.get(&connection_id) else {
            return;
        };
        if let Err(failure) = participant.client.try_send(ClientFrame::Text(frame)) {
            tracing::debug!(session_id = %self.session_id, "Send to connection {} failed: {:?}", connection_id, failure);
            self.dead.push(connection_id);
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, SessionError> {
    serde_json::from_value(payload.clone()).map_err(|e| SessionError::InvalidMessage(e.to_string()))
}

fn encode(message: &OutboundMessage) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!("Failed to encode {} message: {}", message.message_type(), e);
            None
        }
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::messages::CursorPosition;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct TestClient {
        handle: ClientHandle,
        rx: mpsc::Receiver<ClientFrame>,
    }

    impl TestClient {
        fn new(user_id: &str, role: ParticipantRole) -> Self {
            let user = User {
                user_id: user_id.to_string(),
                display_name: user_id.to_uppercase(),
                email: format!("{}@example.com", user_id),
            };
            let (handle, rx) = ClientHandle::channel(user, role, 64);
            Self { handle, rx }
        }

        fn id(&self) -> ConnectionId {
            self.handle.connection_id
        }

        /// Drain queued frames as JSON values; close frames become `{"closed": reason}`.
        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                match frame {
                    ClientFrame::Text(text) => frames.push(serde_json::from_str(&text).unwrap()),
                    ClientFrame::Close { reason } => frames.push(json!({ "closed": reason })),
                }
            }
            frames
        }

        fn types(&mut self) -> Vec<String> {
            self.drain()
                .into_iter()
                .map(|v| {
                    v.get("message_type")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| "closed".to_string())
                })
                .collect()
        }
    }

    fn session() -> SessionState {
        SessionState::new(Uuid::new_v4(), Uuid::new_v4(), Arc::new(MessageRegistry::standard()))
    }

    fn user_msg(message_type: &str, field: &str, user_id: &str) -> String {
        json!({ "message_type": message_type, field: { "user_id": user_id } }).to_string()
    }

    /// Session with host `a` plus `b` and `c`, queues drained.
    fn populated() -> (SessionState, TestClient, TestClient, TestClient) {
        let mut state = session();
        let mut a = TestClient::new("a", ParticipantRole::Writer);
        let mut b = TestClient::new("b", ParticipantRole::Writer);
        let mut c = TestClient::new("c", ParticipantRole::Writer);
        state.join(a.handle.clone()).unwrap();
        state.join(b.handle.clone()).unwrap();
        state.join(c.handle.clone()).unwrap();
        a.drain();
        b.drain();
        c.drain();
        (state, a, b, c)
    }

    const PRESENTER_REQUEST: &str = r#"{"message_type":"presenter_request"}"#;

    #[test]
    fn first_joiner_hosts_and_everyone_gets_participant_list() {
        let mut state = session();
        let mut a = TestClient::new("a", ParticipantRole::Writer);
        let mut b = TestClient::new("b", ParticipantRole::Reader);

        state.join(a.handle.clone()).unwrap();
        state.join(b.handle.clone()).unwrap();

        assert_eq!(state.host().map(|h| h.user_id.as_str()), Some("a"));
        let last = a.drain().pop().unwrap();
        assert_eq!(last["message_type"], "participants_update");
        assert_eq!(last["participants"].as_array().unwrap().len(), 2);
        assert_eq!(last["participants"][1]["permissions"], "reader");
        assert_eq!(b.types(), vec!["participants_update"]);
        assert!(state.presenter().is_none());
    }

    #[test]
    fn single_presenter_request_forward_and_deny() {
        let (mut state, mut a, mut b, mut c) = populated();

        state.handle_message(a.id(), PRESENTER_REQUEST).unwrap();
        assert_eq!(state.presenter(), Some("a"));
        assert!(b.types().contains(&"change_presenter".to_string()));
        a.drain();
        c.drain();

        state.handle_message(b.id(), PRESENTER_REQUEST).unwrap();
        assert_eq!(state.presenter(), Some("a"));
        assert!(state.has_pending_request("b"));
        let forwarded = a.drain();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0]["message_type"], "presenter_request_event");
        assert_eq!(forwarded[0]["requesting_user"]["user_id"], "b");
        assert!(c.drain().is_empty());

        state
            .handle_message(a.id(), &user_msg("presenter_denied_request", "denied_user", "b"))
            .unwrap();
        assert_eq!(state.presenter(), Some("a"));
        assert!(!state.has_pending_request("b"));
        assert_eq!(b.types(), vec!["presenter_denied_event"]);
        assert!(c.drain().is_empty());
    }

    #[test]
    fn presenter_hands_over_to_connected_user() {
        let (mut state, mut a, mut b, _c) = populated();
        state.handle_message(b.id(), PRESENTER_REQUEST).unwrap();
        a.drain();

        state
            .handle_message(b.id(), &user_msg("change_presenter_request", "new_presenter", "c"))
            .unwrap();

        assert_eq!(state.presenter(), Some("c"));
        let frames = a.drain();
        assert_eq!(frames[0]["message_type"], "change_presenter");
        assert_eq!(frames[0]["initiating_user"]["user_id"], "b");
        assert_eq!(frames[0]["new_presenter"]["user_id"], "c");
        assert_eq!(frames[1]["current_presenter"]["user_id"], "c");
    }

    #[test]
    fn change_presenter_rejected_for_plain_participant() {
        let (mut state, mut a, mut b, mut c) = populated();
        state.handle_message(a.id(), PRESENTER_REQUEST).unwrap();
        b.drain();
        c.drain();

        let result = state.handle_message(c.id(), &user_msg("change_presenter_request", "new_presenter", "c"));

        assert!(matches!(result, Err(SessionError::Unauthorized(_))));
        assert_eq!(state.presenter(), Some("a"));
        let frames = c.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["error"], "unauthorized");
        assert!(b.drain().is_empty());
        a.drain();
    }

    #[test]
    fn change_to_disconnected_user_is_an_error_not_a_crash() {
        let (mut state, a, _b, _c) = populated();

        let result = state.handle_message(a.id(), &user_msg("change_presenter_request", "new_presenter", "ghost"));

        assert!(matches!(result, Err(SessionError::InvalidRequest(_))));
        assert!(state.presenter().is_none());
    }

    #[test]
    fn host_can_take_presenter_role() {
        let (mut state, a, b, _c) = populated();
        state.handle_message(b.id(), PRESENTER_REQUEST).unwrap();

        state
            .handle_message(a.id(), &user_msg("change_presenter_request", "new_presenter", "a"))
            .unwrap();

        assert_eq!(state.presenter(), Some("a"));
    }

    #[test]
    fn removing_presenter_leaves_no_presenter() {
        let (mut state, mut a, mut b, mut c) = populated();
        state.handle_message(b.id(), PRESENTER_REQUEST).unwrap();
        a.drain();
        b.drain();
        c.drain();

        state
            .handle_message(a.id(), &user_msg("remove_participant_request", "removed_user", "b"))
            .unwrap();

        assert!(state.presenter().is_none());
        assert_eq!(state.participant_count(), 2);
        assert!(state.is_denied("b"));
        let removed = b.drain();
        assert_eq!(removed[0]["message_type"], "remove_participant");
        assert_eq!(removed[1]["closed"], "removed from session");
        let update = c.drain().pop().unwrap();
        assert_eq!(update["message_type"], "participants_update");
        assert!(update["current_presenter"].is_null());

        // Cursor from anyone is ignored until someone presents again
        let cursor = json!({"message_type": "presenter_cursor", "cursor_position": {"x": 1.0, "y": 2.0}}).to_string();
        state.handle_message(c.id(), &cursor).unwrap();
        state.handle_message(a.id(), &cursor).unwrap();
        assert!(a.drain().is_empty());
        assert!(c.drain().is_empty());
    }

    #[test]
    fn removed_user_cannot_rejoin() {
        let (mut state, a, b, _c) = populated();
        state
            .handle_message(a.id(), &user_msg("remove_participant_request", "removed_user", "b"))
            .unwrap();

        let rejoin = state.join(TestClient::new("b", ParticipantRole::Writer).handle);

        assert_eq!(rejoin, Err(SessionError::Denied("b".to_string())));
        assert!(state.participant(b.id()).is_none());
    }

    #[test]
    fn host_cannot_remove_self_and_others_cannot_remove() {
        let (mut state, mut a, b, mut c) = populated();

        let own = state.handle_message(a.id(), &user_msg("remove_participant_request", "removed_user", "a"));
        assert!(matches!(own, Err(SessionError::InvalidRequest(_))));
        assert_eq!(a.drain()[0]["error"], "invalid_request");

        let other = state.handle_message(c.id(), &user_msg("remove_participant_request", "removed_user", "b"));
        assert!(matches!(other, Err(SessionError::Unauthorized(_))));
        assert_eq!(c.drain()[0]["error"], "unauthorized");
        assert!(state.participant(b.id()).is_some());
    }

    #[test]
    fn owner_role_can_manage_without_hosting() {
        let mut state = session();
        let host = TestClient::new("host", ParticipantRole::Writer);
        let owner = TestClient::new("owner", ParticipantRole::Owner);
        let guest = TestClient::new("guest", ParticipantRole::Reader);
        state.join(host.handle.clone()).unwrap();
        state.join(owner.handle.clone()).unwrap();
        state.join(guest.handle.clone()).unwrap();

        state
            .handle_message(owner.id(), &user_msg("remove_participant_request", "removed_user", "guest"))
            .unwrap();

        assert_eq!(state.participant_count(), 2);
    }

    #[test]
    fn presenter_cursor_and_selection_broadcast_to_others_only() {
        let (mut state, mut a, mut b, mut c) = populated();
        state.handle_message(a.id(), PRESENTER_REQUEST).unwrap();
        a.drain();
        b.drain();
        c.drain();

        let cursor = json!({"message_type": "presenter_cursor", "cursor_position": {"x": 10.0, "y": 20.0}});
        state.handle_message(a.id(), &cursor.to_string()).unwrap();
        let cell = Uuid::new_v4().to_string();
        let selection = json!({"message_type": "presenter_selection", "selected_cells": [cell]});
        state.handle_message(a.id(), &selection.to_string()).unwrap();

        assert!(a.drain().is_empty());
        let frames = b.drain();
        assert_eq!(frames[0]["cursor_position"]["x"], 10.0);
        assert_eq!(frames[1]["selected_cells"][0], cell.as_str());
        assert_eq!(c.drain().len(), 2);
        let presenter = state.participant(a.id()).unwrap();
        assert_eq!(presenter.last_cursor, Some(CursorPosition { x: 10.0, y: 20.0 }));
    }

    #[test]
    fn selection_with_invalid_cell_is_dropped() {
        let (mut state, a, mut b, _c) = populated();
        state.handle_message(a.id(), PRESENTER_REQUEST).unwrap();
        b.drain();

        let selection = json!({"message_type": "presenter_selection", "selected_cells": ["not-a-uuid"]});
        state.handle_message(a.id(), &selection.to_string()).unwrap();

        assert!(b.drain().is_empty());
    }

    #[test]
    fn unknown_and_malformed_messages_keep_client_connected() {
        let (mut state, mut a, _b, _c) = populated();

        let unknown = state.handle_message(a.id(), r#"{"message_type":"teleport"}"#);
        let malformed = state.handle_message(a.id(), "{not json");

        assert!(matches!(unknown, Err(SessionError::UnknownMessageType(_))));
        assert!(matches!(malformed, Err(SessionError::InvalidMessage(_))));
        assert_eq!(state.participant_count(), 3);
        // Only the malformed frame is answered
        assert_eq!(a.types(), vec!["error"]);
    }

    fn explode(_state: &mut SessionState, _conn: ConnectionId, _payload: &Value) -> Result<(), SessionError> {
        panic!("boom")
    }

    #[test]
    fn panic_in_handler_is_isolated() {
        let mut registry = MessageRegistry::standard();
        registry.register("explode", explode);
        let mut state = SessionState::new(Uuid::new_v4(), Uuid::new_v4(), Arc::new(registry));
        let a = TestClient::new("a", ParticipantRole::Writer);
        let mut b = TestClient::new("b", ParticipantRole::Writer);
        state.join(a.handle.clone()).unwrap();
        state.join(b.handle.clone()).unwrap();

        let result = state.handle_message(a.id(), r#"{"message_type":"explode"}"#);
        assert!(matches!(result, Err(SessionError::HandlerPanicked { ref detail, .. }) if detail == "boom"));

        state.handle_message(b.id(), PRESENTER_REQUEST).unwrap();
        assert_eq!(state.presenter(), Some("b"));
        assert_eq!(state.participant_count(), 2);
        assert!(b.types().contains(&"change_presenter".to_string()));
    }

    #[test]
    fn presenter_disconnect_unsets_presenter() {
        let (mut state, a, b, _c) = populated();
        state.handle_message(b.id(), PRESENTER_REQUEST).unwrap();

        state.leave(b.id());

        assert!(state.presenter().is_none());
        assert_eq!(state.host().map(|h| h.user_id.as_str()), Some("a"));
        assert!(state.participant(a.id()).is_some());
    }

    #[test]
    fn slow_client_is_dropped_without_affecting_others() {
        let mut state = session();
        let user = User {
            user_id: "slow".into(),
            display_name: String::new(),
            email: String::new(),
        };
        let (slow, _slow_rx) = ClientHandle::channel(user, ParticipantRole::Reader, 1);
        let mut fast = TestClient::new("fast", ParticipantRole::Writer);
        state.join(fast.handle.clone()).unwrap();
        state.join(slow.clone()).unwrap();

        // Queue of one is already full from the join update
        state.handle_message(fast.id(), PRESENTER_REQUEST).unwrap();
        let reaped = state.reap_dead();

        assert_eq!(reaped, 1);
        assert_eq!(state.participant_count(), 1);
        assert!(fast.types().contains(&"participants_update".to_string()));
    }
}
