// collab/session.rs - Session actor owning one SessionState

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use super::client::{ClientHandle, ConnectionId};
use super::error::SessionError;
use super::registry::MessageRegistry;
use super::state::{SessionSnapshot, SessionState};

/// Timing and sizing knobs shared by every session of a hub.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// A session with no inbound activity for this long is torn down.
    pub idle_timeout: Duration,
    pub cleanup_interval: Duration,
    /// Outbound frames buffered per client before it counts as too slow.
    pub client_buffer: usize,
    pub read_timeout: Duration,
    pub ping_interval: Duration,
    pub max_message_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            client_buffer: 256,
            read_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            max_message_size: 4096,
        }
    }
}

pub(crate) type SessionMap = Arc<Mutex<HashMap<Uuid, SessionHandle>>>;

#[derive(Debug)]
enum SessionCommand {
    Join {
        client: ClientHandle,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Leave {
        connection_id: ConnectionId,
    },
    Inbound {
        connection_id: ConnectionId,
        raw: String,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reason: String,
    },
}

/// Cheap handle to a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub diagram_id: Uuid,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn join(&self, client: ClientHandle) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Join { client, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn leave(&self, connection_id: ConnectionId) {
        let _ = self.tx.send(SessionCommand::Leave { connection_id }).await;
    }

    pub async fn submit(&self, connection_id: ConnectionId, raw: String) -> Result<(), SessionError> {
        self.tx
            .send(SessionCommand::Inbound { connection_id, raw })
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn shutdown(&self, reason: &str) {
        let _ = self
            .tx
            .send(SessionCommand::Shutdown {
                reason: reason.to_string(),
            })
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the actor for a new session and return its handle.
pub(crate) fn spawn_session(
    threat_model_id: Uuid,
    diagram_id: Uuid,
    registry: Arc<MessageRegistry>,
    settings: SessionSettings,
    sessions: SessionMap,
) -> SessionHandle {
    let state = SessionState::new(threat_model_id, diagram_id, registry);
    let (tx, rx) = mpsc::channel(settings.client_buffer.max(16));
    let handle = SessionHandle {
        session_id: state.session_id(),
        diagram_id,
        tx,
    };

    tracing::info!(session_id = %handle.session_id, "Starting collaboration session for diagram {}", diagram_id);
    tokio::spawn(run(state, rx, settings, sessions));
    handle
}

async fn run(
    mut state: SessionState,
    mut rx: mpsc::Receiver<SessionCommand>,
    settings: SessionSettings,
    sessions: SessionMap,
) {
    let mut cleanup = tokio::time::interval(settings.cleanup_interval.max(Duration::from_millis(1)));
    cleanup.tick().await;

    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else { break };
                // Snapshots can reach a fresh session ahead of its first join
                let can_empty = !matches!(command, SessionCommand::Snapshot { .. });
                match command {
                    SessionCommand::Join { client, reply } => {
                        let _ = reply.send(state.join(client));
                    }
                    SessionCommand::Leave { connection_id } => {
                        state.leave(connection_id);
                    }
                    SessionCommand::Inbound { connection_id, raw } => {
                        if let Err(e) = state.handle_message(connection_id, &raw) {
                            tracing::debug!(session_id = %state.session_id(), "Message from {} rejected: {}", connection_id, e);
                        }
                    }
                    SessionCommand::Snapshot { reply } => {
                        let _ = reply.send(state.snapshot());
                    }
                    SessionCommand::Shutdown { reason } => {
                        state.close_all(&reason);
                        break;
                    }
                }
                state.reap_dead();
                if can_empty && state.is_empty() {
                    tracing::info!(session_id = %state.session_id(), "Last participant left");
                    break;
                }
            }
            _ = cleanup.tick() => {
                if state.idle_for() >= settings.idle_timeout {
                    tracing::info!(
                        session_id = %state.session_id(),
                        "Closing session idle for {:?}",
                        state.idle_for()
                    );
                    state.close_all("session idle timeout");
                    break;
                }
            }
        }
    }

    // Refuse anything still queued so callers can retry against a fresh session
    rx.close();
    while let Some(command) = rx.recv().await {
        match command {
            SessionCommand::Join { reply, .. } => {
                let _ = reply.send(Err(SessionError::Closed));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }
            _ => {}
        }
    }
    state.close_all("session closed");

    let mut sessions = sessions.lock().await;
    if sessions
        .get(&state.diagram_id())
        .map(|h| h.session_id == state.session_id())
        .unwrap_or(false)
    {
        sessions.remove(&state.diagram_id());
    }
    tracing::info!(session_id = %state.session_id(), "Collaboration session ended");
}
