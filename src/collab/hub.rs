// collab/hub.rs - Registry of live diagram sessions

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::client::ClientHandle;
use super::error::SessionError;
use super::registry::{MessageRegistry, STANDARD_REGISTRY};
use super::session::{spawn_session, SessionHandle, SessionMap, SessionSettings};
use super::state::SessionSnapshot;

/// One session per diagram, created on first join and removed when it ends.
#[derive(Clone)]
pub struct SessionHub {
    sessions: SessionMap,
    registry: Arc<MessageRegistry>,
    settings: SessionSettings,
}

impl SessionHub {
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_registry(settings, STANDARD_REGISTRY.clone())
    }

    pub fn with_registry(settings: SessionSettings, registry: Arc<MessageRegistry>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Join the diagram's session, starting one if none is running.
    pub async fn join(
        &self,
        threat_model_id: Uuid,
        diagram_id: Uuid,
        client: ClientHandle,
    ) -> Result<SessionHandle, SessionError> {
        // A session can end between lookup and join; one retry lands on a fresh one
        for _ in 0..2 {
            let handle = {
                let mut sessions = self.sessions.lock().await;
                match sessions.get(&diagram_id) {
                    Some(handle) if !handle.is_closed() => handle.clone(),
                    _ => {
                        let handle = spawn_session(
                            threat_model_id,
                            diagram_id,
                            self.registry.clone(),
                            self.settings.clone(),
                            self.sessions.clone(),
                        );
                        sessions.insert(diagram_id, handle.clone());
                        handle
                    }
                }
            };

            match handle.join(client.clone()).await {
                Ok(()) => return Ok(handle),
                Err(SessionError::Closed) => {
                    let mut sessions = self.sessions.lock().await;
                    if sessions
                        .get(&diagram_id)
                        .map(|h| h.session_id == handle.session_id)
                        .unwrap_or(false)
                    {
                        sessions.remove(&diagram_id);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(SessionError::Closed)
    }

    pub async fn session(&self, diagram_id: Uuid) -> Option<SessionHandle> {
        self.sessions.lock().await.get(&diagram_id).cloned()
    }

    pub async fn active_sessions(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = self.sessions.lock().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(snapshot) = handle.snapshot().await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Sessions `user_id` is currently connected to.
    pub async fn active_sessions_for(&self, user_id: &str) -> Vec<SessionSnapshot> {
        let mut snapshots = self.active_sessions().await;
        snapshots.retain(|snapshot| snapshot.participants.iter().any(|p| p.user.user_id == user_id));
        snapshots
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Close every session, e.g. during server shutdown.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.lock().await.values().cloned().collect();
        for handle in handles {
            handle.shutdown("server shutting down").await;
        }
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}
