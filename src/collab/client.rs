// collab/client.rs - Connection handle held by a diagram session

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{ParticipantRole, User};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Frame queued for a client's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(Arc<str>),
    Close { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Outbound queue is full; the client is not keeping up.
    Full,
    Disconnected,
}

/// One WebSocket connection. Cloning shares the outbound queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub connection_id: ConnectionId,
    pub user: User,
    pub role: ParticipantRole,
    sender: mpsc::Sender<ClientFrame>,
}

impl ClientHandle {
    pub fn new(user: User, role: ParticipantRole, sender: mpsc::Sender<ClientFrame>) -> Self {
        Self {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            user,
            role,
            sender,
        }
    }

    /// Handle plus the receiving end of its queue.
    pub fn channel(user: User, role: ParticipantRole, capacity: usize) -> (Self, mpsc::Receiver<ClientFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(user, role, tx), rx)
    }

    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    pub fn try_send(&self, frame: ClientFrame) -> Result<(), SendFailure> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Disconnected,
        })
    }
}
