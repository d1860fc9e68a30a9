// collab/mod.rs - Real-time diagram collaboration sessions

pub mod client;
pub mod connection;
pub mod error;
pub mod hub;
pub mod messages;
pub mod registry;
pub mod session;
pub mod state;

pub use client::{ClientFrame, ClientHandle, ConnectionId};
pub use error::SessionError;
pub use hub::SessionHub;
pub use messages::{OutboundMessage, ParticipantRole, User};
pub use registry::{MessageHandler, MessageRegistry, STANDARD_REGISTRY};
pub use session::{SessionHandle, SessionSettings};
pub use state::{SessionSnapshot, SessionState};
