//! Real-time collaboration client.
//!
//! This module keeps one editing session connected to its peers:
//! - JSON text protocol for the event channel
//! - Transport abstraction with a WebSocket implementation
//! - The collaboration session state machine (connect, join, broadcast)
//! - Presence tracking for other peers on the page
//! - An in-process relay for tests and local tooling

pub mod loopback;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod transport;

pub use loopback::LoopbackHub;
pub use presence::{PresenceRecord, PresenceSet};
pub use protocol::{ChangeType, ClientEvent, ProtocolError, ServerEvent, SyncProtocol};
pub use session::{CollaborationSession, SessionEvent, SessionStatus};
pub use transport::{Transport, WebSocketTransport};

use std::time::Duration;

use crate::document::UserSummary;

/// Unique identifier for one transport connection
pub type ConnectionId = String;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors surfaced by the collaboration channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("Channel closed: {0}")]
    Closed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not connected")]
    NotConnected,
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                ChannelError::Closed("connection closed".to_string())
            }
            WsError::Http(response) if response.status().as_u16() == 401 => {
                ChannelError::Unauthorized("server rejected credential".to_string())
            }
            other => ChannelError::Transport(other.to_string()),
        }
    }
}

/// Configuration for the collaboration channel
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Socket endpoint, e.g. `ws://localhost:5001`
    pub socket_url: String,
    /// Upper bound on a connection attempt
    pub connect_timeout: Duration,
    /// The local user; remote trees authored by this user are not re-applied
    pub local_user: Option<UserSummary>,
}

impl SyncConfig {
    pub fn new(socket_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_local_user(mut self, user: UserSummary) -> Self {
        self.local_user = Some(user);
        self
    }

    pub fn local_user_id(&self) -> Option<&str> {
        self.local_user.as_ref().map(|u| u.id.as_str())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://localhost:5001".to_string(),
            connect_timeout: Duration::from_secs(10),
            local_user: None,
        }
    }
}
