//! Relay sessions
//!
//! Every accepted transport session becomes either a [`PublisherSession`] or a
//! [`ViewerSession`]. Both share the same lifecycle
//! (`Connecting → Active → Closed`, see [`SessionPhase`]) and run in their own
//! task, parked on a cancellation token until the transport resets the
//! session or the connection goes away.

pub mod publisher;
pub mod sink;
pub mod state;
pub mod viewer;

pub use publisher::PublisherSession;
pub use sink::DatagramSink;
pub use state::{CloseReason, SessionPhase, SessionState};
pub use viewer::ViewerSession;

/// Transport-assigned session identifier (the CONNECT stream ID)
///
/// Only unique within one connection.
pub type SessionId = u64;

/// Process-wide identity of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    /// Connection the session lives on
    pub connection_id: u64,
    /// Session ID within that connection
    pub session_id: SessionId,
}

impl SessionKey {
    pub fn new(connection_id: u64, session_id: SessionId) -> Self {
        Self {
            connection_id,
            session_id,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.connection_id, self.session_id)
    }
}
