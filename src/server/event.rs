//! Events delivered by the transport to a connection's router

use bytes::Bytes;

use crate::session::SessionId;

/// A session-open (extended CONNECT) request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Stream ID of the CONNECT request, used as the session ID
    pub session_id: SessionId,
    /// `:method` pseudo-header
    pub method: String,
    /// `:protocol` pseudo-header
    pub protocol: String,
    /// `:path` pseudo-header
    pub path: String,
}

impl SessionRequest {
    /// A well-formed WebTransport request for `path`
    pub fn webtransport(session_id: SessionId, path: impl Into<String>) -> Self {
        use crate::protocol::constants::{CONNECT_METHOD, WEBTRANSPORT_PROTOCOL};

        Self {
            session_id,
            method: CONNECT_METHOD.to_string(),
            protocol: WEBTRANSPORT_PROTOCOL.to_string(),
            path: path.into(),
        }
    }
}

/// Everything the router reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished and the application protocol is known
    ProtocolNegotiated { alpn: String },
    /// A peer wants to open a session
    SessionRequest(SessionRequest),
    /// Datagram received on a session
    Datagram { session_id: SessionId, payload: Bytes },
    /// The session's stream was reset by the peer
    SessionReset { session_id: SessionId },
    /// The whole connection is gone
    ConnectionClosed,
}

impl TransportEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::ProtocolNegotiated { .. } => "protocol_negotiated",
            TransportEvent::SessionRequest(_) => "session_request",
            TransportEvent::Datagram { .. } => "datagram",
            TransportEvent::SessionReset { .. } => "session_reset",
            TransportEvent::ConnectionClosed => "connection_closed",
        }
    }
}
