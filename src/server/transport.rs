//! Transport seam
//!
//! The relay does not speak QUIC or HTTP/3 itself. A transport adapter
//! implements [`Transport`] for each connection and feeds
//! [`TransportEvent`](super::TransportEvent)s to the connection's router.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::session::{DatagramSink, SessionId};

/// Primitives a connection exposes to the relay
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Answer a session-open request with a success status
    async fn accept_session(
        &self,
        session_id: SessionId,
        status: u16,
        headers: &[(&str, &str)],
    ) -> std::io::Result<()>;

    /// Answer a session-open request with an error status and end it
    async fn reject_session(&self, session_id: SessionId, status: u16) -> std::io::Result<()>;

    /// Queue one datagram on a session
    async fn send_datagram(&self, session_id: SessionId, payload: Bytes) -> std::io::Result<()>;

    /// Terminate an accepted session
    async fn close_session(&self, session_id: SessionId) -> std::io::Result<()>;

    /// Push queued packets onto the wire
    async fn flush(&self) -> std::io::Result<()>;
}

/// [`DatagramSink`] for one session on a shared connection
pub struct TransportSink {
    transport: Arc<dyn Transport>,
    session_id: SessionId,
}

impl TransportSink {
    pub fn new(transport: Arc<dyn Transport>, session_id: SessionId) -> Self {
        Self {
            transport,
            session_id,
        }
    }
}

#[async_trait]
impl DatagramSink for TransportSink {
    async fn send(&self, payload: Bytes) -> std::io::Result<()> {
        self.transport
            .send_datagram(self.session_id, payload)
            .await?;
        self.transport.flush().await
    }

    async fn close(&self) -> std::io::Result<()> {
        self.transport.close_session(self.session_id).await?;
        self.transport.flush().await
    }
}
