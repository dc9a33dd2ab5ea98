//! Outbound capability held by a session

use async_trait::async_trait;
use bytes::Bytes;

/// Send side of a single transport session
///
/// Sessions only ever see this narrow interface, never the connection type
/// behind it.
#[async_trait]
pub trait DatagramSink: Send + Sync + 'static {
    /// Send one datagram to the remote end
    async fn send(&self, payload: Bytes) -> std::io::Result<()>;

    /// Terminate the transport session
    async fn close(&self) -> std::io::Result<()>;
}
