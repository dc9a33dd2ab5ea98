//! Viewer session
//!
//! Binds a transport session to a channel's viewer set. Fan-out payloads
//! arrive through [`ViewerSession::deliver`] and go straight to the session's
//! [`DatagramSink`]. Nothing is replayed on join.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use super::sink::DatagramSink;
use super::state::{CloseReason, SessionPhase, SessionState};
use super::SessionKey;
use crate::error::Error;
use crate::registry::{Channel, ChannelRegistry, DeliveryOutcome};
use crate::stats::SessionStats;

/// A session watching a channel
pub struct ViewerSession {
    state: SessionState,
    registry: Arc<ChannelRegistry>,
    sink: Arc<dyn DatagramSink>,
    channel: OnceLock<Arc<Channel>>,
}

impl ViewerSession {
    pub fn new(
        key: SessionKey,
        channel: impl Into<String>,
        registry: Arc<ChannelRegistry>,
        sink: Arc<dyn DatagramSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: SessionState::new(key, channel),
            registry,
            sink,
            channel: OnceLock::new(),
        })
    }

    pub fn key(&self) -> SessionKey {
        self.state.key()
    }

    pub fn channel_name(&self) -> &str {
        self.state.channel()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.close_reason()
    }

    pub fn stats(&self) -> SessionStats {
        self.state.counters().snapshot()
    }

    /// Wait until the session has either registered or closed
    pub async fn settled(&self) -> SessionPhase {
        self.state.settled().await
    }

    /// Stop receiving and wake the session task for cleanup
    pub fn deactivate(&self, reason: CloseReason) {
        self.state.deactivate(reason);
    }

    /// Drive the session until it is deactivated
    ///
    /// Joins the channel (never creating it), then parks until the transport
    /// resets the session, the connection closes, or a delivery fails.
    pub async fn run(self: Arc<Self>) {
        if !self.state.is_active() {
            self.state.close();
            return;
        }

        match self.registry.attach_viewer(self.channel_name(), &self).await {
            Ok(channel) => {
                let _ = self.channel.set(channel);
                // Fails only if a reset raced the attach; cleanup below handles it
                self.state.activate();
                tracing::info!(
                    channel = %self.channel_name(),
                    session = %self.key(),
                    "Viewer handler started"
                );
            }
            Err(e) => {
                tracing::warn!(
                    channel = %self.channel_name(),
                    session = %self.key(),
                    error = %e,
                    "Rejecting viewer"
                );
                self.state.deactivate(CloseReason::StreamNotFound);
            }
        }

        self.state.cancelled().await;
        self.cleanup().await;
    }

    /// Send one fan-out payload to this viewer
    ///
    /// A failed send deactivates the viewer instead of reporting an error to
    /// the broadcaster.
    pub async fn deliver(&self, payload: Bytes) -> DeliveryOutcome {
        if !self.state.is_active() {
            return DeliveryOutcome::Skipped;
        }

        let size = payload.len();
        match self.sink.send(payload).await {
            Ok(()) => {
                self.state.counters().record(size);
                tracing::trace!(session = %self.key(), size = size, "Sent datagram to viewer");
                DeliveryOutcome::Delivered
            }
            Err(source) => {
                let err = Error::DeliveryFailure {
                    session_id: self.key().session_id,
                    source,
                };
                tracing::error!(
                    channel = %self.channel_name(),
                    session = %self.key(),
                    error = %err,
                    "Error sending datagram to viewer"
                );
                self.state.counters().record_failure();
                self.state.deactivate(CloseReason::DeliveryFailed);
                DeliveryOutcome::Failed
            }
        }
    }

    async fn cleanup(&self) {
        if !self.state.close() {
            return;
        }

        if let Some(channel) = self.channel.get() {
            channel.remove_viewer(self.key()).await;
            self.registry.prune_if_empty(self.channel_name()).await;
        }

        let reason = self.state.close_reason();
        if reason.is_some_and(|r| r.is_local()) {
            if let Err(e) = self.sink.close().await {
                tracing::debug!(session = %self.key(), error = %e, "Failed to close viewer session");
            }
        }

        tracing::info!(
            channel = %self.channel_name(),
            session = %self.key(),
            reason = ?reason,
            "Viewer closed"
        );
    }
}
