//! Publisher session
//!
//! Binds a transport session to a channel's publisher slot and relays every
//! inbound datagram to the channel verbatim: no parsing, no reassembly and no
//! per-message state.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use super::state::{CloseReason, SessionPhase, SessionState};
use super::SessionKey;
use crate::registry::{Channel, ChannelRegistry, RelayOutcome};
use crate::stats::SessionStats;

/// A session publishing into a channel
pub struct PublisherSession {
    state: SessionState,
    registry: Arc<ChannelRegistry>,
    channel: OnceLock<Arc<Channel>>,
}

impl PublisherSession {
    pub fn new(
        key: SessionKey,
        channel: impl Into<String>,
        registry: Arc<ChannelRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: SessionState::new(key, channel),
            registry,
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

    /// Wait until the session has either claimed its slot or closed
    pub async fn settled(&self) -> SessionPhase {
        self.state.settled().await
    }

    /// Stop relaying and wake the session task for cleanup
    pub fn deactivate(&self, reason: CloseReason) {
        self.state.deactivate(reason);
    }

    /// Drive the session until it is deactivated
    ///
    /// Claims the publisher slot (creating the channel if needed), then parks
    /// until the transport resets the session or the connection closes.
    pub async fn run(self: Arc<Self>) {
        if !self.state.is_active() {
            self.state.close();
            return;
        }

        let claim = self
            .registry
            .claim_publisher(self.channel_name(), self.key())
            .await;
        let _ = self.channel.set(claim.channel);
        self.state.activate();

        tracing::info!(
            channel = %self.channel_name(),
            session = %self.key(),
            displaced = ?claim.displaced,
            "Publisher handler started"
        );

        self.state.cancelled().await;
        self.cleanup().await;
    }

    /// Relay one inbound datagram to the channel's viewers
    ///
    /// Datagrams arriving before the slot is claimed, after close, or after
    /// another publisher took the slot are dropped.
    pub async fn relay(&self, payload: Bytes) -> RelayOutcome {
        let channel = match self.channel.get() {
            Some(channel) if self.state.is_active() => channel,
            _ => {
                self.state.counters().record_dropped();
                tracing::trace!(session = %self.key(), "Dropping datagram for inactive publisher");
                return RelayOutcome::Inactive;
            }
        };

        self.state.counters().record(payload.len());
        let outcome = channel.relay_from(self.key(), payload).await;

        if outcome == RelayOutcome::NotPublisher {
            self.state.counters().record_dropped();
            tracing::debug!(
                channel = %self.channel_name(),
                session = %self.key(),
                "Dropping datagram from displaced publisher"
            );
        }
        outcome
    }

    async fn cleanup(&self) {
        if !self.state.close() {
            return;
        }

        if let Some(channel) = self.channel.get() {
            channel.clear_publisher(self.key()).await;
            self.registry.prune_if_empty(self.channel_name()).await;
        }

        tracing::info!(
            channel = %self.channel_name(),
            session = %self.key(),
            reason = ?self.state.close_reason(),
            "Publisher closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::key;

    #[tokio::test]
    async fn test_publisher_claims_and_releases_slot() {
        let registry = Arc::new(ChannelRegistry::new());
        let publisher = PublisherSession::new(key(1), "s1", Arc::clone(&registry));

        let task = tokio::spawn(Arc::clone(&publisher).run());
        assert_eq!(publisher.settled().await, SessionPhase::Active);

        let channel = registry.get("s1").await.unwrap();
        assert_eq!(channel.publisher().await, Some(key(1)));

        publisher.deactivate(CloseReason::Reset);
        task.await.unwrap();

        assert_eq!(publisher.phase(), SessionPhase::Closed);
        assert_eq!(channel.publisher().await, None);
        // No viewers either, so the channel is gone
        assert!(!registry.contains("s1").await);
    }

    #[tokio::test]
    async fn test_relay_before_activation_is_dropped() {
        let registry = Arc::new(ChannelRegistry::new());
        let publisher = PublisherSession::new(key(1), "s1", Arc::clone(&registry));

        let outcome = publisher.relay(Bytes::from_static(b"early")).await;
        assert_eq!(outcome, RelayOutcome::Inactive);
        assert_eq!(publisher.stats().dropped, 1);
        assert_eq!(registry.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_reset_before_run() {
        let registry = Arc::new(ChannelRegistry::new());
        let publisher = PublisherSession::new(key(1), "s1", Arc::clone(&registry));

        publisher.deactivate(CloseReason::Reset);
        Arc::clone(&publisher).run().await;

        assert_eq!(publisher.phase(), SessionPhase::Closed);
        assert_eq!(registry.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_displaced_publisher_does_not_clear_successor() {
        let registry = Arc::new(ChannelRegistry::new());
        let first = PublisherSession::new(key(1), "s1", Arc::clone(&registry));
        let second = PublisherSession::new(key(2), "s1", Arc::clone(&registry));

        let first_task = tokio::spawn(Arc::clone(&first).run());
        first.settled().await;
        let second_task = tokio::spawn(Arc::clone(&second).run());
        second.settled().await;

        // The displaced publisher keeps running but its datagrams go nowhere
        let outcome = first.relay(Bytes::from_static(b"stale")).await;
        assert_eq!(outcome, RelayOutcome::NotPublisher);
        assert!(first.is_active());

        first.deactivate(CloseReason::Reset);
        first_task.await.unwrap();

        let channel = registry.get("s1").await.unwrap();
        assert_eq!(channel.publisher().await, Some(key(2)));

        second.deactivate(CloseReason::Reset);
        second_task.await.unwrap();
        assert!(!registry.contains("s1").await);
    }
}
