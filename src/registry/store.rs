//! Channel registry implementation
//!
//! The central registry mapping channel names to live channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::channel::Channel;
use super::error::RegistryError;
use crate::session::{SessionKey, ViewerSession};
use crate::stats::{ChannelStats, RelayStats};

/// Result of claiming a channel's publisher slot
#[derive(Debug, Clone)]
pub struct PublisherClaim {
    /// The channel now published by the claimant
    pub channel: Arc<Channel>,
    /// Incumbent that was displaced, if any
    pub displaced: Option<SessionKey>,
}

/// Central registry for all live channels
///
/// Channels are created on first publish or watch and removed by
/// [`prune_if_empty`](Self::prune_if_empty) once both slots are empty.
/// Every structural change goes through the single map lock; operations that
/// make a channel non-empty fill the slot while still holding it, so a
/// concurrent prune can never remove a channel that is about to be used.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Return the channel for `name`, creating it if needed
    pub async fn get_or_create(&self, name: &str) -> Arc<Channel> {
        if let Some(channel) = self.channels.read().await.get(name) {
            return Arc::clone(channel);
        }

        let mut channels = self.channels.write().await;
        Arc::clone(
            channels
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Channel::new(name))),
        )
    }

    /// Look up a channel without creating it
    pub async fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Make `session` the publisher of `name`, creating the channel
    pub async fn claim_publisher(&self, name: &str, session: SessionKey) -> PublisherClaim {
        let mut channels = self.channels.write().await;
        let channel = Arc::clone(
            channels
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Channel::new(name))),
        );
        let displaced = channel.set_publisher(session).await;

        PublisherClaim { channel, displaced }
    }

    /// Register `viewer` with an existing channel
    ///
    /// Never creates a channel: watching something nobody has published is
    /// an error and leaves the registry untouched.
    pub async fn attach_viewer(
        &self,
        name: &str,
        viewer: &Arc<ViewerSession>,
    ) -> Result<Arc<Channel>, RegistryError> {
        // A read guard is enough to keep prune (which needs the write lock) out
        let channels = self.channels.read().await;
        let channel = channels
            .get(name)
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))?;

        channel.add_viewer(viewer).await;
        Ok(Arc::clone(channel))
    }

    /// Remove the channel for `name` if it has no publisher and no viewers
    ///
    /// Returns whether a channel was removed. Idempotent.
    pub async fn prune_if_empty(&self, name: &str) -> bool {
        let mut channels = self.channels.write().await;

        let Some(channel) = channels.get(name) else {
            return false;
        };
        if !channel.is_empty().await {
            return false;
        }

        channels.remove(name);
        tracing::info!(channel = %name, "Removed empty channel");
        true
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn channel_names(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Statistics for one channel
    pub async fn stats(&self, name: &str) -> Option<ChannelStats> {
        let channel = self.get(name).await?;
        Some(channel.stats().await)
    }

    /// Totals across every live channel
    pub async fn snapshot(&self) -> RelayStats {
        let channels: Vec<Arc<Channel>> = self.channels.read().await.values().cloned().collect();

        let mut totals = RelayStats::default();
        for channel in channels {
            totals.add_channel(&channel.stats().await);
        }
        totals
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
