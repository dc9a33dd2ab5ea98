//! Per-channel state and fan-out
//!
//! A channel holds at most one publisher and any number of viewers. It only
//! keeps the publisher's session key and weak references to viewers: session
//! lifetimes belong to the router and the sessions' own tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::RwLock;

use super::broadcast::{BroadcastReport, RelayOutcome};
use crate::session::{SessionKey, ViewerSession};
use crate::stats::ChannelStats;

#[derive(Default)]
struct Slots {
    publisher: Option<SessionKey>,
    viewers: HashMap<SessionKey, Weak<ViewerSession>>,
}

impl Slots {
    fn snapshot(&self) -> Vec<Arc<ViewerSession>> {
        self.viewers.values().filter_map(Weak::upgrade).collect()
    }

    fn live_viewers(&self) -> usize {
        self.viewers.values().filter(|v| v.strong_count() > 0).count()
    }
}

/// A named channel
pub struct Channel {
    name: String,
    slots: RwLock<Slots>,
    datagrams_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
    created_at: Instant,
}

impl Channel {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(channel = %name, "Created channel");

        Self {
            name,
            slots: RwLock::new(Slots::default()),
            datagrams_relayed: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install `session` as the publisher
    ///
    /// Any incumbent is replaced without being notified; its ID is returned.
    pub async fn set_publisher(&self, session: SessionKey) -> Option<SessionKey> {
        let mut slots = self.slots.write().await;
        let previous = slots.publisher.replace(session);

        match previous {
            Some(prev) if prev != session => {
                tracing::warn!(
                    channel = %self.name,
                    previous = %prev,
                    session = %session,
                    "Channel already has a publisher, replacing"
                );
            }
            _ => {
                tracing::info!(
                    channel = %self.name,
                    session = %session,
                    viewers = slots.live_viewers(),
                    "Publisher connected"
                );
            }
        }

        previous.filter(|prev| *prev != session)
    }

    /// Empty the publisher slot if `session` still occupies it
    pub async fn clear_publisher(&self, session: SessionKey) -> bool {
        let mut slots = self.slots.write().await;

        if slots.publisher != Some(session) {
            tracing::debug!(
                channel = %self.name,
                expected = ?slots.publisher,
                actual = %session,
                "Publisher slot already moved on"
            );
            return false;
        }

        slots.publisher = None;
        tracing::info!(channel = %self.name, session = %session, "Publisher disconnected");
        true
    }

    /// Current publisher slot occupant
    pub async fn publisher(&self) -> Option<SessionKey> {
        self.slots.read().await.publisher
    }

    /// Register a viewer; re-adding the same session is a no-op
    pub async fn add_viewer(&self, viewer: &Arc<ViewerSession>) {
        let mut slots = self.slots.write().await;
        // Viewers dropped without deregistering
        slots.viewers.retain(|_, v| v.strong_count() > 0);
        slots.viewers.insert(viewer.key(), Arc::downgrade(viewer));

        tracing::info!(
            channel = %self.name,
            session = %viewer.key(),
            viewers = slots.live_viewers(),
            "Viewer connected"
        );
    }

    /// Deregister a viewer; unknown IDs are ignored
    pub async fn remove_viewer(&self, session: SessionKey) -> bool {
        let mut slots = self.slots.write().await;
        let removed = slots.viewers.remove(&session).is_some();

        if removed {
            tracing::info!(
                channel = %self.name,
                session = %session,
                remaining = slots.live_viewers(),
                "Viewer disconnected"
            );
        }
        removed
    }

    pub async fn viewer_count(&self) -> usize {
        self.slots.read().await.live_viewers()
    }

    /// No publisher and no live viewers
    pub async fn is_empty(&self) -> bool {
        let slots = self.slots.read().await;
        slots.publisher.is_none() && slots.live_viewers() == 0
    }

    /// Fan `payload` out to every viewer registered right now
    ///
    /// Viewers joining after the snapshot is taken do not receive it. Each
    /// delivery runs concurrently and fails independently.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastReport {
        let viewers = self.slots.read().await.snapshot();
        self.fan_out(viewers, payload).await
    }

    /// Broadcast on behalf of `session`, but only while it holds the
    /// publisher slot
    pub async fn relay_from(&self, session: SessionKey, payload: Bytes) -> RelayOutcome {
        let viewers = {
            let slots = self.slots.read().await;
            if slots.publisher != Some(session) {
                return RelayOutcome::NotPublisher;
            }
            slots.snapshot()
        };

        RelayOutcome::Broadcast(self.fan_out(viewers, payload).await)
    }

    async fn fan_out(&self, viewers: Vec<Arc<ViewerSession>>, payload: Bytes) -> BroadcastReport {
        if viewers.is_empty() {
            return BroadcastReport::default();
        }

        self.datagrams_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        let report: BroadcastReport = join_all(
            viewers
                .iter()
                .map(|viewer| viewer.deliver(payload.clone())),
        )
        .await
        .into_iter()
        .collect();

        if report.failed > 0 {
            tracing::debug!(
                channel = %self.name,
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast had failed deliveries"
            );
        }
        report
    }

    pub async fn stats(&self) -> ChannelStats {
        let slots = self.slots.read().await;

        ChannelStats {
            name: self.name.clone(),
            publisher: slots.publisher,
            viewer_count: slots.live_viewers(),
            datagrams_relayed: self.datagrams_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            age: self.created_at.elapsed(),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
