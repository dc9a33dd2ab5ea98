//! Statistics and metrics for relay sessions and channels

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::session::SessionKey;

/// Lock-free counters owned by a single session
#[derive(Debug)]
pub struct SessionCounters {
    started_at: Instant,
    datagrams: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            datagrams: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Count one datagram of `size` bytes
    pub fn record(&self, size: usize) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Count a datagram that was dropped without being relayed
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed send
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level statistics
///
/// For publishers `datagrams`/`bytes` count what was received from the
/// transport; for viewers they count what was delivered.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Datagrams handled
    pub datagrams: u64,
    /// Payload bytes handled
    pub bytes: u64,
    /// Datagrams dropped (inactive session or displaced publisher)
    pub dropped: u64,
    /// Failed sends
    pub failures: u64,
    /// Time since the session was created
    pub duration: Duration,
}

impl SessionStats {
    /// Bitrate estimate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes * 8) / secs
        } else {
            0
        }
    }
}

/// Channel-level statistics
#[derive(Debug, Clone)]
pub struct ChannelStats {
    /// Channel name
    pub name: String,
    /// Current publisher slot occupant
    pub publisher: Option<SessionKey>,
    /// Number of registered viewers
    pub viewer_count: usize,
    /// Datagrams fanned out since creation
    pub datagrams_relayed: u64,
    /// Payload bytes fanned out since creation
    pub bytes_relayed: u64,
    /// Time since the channel was created
    pub age: Duration,
}

impl ChannelStats {
    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }
}

/// Registry-wide statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Live channels
    pub channel_count: usize,
    /// Channels with a publisher
    pub publisher_count: usize,
    /// Viewers across all channels
    pub viewer_count: usize,
    /// Datagrams fanned out across all live channels
    pub datagrams_relayed: u64,
}

impl RelayStats {
    /// Fold one channel into the totals
    pub fn add_channel(&mut self, channel: &ChannelStats) {
        self.channel_count += 1;
        if channel.has_publisher() {
            self.publisher_count += 1;
        }
        self.viewer_count += channel.viewer_count;
        self.datagrams_relayed += channel.datagrams_relayed;
    }
}
