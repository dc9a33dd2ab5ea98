//! Session state machine
//!
//! Tracks a relay session from the moment the router accepts it until its
//! channel slot has been released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::SessionKey;
use crate::stats::SessionCounters;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepted by the router, not yet registered with its channel
    Connecting,
    /// Registered with its channel
    Active,
    /// Deregistered; terminal
    Closed,
}

/// Why a session was deactivated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport reset the session stream
    Reset,
    /// Underlying connection closed
    ConnectionClosed,
    /// A send to this viewer failed
    DeliveryFailed,
    /// Viewer asked for a channel that does not exist
    StreamNotFound,
}

impl CloseReason {
    /// Whether the relay itself ended the session, so the transport session
    /// still has to be closed
    pub fn is_local(&self) -> bool {
        matches!(self, CloseReason::DeliveryFailed | CloseReason::StreamNotFound)
    }
}

/// State shared by publisher and viewer sessions
#[derive(Debug)]
pub struct SessionState {
    key: SessionKey,
    channel: String,
    phase: watch::Sender<SessionPhase>,
    active: AtomicBool,
    close_reason: OnceLock<CloseReason>,
    cancel: CancellationToken,
    counters: SessionCounters,
}

impl SessionState {
    pub fn new(key: SessionKey, channel: impl Into<String>) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Connecting);

        Self {
            key,
            channel: channel.into(),
            phase,
            active: AtomicBool::new(true),
            close_reason: OnceLock::new(),
            cancel: CancellationToken::new(),
            counters: SessionCounters::new(),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Name of the channel this session is bound to
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Whether the session still accepts traffic
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Move `Connecting → Active`
    ///
    /// Fails if the session was deactivated before it got the chance to
    /// register, or if it is not in `Connecting`.
    pub fn activate(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Connecting {
                *phase = SessionPhase::Active;
                true
            } else {
                false
            }
        })
    }

    /// Stop accepting traffic and wake the session task
    ///
    /// The first reason recorded wins; repeated calls are harmless.
    pub fn deactivate(&self, reason: CloseReason) {
        let _ = self.close_reason.set(reason);
        self.active.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Move into `Closed`
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// the caller can run its cleanup exactly once.
    pub fn close(&self) -> bool {
        self.active.store(false, Ordering::Release);
        self.phase.send_if_modified(|phase| {
            if *phase != SessionPhase::Closed {
                *phase = SessionPhase::Closed;
                true
            } else {
                false
            }
        })
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Resolves once the session has been deactivated
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Wait until the session leaves `Connecting`
    pub async fn settled(&self) -> SessionPhase {
        let mut rx = self.phase.subscribe();
        let settled = match rx.wait_for(|phase| *phase != SessionPhase::Connecting).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        };
        settled
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }
}
