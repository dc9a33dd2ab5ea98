//! Per-connection session router
//!
//! Consumes the transport's events for one connection, validates and routes
//! session-open requests, and dispatches datagrams and resets to the session
//! objects it created.
//!
//! Each session task reports back on a channel when it finishes, so its
//! mapping is dropped as soon as the router next wakes up rather than on the
//! next session request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::event::{SessionRequest, TransportEvent};
use super::transport::{Transport, TransportSink};
use crate::error::{Error, Result};
use crate::protocol::constants::{
    CONNECT_METHOD, DEFAULT_MAX_DATAGRAM_FRAME_SIZE, DRAFT_HEADER, STATUS_BAD_REQUEST, STATUS_NOT_FOUND, STATUS_OK,
    WEBTRANSPORT_PROTOCOL,
};
use crate::protocol::{Route, SessionRole};
use crate::registry::ChannelRegistry;
use crate::session::{
    CloseReason, PublisherSession, SessionId, SessionKey, SessionPhase, ViewerSession,
};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Transport handshake still running
    Uninitialized,
    /// Application protocol negotiated, no session yet
    Negotiated,
    /// At least one session has been accepted
    Active,
    /// Connection closed; terminal
    Closed,
}

enum RoutedSession {
    Publisher(Arc<PublisherSession>),
    Viewer(Arc<ViewerSession>),
}

impl RoutedSession {
    fn role(&self) -> SessionRole {
        match self {
            RoutedSession::Publisher(_) => SessionRole::Publisher,
            RoutedSession::Viewer(_) => SessionRole::Viewer,
        }
    }

    fn deactivate(&self, reason: CloseReason) {
        match self {
            RoutedSession::Publisher(p) => p.deactivate(reason),
            RoutedSession::Viewer(v) => v.deactivate(reason),
        }
    }

    async fn settled(&self) -> SessionPhase {
        match self {
            RoutedSession::Publisher(p) => p.settled().await,
            RoutedSession::Viewer(v) => v.settled().await,
        }
    }
}

struct TrackedSession {
    session: RoutedSession,
    task: JoinHandle<()>,
    // Tells a stale finish notice apart from a reused session ID
    generation: u64,
}

/// Status code a rejected session-open request is answered with
fn rejection_status(err: &Error) -> u16 {
    match err {
        Error::RouteNotFound(_) => STATUS_NOT_FOUND,
        _ => STATUS_BAD_REQUEST,
    }
}

/// Routes one connection's events to its sessions
pub struct SessionRouter {
    connection_id: u64,
    phase: ConnectionPhase,
    alpn: Option<String>,
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
    sessions: HashMap<SessionId, TrackedSession>,
    max_datagram_size: usize,
    next_generation: u64,
    finished_tx: mpsc::UnboundedSender<(SessionId, u64)>,
    finished_rx: mpsc::UnboundedReceiver<(SessionId, u64)>,
}

impl SessionRouter {
    pub fn new(
        connection_id: u64,
        transport: Arc<dyn Transport>,
        registry: Arc<ChannelRegistry>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            connection_id,
            phase: ConnectionPhase::Uninitialized,
            alpn: None,
            transport,
            registry,
            sessions: HashMap::new(),
            max_datagram_size: DEFAULT_MAX_DATAGRAM_FRAME_SIZE,
            next_generation: 0,
            finished_tx,
            finished_rx,
        }
    }

    /// Largest datagram payload relayed; bigger ones are dropped
    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Negotiated ALPN, once known
    pub fn alpn(&self) -> Option<&str> {
        self.alpn.as_deref()
    }

    /// Number of sessions mapped on this connection
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Role of a mapped session
    pub fn session_role(&self, session_id: SessionId) -> Option<SessionRole> {
        self.sessions.get(&session_id).map(|t| t.session.role())
    }

    /// Wait until a mapped session has registered with its channel or closed
    pub async fn settled(&self, session_id: SessionId) -> Option<SessionPhase> {
        let tracked = self.sessions.get(&session_id)?;
        Some(tracked.session.settled().await)
    }

    /// Event pump: handle events until the connection closes
    pub async fn run(mut self, mut events: mpsc::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                    if self.phase == ConnectionPhase::Closed {
                        return;
                    }
                }
                Some((session_id, generation)) = self.finished_rx.recv() => {
                    self.unmap_finished(session_id, generation);
                }
            }
        }

        // Transport dropped its sender without a close event
        self.close().await;
    }

    /// Handle a single transport event
    pub async fn handle_event(&mut self, event: TransportEvent) {
        self.reap_finished();

        if self.phase == ConnectionPhase::Closed {
            tracing::debug!(
                connection_id = self.connection_id,
                event = event.kind(),
                "Ignoring event on closed connection"
            );
            return;
        }

        match event {
            TransportEvent::ProtocolNegotiated { alpn } => self.on_negotiated(alpn),
            TransportEvent::ConnectionClosed => self.close().await,
            TransportEvent::SessionReset { session_id } => self.on_reset(session_id),
            other if self.phase == ConnectionPhase::Uninitialized => {
                tracing::debug!(
                    connection_id = self.connection_id,
                    event = other.kind(),
                    "Ignoring event before protocol negotiation"
                );
            }
            TransportEvent::SessionRequest(request) => self.on_session_request(request).await,
            TransportEvent::Datagram {
                session_id,
                payload,
            } => self.on_datagram(session_id, payload).await,
        }
    }

    fn on_negotiated(&mut self, alpn: String) {
        if self.phase != ConnectionPhase::Uninitialized {
            tracing::debug!(connection_id = self.connection_id, "Protocol already negotiated");
            return;
        }

        tracing::debug!(connection_id = self.connection_id, alpn = %alpn, "Protocol negotiated");
        self.alpn = Some(alpn);
        self.phase = ConnectionPhase::Negotiated;
    }

    async fn on_session_request(&mut self, request: SessionRequest) {
        tracing::info!(
            connection_id = self.connection_id,
            session_id = request.session_id,
            method = %request.method,
            path = %request.path,
            protocol = %request.protocol,
            "Received request"
        );

        match self.route(&request) {
            Ok(route) => self.open_session(request.session_id, route).await,
            Err(e) => {
                let status = rejection_status(&e);
                tracing::warn!(
                    connection_id = self.connection_id,
                    session_id = request.session_id,
                    status = status,
                    error = %e,
                    "Rejecting session"
                );
                if let Err(e) = self.reject(request.session_id, status).await {
                    tracing::warn!(session_id = request.session_id, error = %e, "Failed to send rejection");
                }
            }
        }
    }

    fn route(&self, request: &SessionRequest) -> Result<Route> {
        if request.method != CONNECT_METHOD || request.protocol != WEBTRANSPORT_PROTOCOL {
            return Err(Error::ProtocolViolation(format!(
                "expected {} with protocol {}, got {} with protocol '{}'",
                CONNECT_METHOD, WEBTRANSPORT_PROTOCOL, request.method, request.protocol
            )));
        }

        if self.sessions.contains_key(&request.session_id) {
            return Err(Error::ProtocolViolation(format!(
                "session {} is already open",
                request.session_id
            )));
        }

        Route::parse(&request.path).ok_or_else(|| Error::RouteNotFound(request.path.clone()))
    }

    async fn reject(&self, session_id: SessionId, status: u16) -> Result<()> {
        self.transport.reject_session(session_id, status).await?;
        self.transport.flush().await?;
        Ok(())
    }

    async fn open_session(&mut self, session_id: SessionId, route: Route) {
        let key = SessionKey::new(self.connection_id, session_id);
        let session = match route.role {
            SessionRole::Publisher => RoutedSession::Publisher(PublisherSession::new(
                key,
                route.channel.as_str(),
                Arc::clone(&self.registry),
            )),
            SessionRole::Viewer => {
                let sink = TransportSink::new(Arc::clone(&self.transport), session_id);
                RoutedSession::Viewer(ViewerSession::new(
                    key,
                    route.channel.as_str(),
                    Arc::clone(&self.registry),
                    Arc::new(sink),
                ))
            }
        };

        if let Err(e) = self.accept(session_id).await {
            tracing::warn!(session_id = session_id, error = %e, "Failed to accept session");
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let task = match &session {
            RoutedSession::Publisher(p) => {
                self.spawn_session(session_id, generation, Arc::clone(p).run())
            }
            RoutedSession::Viewer(v) => {
                self.spawn_session(session_id, generation, Arc::clone(v).run())
            }
        };

        tracing::info!(
            connection_id = self.connection_id,
            session_id = session_id,
            channel = %route.channel,
            role = %route.role,
            "Created session handler"
        );

        self.sessions.insert(
            session_id,
            TrackedSession {
                session,
                task,
                generation,
            },
        );
        self.phase = ConnectionPhase::Active;
    }

    fn spawn_session<F>(&self, session_id: SessionId, generation: u64, run: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let finished = self.finished_tx.clone();
        tokio::spawn(async move {
            run.await;
            // Router may already be gone
            let _ = finished.send((session_id, generation));
        })
    }

    async fn accept(&self, session_id: SessionId) -> Result<()> {
        self.transport
            .accept_session(session_id, STATUS_OK, &[DRAFT_HEADER])
            .await?;
        self.transport.flush().await?;
        Ok(())
    }

    fn on_reset(&mut self, session_id: SessionId) {
        match self.sessions.get(&session_id) {
            Some(tracked) => {
                tracing::debug!(session_id = session_id, "Session reset");
                // The session task sees the flag and does its own cleanup
                tracked.session.deactivate(CloseReason::Reset);
            }
            None => {
                tracing::trace!(session_id = session_id, "Reset for untracked stream");
            }
        }
    }

    async fn on_datagram(&self, session_id: SessionId, payload: Bytes) {
        match self.sessions.get(&session_id).map(|t| &t.session) {
            Some(RoutedSession::Publisher(_)) if payload.len() > self.max_datagram_size => {
                tracing::warn!(
                    session_id = session_id,
                    size = payload.len(),
                    max = self.max_datagram_size,
                    "Dropping oversized datagram"
                );
            }
            Some(RoutedSession::Publisher(publisher)) => {
                let publisher = Arc::clone(publisher);
                publisher.relay(payload).await;
            }
            Some(RoutedSession::Viewer(_)) => {
                tracing::warn!(
                    session_id = session_id,
                    size = payload.len(),
                    "Received datagram for non-publisher session"
                );
            }
            None => {
                tracing::debug!(session_id = session_id, "Received datagram for unknown session");
            }
        }
    }

    /// Forget every session that has reported its task finished
    fn reap_finished(&mut self) {
        while let Ok((session_id, generation)) = self.finished_rx.try_recv() {
            self.unmap_finished(session_id, generation);
        }
    }

    fn unmap_finished(&mut self, session_id: SessionId, generation: u64) -> bool {
        match self.sessions.get(&session_id) {
            Some(tracked) if tracked.generation == generation => {
                self.sessions.remove(&session_id);
                tracing::debug!(
                    connection_id = self.connection_id,
                    session_id = session_id,
                    "Session finished"
                );
                true
            }
            _ => false,
        }
    }

    /// Wait for the next mapped session to finish and unmap it
    ///
    /// Returns `None` straight away when nothing is mapped.
    pub async fn reap_next(&mut self) -> Option<SessionId> {
        while !self.sessions.is_empty() {
            let (session_id, generation) = self.finished_rx.recv().await?;
            if self.unmap_finished(session_id, generation) {
                return Some(session_id);
            }
        }
        None
    }

    /// Wait for one session's task to finish and unmap it
    ///
    /// Returns `false` if the session was not mapped.
    pub async fn join_session(&mut self, session_id: SessionId) -> bool {
        let Some(tracked) = self.sessions.remove(&session_id) else {
            return false;
        };

        if let Err(e) = tracked.task.await {
            tracing::warn!(session_id = session_id, error = %e, "Session task failed");
        }
        true
    }

    /// Deactivate every session and wait for their cleanup
    pub async fn close(&mut self) {
        if self.phase == ConnectionPhase::Closed {
            return;
        }
        self.phase = ConnectionPhase::Closed;

        for tracked in self.sessions.values() {
            tracked.session.deactivate(CloseReason::ConnectionClosed);
        }

        let count = self.sessions.len();
        for (session_id, tracked) in self.sessions.drain() {
            if let Err(e) = tracked.task.await {
                tracing::warn!(session_id = session_id, error = %e, "Session task failed");
            }
        }

        tracing::info!(
            connection_id = self.connection_id,
            sessions = count,
            "Connection closed"
        );
    }
}
