//! Relay server
//!
//! Owns the channel registry, the configuration and the loaded credentials.
//! The QUIC listener lives in the transport adapter; for every connection it
//! accepts, it calls [`RelayServer::open_connection`] and pushes the
//! connection's events into the returned handle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::Route;
use crate::registry::ChannelRegistry;
use crate::server::config::ServerConfig;
use crate::server::credentials::Credentials;
use crate::server::event::TransportEvent;
use crate::server::router::SessionRouter;
use crate::server::transport::Transport;

/// Relay server
pub struct RelayServer {
    config: ServerConfig,
    credentials: Credentials,
    registry: Arc<ChannelRegistry>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Load credentials from the configured paths and build the server
    ///
    /// Fails with [`Error::MissingCredential`] if either file is missing or
    /// is not PEM.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let credentials = Credentials::load(&config.cert_path, &config.key_path)?;
        Ok(Self::with_credentials(config, credentials))
    }

    /// Build the server around already loaded credentials
    pub fn with_credentials(config: ServerConfig, credentials: Credentials) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            credentials,
            registry: Arc::new(ChannelRegistry::new()),
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Chrome flags that let a browser reach this server over QUIC while
    /// trusting its self-signed certificate
    pub fn browser_flags(&self) -> [String; 2] {
        [
            format!("--origin-to-force-quic-on={}", self.config.bind_addr),
            format!(
                "--ignore-certificate-errors-spki-list={}",
                self.credentials.spki_hash_base64()
            ),
        ]
    }

    /// Log where publishers and viewers should connect
    pub fn log_banner(&self) {
        let addr = self.config.bind_addr;
        tracing::info!(
            addr = %addr,
            cert = %self.credentials.cert_path().display(),
            max_datagram_frame_size = self.config.max_datagram_frame_size,
            "Relay listening"
        );
        tracing::info!(spki_hash = %self.credentials.spki_hash_hex(), "Certificate SPKI hash");

        let [quic_flag, spki_flag] = self.browser_flags();
        tracing::info!("Launch Chrome with:");
        tracing::info!("  {} \\", quic_flag);
        tracing::info!("  {}", spki_flag);

        tracing::info!(
            "Publish: https://{}{}",
            addr,
            Route::publish("{channel}").path()
        );
        tracing::info!("Watch:   https://{}{}", addr, Route::watch("{channel}").path());
    }

    /// Start the event pump for a newly accepted connection
    ///
    /// Spawns a [`SessionRouter`] on its own task. The transport feeds it
    /// through the returned handle; dropping every sender closes the
    /// connection as if [`TransportEvent::ConnectionClosed`] had been sent.
    pub fn open_connection(&self, transport: Arc<dyn Transport>) -> Result<ConnectionHandle> {
        // Check connection limit
        let permit = match &self.connection_semaphore {
            Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(
                        limit = self.config.max_connections,
                        "Connection rejected: limit reached"
                    );
                    return Err(Error::ConnectionLimit(self.config.max_connections));
                }
            },
            None => None,
        };

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection_id = id, "New connection");

        let (events, rx) = mpsc::channel(self.config.event_queue_capacity);
        let router = SessionRouter::new(id, transport, Arc::clone(&self.registry))
            .max_datagram_size(self.config.max_datagram_frame_size);

        let task = tokio::spawn(async move {
            // Held until the pump exits
            let _permit = permit;
            router.run(rx).await;
            tracing::debug!(connection_id = id, "Connection task finished");
        });

        Ok(ConnectionHandle { id, events, task })
    }
}

/// A running connection's event pump
pub struct ConnectionHandle {
    id: u64,
    events: mpsc::Sender<TransportEvent>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Another sender for the transport's reader tasks
    pub fn sender(&self) -> mpsc::Sender<TransportEvent> {
        self.events.clone()
    }

    /// Queue an event, waiting for room
    ///
    /// Returns `false` once the connection has closed.
    pub async fn send(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the connection and wait for every session to clean up
    pub async fn close(self) {
        let _ = self.events.send(TransportEvent::ConnectionClosed).await;
        drop(self.events);

        if let Err(e) = self.task.await {
            tracing::warn!(connection_id = self.id, error = %e, "Connection task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio_test::assert_ok;

    use super::*;
    use crate::protocol::constants::H3_ALPN;
    use crate::server::event::SessionRequest;
    use crate::testing::{credential_files, RecordingTransport, TEST_CERT_SPKI_SHA256_BASE64};

    fn server(config: ServerConfig) -> RelayServer {
        let (cert, key) = credential_files();
        let credentials = Credentials::load(cert.path(), key.path()).unwrap();
        RelayServer::with_credentials(config, credentials)
    }

    async fn wait_for_channel(registry: &ChannelRegistry, name: &str, viewers: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(stats) = registry.stats(name).await {
                    if stats.has_publisher() && stats.viewer_count == viewers {
                        return;
                    }
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_bind_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default()
            .credentials(dir.path().join("cert.crt"), dir.path().join("key.key"));

        let err = RelayServer::bind(config).err().unwrap();
        assert!(matches!(err, Error::MissingCredential { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_bind_with_credentials() {
        let (cert, key) = credential_files();
        let config = ServerConfig::default().credentials(cert.path(), key.path());

        let server = assert_ok!(RelayServer::bind(config));
        assert_eq!(server.bind_addr().port(), 4433);
        assert_eq!(server.credentials().key_path(), key.path());
    }

    #[tokio::test]
    async fn test_connections_share_registry() {
        let server = server(ServerConfig::default());
        let pub_transport = Arc::new(RecordingTransport::new());
        let view_transport = Arc::new(RecordingTransport::new());

        let publisher = server.open_connection(pub_transport.clone()).unwrap();
        let viewer = server.open_connection(view_transport.clone()).unwrap();
        assert_ne!(publisher.id(), viewer.id());

        for (conn, path) in [(&publisher, "/publish/s1"), (&viewer, "/watch/s1")] {
            assert!(
                conn.send(TransportEvent::ProtocolNegotiated {
                    alpn: H3_ALPN.into()
                })
                .await
            );
            assert!(
                conn.send(TransportEvent::SessionRequest(SessionRequest::webtransport(
                    0, path
                )))
                .await
            );
            if path.starts_with("/publish/") {
                wait_for_channel(server.registry(), "s1", 0).await;
            }
        }
        wait_for_channel(server.registry(), "s1", 1).await;

        publisher
            .send(TransportEvent::Datagram {
                session_id: 0,
                payload: Bytes::from_static(b"D1"),
            })
            .await;

        // The publisher's pump relays D1 before it handles the close
        publisher.close().await;
        viewer.close().await;

        assert_eq!(view_transport.datagrams(0), vec![Bytes::from_static(b"D1")]);
        assert_eq!(server.registry().channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = server(ServerConfig::default().max_connections(1));

        let first = server
            .open_connection(Arc::new(RecordingTransport::new()))
            .unwrap();
        let err = server
            .open_connection(Arc::new(RecordingTransport::new()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConnectionLimit(1)));

        // Closing frees the slot
        first.close().await;
        assert_ok!(server.open_connection(Arc::new(RecordingTransport::new())));
    }

    #[tokio::test]
    async fn test_dropped_sender_closes_connection() {
        let server = server(ServerConfig::default());
        let handle = server
            .open_connection(Arc::new(RecordingTransport::new()))
            .unwrap();
        let ConnectionHandle { events, task, .. } = handle;

        drop(events);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_browser_flags() {
        let addr: SocketAddr = "127.0.0.1:4433".parse().unwrap();
        let server = server(ServerConfig::with_addr(addr));

        let [quic, spki] = server.browser_flags();
        assert_eq!(quic, "--origin-to-force-quic-on=127.0.0.1:4433");
        assert_eq!(
            spki,
            format!("--ignore-certificate-errors-spki-list={TEST_CERT_SPKI_SHA256_BASE64}")
        );
    }

    #[tokio::test]
    async fn test_oversized_datagram_not_relayed() {
        let server = server(ServerConfig::default().max_datagram_frame_size(4));
        let pub_transport = Arc::new(RecordingTransport::new());
        let view_transport = Arc::new(RecordingTransport::new());
        let publisher = server.open_connection(pub_transport).unwrap();
        let viewer = server.open_connection(view_transport.clone()).unwrap();

        for conn in [&publisher, &viewer] {
            conn.send(TransportEvent::ProtocolNegotiated {
                alpn: H3_ALPN.into(),
            })
            .await;
        }
        publisher
            .send(TransportEvent::SessionRequest(SessionRequest::webtransport(
                0,
                "/publish/s1",
            )))
            .await;
        wait_for_channel(server.registry(), "s1", 0).await;
        viewer
            .send(TransportEvent::SessionRequest(SessionRequest::webtransport(
                0,
                "/watch/s1",
            )))
            .await;
        wait_for_channel(server.registry(), "s1", 1).await;

        for payload in [&b"12345"[..], &b"1234"[..]] {
            publisher
                .send(TransportEvent::Datagram {
                    session_id: 0,
                    payload: Bytes::copy_from_slice(payload),
                })
                .await;
        }
        publisher.close().await;
        viewer.close().await;

        assert_eq!(view_transport.datagrams(0), vec![Bytes::from_static(b"1234")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_connection_churn_leaves_registry_empty() {
        const CONNECTIONS: u64 = 8;
        const ROUNDS: usize = 50;

        let server = Arc::new(server(ServerConfig::default()));

        for _ in 0..ROUNDS {
            let mut tasks = Vec::new();
            for n in 0..CONNECTIONS {
                let server = Arc::clone(&server);
                tasks.push(tokio::spawn(async move {
                    let conn = server
                        .open_connection(Arc::new(RecordingTransport::new()))
                        .unwrap();
                    conn.send(TransportEvent::ProtocolNegotiated {
                        alpn: H3_ALPN.into(),
                    })
                    .await;

                    // Half the connections publish, all of them watch
                    if n % 2 == 0 {
                        conn.send(TransportEvent::SessionRequest(SessionRequest::webtransport(
                            0,
                            "/publish/churn",
                        )))
                        .await;
                    }
                    for id in [4, 8] {
                        conn.send(TransportEvent::SessionRequest(SessionRequest::webtransport(
                            id,
                            "/watch/churn",
                        )))
                        .await;
                    }
                    for _ in 0..3 {
                        conn.send(TransportEvent::Datagram {
                            session_id: 0,
                            payload: Bytes::from_static(b"frame"),
                        })
                        .await;
                        tokio::task::yield_now().await;
                    }
                    conn.send(TransportEvent::SessionReset { session_id: 4 })
                        .await;
                    if n % 4 == 0 {
                        conn.send(TransportEvent::SessionReset { session_id: 0 })
                            .await;
                    }
                    conn.close().await;
                }));
            }

            for task in tasks {
                task.await.unwrap();
            }
            assert_eq!(server.registry().channel_count().await, 0);
        }

        let totals = server.registry().snapshot().await;
        assert_eq!(totals.publisher_count, 0);
        assert_eq!(totals.viewer_count, 0);
    }
}
